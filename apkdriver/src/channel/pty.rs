//! Child process attached to a pseudo-terminal.
//!
//! apk only draws its progress output when stdout is a terminal, and sudo
//! reads passwords from the controlling terminal, so the child gets a real
//! pty rather than pipes.

use std::process::ExitStatus;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;

use super::buffer::{MatchBuffer, split_lines};
use super::patterns::{PatternMatch, PatternSet};
use crate::error::{Result, SessionError};

/// Linux reports reads from a pty whose slave side has closed as `EIO`.
const EIO: i32 = 5;

/// Read chunk size.
const READ_CHUNK: usize = 4096;

/// Configuration for pty session behavior.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Longest silence tolerated between two reads. `None` waits forever.
    pub timeout: Option<Duration>,

    /// Terminal width.
    pub terminal_width: u16,

    /// Terminal height.
    pub terminal_height: u16,

    /// Strip ANSI escape sequences before matching.
    pub strip_ansi: bool,

    /// Extra environment for the child.
    pub env: Vec<(String, String)>,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            terminal_width: 511,
            terminal_height: 24,
            strip_ansi: true,
            env: vec![("LC_ALL".to_string(), "C".to_string())],
        }
    }
}

/// Result of waiting for a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// One entry of the pattern set matched.
    Matched(PatternMatch),

    /// The child closed its terminal and nothing buffered matches.
    EndOfStream,

    /// No output arrived within the read timeout.
    TimedOut,
}

/// One spawned child and its pty master.
///
/// Dropping a session whose child was not reaped kills the child.
pub struct PtySession {
    program: String,
    pty: pty_process::Pty,
    child: Child,
    buffer: MatchBuffer,
    timeout: Option<Duration>,
    eof: bool,
    exit_status: Option<ExitStatus>,
}

impl PtySession {
    /// Launch `program` with `args` on a fresh pty.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(program: &str, args: &[String], config: &PtyConfig) -> Result<Self> {
        let (pty, pts) =
            pty_process::open().map_err(|e| SessionError::PtyOpenFailed(e.to_string()))?;
        pty.resize(pty_process::Size::new(
            config.terminal_height,
            config.terminal_width,
        ))
        .map_err(|e| SessionError::PtyOpenFailed(e.to_string()))?;

        let mut command = pty_process::Command::new(program).args(args);
        for (key, value) in &config.env {
            command = command.env(key, value);
        }

        let child = command.spawn(pts).map_err(|e| SessionError::SpawnFailed {
            program: program.to_string(),
            message: e.to_string(),
        })?;

        debug!(
            "spawned {} {:?} (pid {:?}, timeout {:?})",
            program,
            args,
            child.id(),
            config.timeout
        );

        Ok(Self {
            program: program.to_string(),
            pty,
            child,
            buffer: MatchBuffer::new(config.strip_ansi),
            timeout: config.timeout,
            eof: false,
            exit_status: None,
        })
    }

    /// Wait until the buffered output satisfies one entry of `patterns`.
    ///
    /// Already-buffered text is tried first, so output that arrived in one
    /// read is handed out one match at a time. The timeout bounds each read,
    /// not the whole wait.
    pub async fn await_match(&mut self, patterns: &PatternSet) -> Result<MatchOutcome> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(m) = self.buffer.consume_match(patterns) {
                trace!("matched {} at index {}: {:?}", m.kind, m.index, m.line());
                return Ok(MatchOutcome::Matched(m));
            }
            if self.eof {
                return Ok(MatchOutcome::EndOfStream);
            }

            let read = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, self.pty.read(&mut chunk)).await
                {
                    Ok(read) => read,
                    Err(_) => {
                        debug!("{}: no output for {:?}", self.program, limit);
                        return Ok(MatchOutcome::TimedOut);
                    }
                },
                None => self.pty.read(&mut chunk).await,
            };

            match read {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    trace!("read {} bytes", n);
                    self.buffer.extend(&chunk[..n]);
                }
                Err(e) if e.raw_os_error() == Some(EIO) => self.eof = true,
                Err(e) => return Err(SessionError::Io(e).into()),
            }
        }
    }

    /// Send `text` followed by a newline to the child.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.write_raw(&line).await
    }

    /// Send the terminal interrupt character (^C).
    pub async fn send_interrupt(&mut self) -> Result<()> {
        self.write_raw(&[0x03]).await
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.pty
            .write_all(data)
            .await
            .map_err(SessionError::WriteFailed)?;
        self.pty.flush().await.map_err(SessionError::WriteFailed)?;
        Ok(())
    }

    /// Reap a child that has closed its terminal.
    pub async fn wait(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit_status.is_none() {
            let status = self.child.wait().await.map_err(SessionError::Io)?;
            debug!("{} exited with {}", self.program, status);
            self.exit_status = Some(status);
        }
        Ok(self.exit_status)
    }

    /// Kill the child if it is still running, then reap it.
    pub async fn terminate(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit_status.is_some() {
            return Ok(self.exit_status);
        }
        if self.child.try_wait().map_err(SessionError::Io)?.is_none() {
            debug!("killing {} (pid {:?})", self.program, self.child.id());
            if let Err(e) = self.child.kill().await {
                warn!("failed to kill {}: {}", self.program, e);
            }
        }
        self.wait().await
    }

    /// Move unmatched output into the transcript.
    pub fn flush_pending(&mut self) {
        self.buffer.flush_pending();
    }

    /// Process id of the child, until it is reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Exit status, once reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// The program this session runs.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Read timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Consumed output split into lines.
    pub fn output_lines(&self) -> Vec<String> {
        split_lines(self.buffer.transcript())
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if self.exit_status.is_some() {
            return;
        }
        // tokio reaps killed children in the background once dropped.
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                warn!(
                    "{} (pid {:?}) still running when its session was dropped; killing it",
                    self.program,
                    self.child.id()
                );
                let _ = self.child.start_kill();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::patterns::{PatternFamily, PatternKind};

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    fn config(timeout_ms: u64) -> PtyConfig {
        PtyConfig {
            timeout: Some(Duration::from_millis(timeout_ms)),
            ..PtyConfig::default()
        }
    }

    #[tokio::test]
    async fn test_matches_then_end_of_stream() {
        let set = PatternSet::compose(&[PatternFamily::Generic, PatternFamily::Transaction])
            .unwrap();
        let mut session =
            PtySession::spawn("sh", &sh("printf 'OK: done\\n'"), &config(5000)).unwrap();

        match session.await_match(&set).await.unwrap() {
            MatchOutcome::Matched(m) => {
                assert_eq!(m.kind, PatternKind::Ok);
                assert_eq!(m.group(1), Some("done"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            session.await_match(&set).await.unwrap(),
            MatchOutcome::EndOfStream
        );

        let status = session.wait().await.unwrap().unwrap();
        assert!(status.success());
        assert_eq!(session.output_lines(), vec!["OK: done"]);
    }

    #[tokio::test]
    async fn test_silence_times_out() {
        let set = PatternSet::compose(&[PatternFamily::Generic]).unwrap();
        let mut session = PtySession::spawn("sh", &sh("sleep 5"), &config(200)).unwrap();

        assert_eq!(
            session.await_match(&set).await.unwrap(),
            MatchOutcome::TimedOut
        );
        let status = session.terminate().await.unwrap().unwrap();
        assert!(!status.success());
        assert!(session.output_lines().is_empty());
    }

    #[tokio::test]
    async fn test_write_line_reaches_child() {
        let set = PatternSet::compose(&[PatternFamily::Generic]).unwrap();
        let script = "stty -echo; read -r answer; printf 'OK: %s\\n' \"$answer\"";
        let mut session = PtySession::spawn("sh", &sh(script), &config(5000)).unwrap();

        session.write_line("hello").await.unwrap();
        match session.await_match(&set).await.unwrap() {
            MatchOutcome::Matched(m) => assert_eq!(m.group(1), Some("hello")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let result = PtySession::spawn(
            "/nonexistent/definitely-not-apk",
            &[],
            &PtyConfig::default(),
        );
        assert!(matches!(
            result,
            Err(crate::Error::Session(SessionError::SpawnFailed { .. }))
        ));
    }
}
