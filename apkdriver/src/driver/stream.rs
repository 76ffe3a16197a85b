//! Lazy event production for one command run.
//!
//! An [`EventStream`] owns the child for the length of the run. Every call to
//! [`next_event`](EventStream::next_event) reads just enough output to produce
//! one event, answering sudo prompts along the way. The stream ends when the
//! child closes its terminal, when it stays silent past the read timeout, or
//! when it outlives the grace period after failed authentication.

use std::time::{Duration, Instant};

use futures_core::Stream;
use log::{debug, warn};
use secrecy::ExposeSecret;

use super::auth::{Authenticator, Reply};
use super::builder::HandlerConfig;
use super::command::CommandFamily;
use super::dispatch::Dispatcher;
use super::event::Event;
use super::response::{Completion, RunOutput};
use crate::channel::{MatchOutcome, PatternMatch, PatternSet, PtySession};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    AuthFailed { deadline: tokio::time::Instant },
    Finished(Completion),
}

/// Pull-based sequence of events from one running command.
///
/// Created by [`ApkHandler::run`](super::ApkHandler::run). Call
/// [`next_event`](Self::next_event) in a loop (or consume
/// [`events`](Self::events) as a `Stream`), then
/// [`into_output`](Self::into_output) for the raw output.
///
/// Dropping the stream before it ends kills the child.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example(handler: &apkdriver::ApkHandler) -> Result<(), apkdriver::Error> {
/// let mut stream = handler.add(["curl"])?;
/// while let Some(event) = stream.next_event().await? {
///     println!("{event}");
/// }
/// let output = stream.into_output();
/// assert!(output.is_success());
/// # Ok(())
/// # }
/// ```
pub struct EventStream {
    session: PtySession,
    patterns: PatternSet,
    dispatcher: Dispatcher,
    auth: Option<Authenticator>,
    state: State,
    command: String,
    credential_writes: u32,
    start: Instant,
    elapsed: Option<Duration>,
}

impl EventStream {
    /// Spawn `program` with `args` and classify its output as `family`.
    ///
    /// With an authenticator the sudo dialogue patterns are included and
    /// answered; without one they are not looked for at all.
    pub fn spawn(
        program: &str,
        args: &[String],
        family: CommandFamily,
        auth: Option<Authenticator>,
        config: &HandlerConfig,
    ) -> Result<Self> {
        let patterns = PatternSet::compose(&family.pattern_families(auth.is_some()))?;
        let session = PtySession::spawn(program, args, &config.pty)?;

        let mut command = program.to_string();
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        debug!("running {:?} as {:?} with {} patterns", command, family, patterns.len());

        Ok(Self {
            session,
            patterns,
            dispatcher: Dispatcher::new(family),
            auth,
            state: State::Running,
            command,
            credential_writes: 0,
            start: Instant::now(),
            elapsed: None,
        })
    }

    /// Get the next event, or `None` once the run has ended.
    ///
    /// After `None` or an error, every later call returns `Ok(None)`.
    pub async fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            let outcome = match self.state {
                State::Finished(_) => return Ok(None),
                State::Running => self.session.await_match(&self.patterns).await,
                State::AuthFailed { deadline } => {
                    let wait = self.session.await_match(&self.patterns);
                    match tokio::time::timeout_at(deadline, wait).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            debug!("{}: still running after failed authentication", self.command);
                            self.finish(Completion::TimedOut).await?;
                            return Ok(None);
                        }
                    }
                }
            };

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.abort().await;
                    return Err(e);
                }
            };

            match outcome {
                MatchOutcome::Matched(m) => {
                    if let Some(event) = self.handle_match(m).await? {
                        return Ok(Some(event));
                    }
                }
                MatchOutcome::EndOfStream => {
                    self.finish(Completion::Exited).await?;
                    return Ok(None);
                }
                MatchOutcome::TimedOut => {
                    self.finish(Completion::TimedOut).await?;
                    return Ok(None);
                }
            }
        }
    }

    /// Adapt the stream into a [`futures_core::Stream`] of events.
    pub fn events(&mut self) -> impl Stream<Item = Result<Event>> + '_ {
        futures_util::stream::unfold(self, |stream| async move {
            match stream.next_event().await {
                Ok(Some(event)) => Some((Ok(event), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }

    async fn handle_match(&mut self, m: PatternMatch) -> Result<Option<Event>> {
        let Some(auth) = self.auth.as_mut().filter(|_| m.kind.is_auth()) else {
            return Ok(Some(self.dispatcher.dispatch(&m)));
        };

        let step = auth.handle(&m);
        let written = match step.reply {
            Reply::None => Ok(()),
            Reply::Credential => match auth.credential() {
                Some(secret) => {
                    self.credential_writes += 1;
                    self.session.write_line(secret.expose_secret()).await
                }
                None => Ok(()),
            },
            Reply::Interrupt => self.session.send_interrupt().await,
        };
        if let Err(e) = written {
            self.abort().await;
            return Err(e);
        }

        if step.failed && self.state == State::Running {
            let grace = auth.policy().failure_grace;
            debug!("authentication failed; allowing {:?} for the child to exit", grace);
            self.state = State::AuthFailed {
                deadline: tokio::time::Instant::now() + grace,
            };
        }
        Ok(step.event)
    }

    async fn finish(&mut self, completion: Completion) -> Result<()> {
        self.session.flush_pending();
        self.state = State::Finished(completion);
        self.elapsed = Some(self.start.elapsed());
        let status = match completion {
            Completion::Exited => self.session.wait().await?,
            Completion::TimedOut | Completion::Abandoned => self.session.terminate().await?,
        };
        debug!(
            "{} finished: {:?}, status {:?}, {} credential writes",
            self.command, completion, status, self.credential_writes
        );
        Ok(())
    }

    async fn abort(&mut self) {
        if let Err(e) = self.finish(Completion::Abandoned).await {
            warn!("failed to stop {}: {}", self.command, e);
        }
    }

    /// Output consumed so far, split into lines.
    pub fn output_lines(&self) -> Vec<String> {
        self.session.output_lines()
    }

    /// Number of times the password was written.
    pub fn credential_writes(&self) -> u32 {
        self.credential_writes
    }

    /// How the run ended, once it has.
    pub fn completion(&self) -> Option<Completion> {
        match self.state {
            State::Finished(completion) => Some(completion),
            _ => None,
        }
    }

    /// Whether the run has ended.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished(_))
    }

    /// Process id of the child, until it is reaped.
    pub fn child_id(&self) -> Option<u32> {
        self.session.id()
    }

    /// The full command line being run.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The composed pattern set.
    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Consume the stream and collect the raw output.
    ///
    /// Called before the run has ended, the child is killed and the output
    /// reports [`Completion::Abandoned`].
    pub fn into_output(mut self) -> RunOutput {
        let completion = match self.state {
            State::Finished(completion) => completion,
            _ => {
                debug!("{}: output taken before the run ended", self.command);
                self.session.flush_pending();
                self.state = State::Finished(Completion::Abandoned);
                Completion::Abandoned
            }
        };

        RunOutput {
            lines: self.session.output_lines(),
            completion,
            exit_code: self.session.exit_status().and_then(|s| s.code()),
            credential_writes: self.credential_writes,
            elapsed: self.elapsed.unwrap_or_else(|| self.start.elapsed()),
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if !self.is_finished() {
            warn!("EventStream for {:?} dropped before the run ended", self.command);
        }
    }
}
