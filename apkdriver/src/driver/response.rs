//! Final result of one command run.

use std::fmt;
use std::time::Duration;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
    /// The child closed its terminal and was reaped.
    Exited,

    /// The child went silent for longer than the read timeout, or outlived
    /// the grace period after failed authentication, and was killed.
    TimedOut,

    /// The caller stopped reading before the run ended; the child was killed.
    Abandoned,
}

/// Raw output and bookkeeping of a finished run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Everything the child printed, split on `\r\n`.
    pub lines: Vec<String>,

    /// How the run ended.
    pub completion: Completion,

    /// Exit code of the child, when it exited normally.
    pub exit_code: Option<i32>,

    /// Number of times the password was written.
    pub credential_writes: u32,

    /// Time from spawn to completion.
    pub elapsed: Duration,
}

impl RunOutput {
    /// Check if the child exited on its own with status 0.
    pub fn is_success(&self) -> bool {
        self.completion == Completion::Exited && self.exit_code == Some(0)
    }

    /// Get the output lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Check if any output line contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.lines.iter().any(|line| line.contains(pattern))
    }
}

impl fmt::Display for RunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines.join("\n"))
    }
}
