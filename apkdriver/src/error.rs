//! Error types for apkdriver.

use std::io;
use thiserror::Error;

/// Main error type for apkdriver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Process/pty session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Pattern table errors
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),
}

/// Session layer errors (spawning, pty I/O).
#[derive(Error, Debug)]
pub enum SessionError {
    /// Failed to allocate or configure the pseudo-terminal
    #[error("Failed to open pty: {0}")]
    PtyOpenFailed(String),

    /// The program could not be launched
    #[error("Failed to spawn '{program}': {message}")]
    SpawnFailed { program: String, message: String },

    /// Writing to the child's terminal failed
    #[error("Failed to write to child: {0}")]
    WriteFailed(#[source] io::Error),

    /// Reading from the child's terminal failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Driver layer errors (invocation, configuration).
#[derive(Error, Debug)]
pub enum DriverError {
    /// Unrecognized command kind
    #[error("Unknown command kind: '{name}'")]
    UnknownCommand { name: String },

    /// Invalid configuration in the handler builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Command was built without any package where one is required
    #[error("'{command}' requires at least one package")]
    MissingPackages { command: String },
}

/// Pattern table errors.
#[derive(Error, Debug)]
pub enum PatternError {
    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The catch-all entry would mask everything composed after it
    #[error("Catch-all pattern must be last, found at {index} of {len}")]
    CatchAllNotLast { index: usize, len: usize },
}

/// Result type alias using apkdriver's Error.
pub type Result<T> = std::result::Result<T, Error>;
