//! Builder for creating apk handlers.

use std::time::Duration;

use secrecy::SecretString;

use super::auth::AuthPolicy;
use super::handler::ApkHandler;
use crate::channel::PtyConfig;
use crate::error::{DriverError, Result};

/// Validated settings shared by every run of an [`ApkHandler`].
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Package manager executable.
    pub program: String,

    /// Program privileged commands are run through, usually `sudo`.
    pub escalation: Option<String>,

    /// Terminal and timeout settings of each child.
    pub pty: PtyConfig,

    /// Password attempt budget and grace period.
    pub auth: AuthPolicy,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            program: "apk".to_string(),
            escalation: Some("sudo".to_string()),
            pty: PtyConfig::default(),
            auth: AuthPolicy::default(),
        }
    }
}

/// Builder for constructing an [`ApkHandler`].
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use apkdriver::HandlerBuilder;
///
/// # fn example() -> Result<(), apkdriver::Error> {
/// let handler = HandlerBuilder::new()
///     .password("secret")
///     .timeout(Duration::from_secs(60))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct HandlerBuilder {
    config: HandlerConfig,
    password: Option<SecretString>,
}

impl HandlerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: HandlerConfig::default(),
            password: None,
        }
    }

    /// Set the package manager executable (default: `apk`).
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.config.program = program.into();
        self
    }

    /// Set the privilege escalation program (default: `sudo`).
    pub fn escalation(mut self, program: impl Into<String>) -> Self {
        self.config.escalation = Some(program.into());
        self
    }

    /// Run privileged commands directly, e.g. when already root.
    pub fn no_escalation(mut self) -> Self {
        self.config.escalation = None;
        self
    }

    /// Set the password answered to escalation prompts.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the longest silence tolerated from the child (default: none).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.pty.timeout = Some(timeout);
        self
    }

    /// Wait for output forever.
    pub fn no_timeout(mut self) -> Self {
        self.config.pty.timeout = None;
        self
    }

    /// Set terminal dimensions.
    pub fn terminal_size(mut self, width: u16, height: u16) -> Self {
        self.config.pty.terminal_width = width;
        self.config.pty.terminal_height = height;
        self
    }

    /// Keep ANSI escape sequences in the output (default: stripped).
    pub fn strip_ansi(mut self, strip: bool) -> Self {
        self.config.pty.strip_ansi = strip;
        self
    }

    /// Set how many passwords are sent before giving up (default: 3).
    pub fn max_password_attempts(mut self, attempts: u32) -> Self {
        self.config.auth.max_attempts = attempts;
        self
    }

    /// Set how long a child may linger after authentication failed
    /// (default: 5 seconds).
    pub fn auth_failure_grace(mut self, grace: Duration) -> Self {
        self.config.auth.failure_grace = grace;
        self
    }

    /// Add an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.config.pty.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.config.pty.env.push((key, value)),
        }
        self
    }

    /// Validate the settings and build the handler.
    pub fn build(self) -> Result<ApkHandler> {
        let config = self.config;

        if config.program.trim().is_empty() {
            return Err(invalid("program must not be empty"));
        }
        if config
            .escalation
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            return Err(invalid("escalation program must not be empty"));
        }
        if config.pty.timeout == Some(Duration::ZERO) {
            return Err(invalid("timeout must be greater than zero"));
        }
        if config.pty.terminal_width == 0 || config.pty.terminal_height == 0 {
            return Err(invalid("terminal dimensions must be non-zero"));
        }
        if config.auth.max_attempts == 0 {
            return Err(invalid("max_password_attempts must be at least 1"));
        }
        if let Some((key, _)) = config
            .pty
            .env
            .iter()
            .find(|(k, _)| k.is_empty() || k.contains('='))
        {
            return Err(invalid(&format!("invalid environment variable name {key:?}")));
        }

        Ok(ApkHandler::new(config, self.password))
    }
}

impl Default for HandlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(message: &str) -> crate::Error {
    DriverError::InvalidConfig {
        message: message.to_string(),
    }
    .into()
}
