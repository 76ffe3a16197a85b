//! The apk handler: turns commands into running event streams.

use std::fmt;

use log::debug;
use secrecy::SecretString;

use super::auth::Authenticator;
use super::builder::{HandlerBuilder, HandlerConfig};
use super::command::ApkCommand;
use super::event::Event;
use super::response::RunOutput;
use super::stream::EventStream;
use crate::error::Result;

/// Runs apk commands, answering sudo prompts with a stored password.
///
/// Each run spawns its own child; a handler can start any number of runs,
/// one after another or concurrently.
///
/// # Example
///
/// ```rust,no_run
/// use apkdriver::ApkHandler;
///
/// # async fn example() -> Result<(), apkdriver::Error> {
/// let handler = ApkHandler::builder().password("secret").build()?;
///
/// let mut stream = handler.search(Some("curl"), true)?;
/// while let Some(event) = stream.next_event().await? {
///     println!("{event}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct ApkHandler {
    config: HandlerConfig,
    password: Option<SecretString>,
}

impl ApkHandler {
    pub(crate) fn new(config: HandlerConfig, password: Option<SecretString>) -> Self {
        Self { config, password }
    }

    /// Start building a handler.
    pub fn builder() -> HandlerBuilder {
        HandlerBuilder::new()
    }

    /// The validated configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Whether a password is configured.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Spawn `command` and return its event stream.
    ///
    /// A privileged command runs through the escalation program, if one is
    /// configured, and its sudo prompts are answered. Fails synchronously
    /// when the child cannot be started.
    pub fn run(&self, command: &ApkCommand) -> Result<EventStream> {
        let args = command.args();
        match self.config.escalation.as_deref() {
            Some(escalation) if command.is_privileged() => {
                let mut argv = Vec::with_capacity(args.len() + 1);
                argv.push(self.config.program.clone());
                argv.extend(args);
                debug!("escalating {} through {}", command, escalation);
                let auth = Authenticator::new(self.password.clone(), self.config.auth);
                EventStream::spawn(escalation, &argv, command.family(), Some(auth), &self.config)
            }
            _ => EventStream::spawn(
                &self.config.program,
                &args,
                command.family(),
                None,
                &self.config,
            ),
        }
    }

    /// Run `command` to the end, collecting every event.
    pub async fn execute(&self, command: &ApkCommand) -> Result<(Vec<Event>, RunOutput)> {
        let mut stream = self.run(command)?;
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await? {
            events.push(event);
        }
        Ok((events, stream.into_output()))
    }

    /// Install packages.
    pub fn add<I, S>(&self, packages: I) -> Result<EventStream>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run(&ApkCommand::add(packages)?)
    }

    /// Remove packages; `cascade` also removes packages depending on them.
    pub fn remove<I, S>(&self, packages: I, cascade: bool) -> Result<EventStream>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run(&ApkCommand::remove(packages, cascade)?)
    }

    /// Upgrade all installed packages.
    pub fn upgrade(&self) -> Result<EventStream> {
        self.run(&ApkCommand::upgrade())
    }

    /// Refresh the repository indexes.
    pub fn update(&self) -> Result<EventStream> {
        self.run(&ApkCommand::update())
    }

    /// Search the repositories.
    pub fn search(&self, query: Option<&str>, verbose: bool) -> Result<EventStream> {
        self.run(&ApkCommand::search(query, verbose))
    }

    /// List installed packages.
    pub fn installed(&self) -> Result<EventStream> {
        self.run(&ApkCommand::installed())
    }

    /// Show details of one package.
    pub fn info(&self, package: impl Into<String>) -> Result<EventStream> {
        self.run(&ApkCommand::info(package))
    }
}

impl fmt::Debug for ApkHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApkHandler")
            .field("config", &self.config)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::driver::event::EventKind;
    use crate::driver::response::Completion;
    use crate::error::{Error, SessionError};

    /// `echo` stands in for apk so the assembled argv comes back as output.
    fn echo_handler(escalation: Option<&str>) -> ApkHandler {
        let builder = ApkHandler::builder()
            .program("echo")
            .timeout(Duration::from_secs(5));
        match escalation {
            Some(program) => builder.escalation(program),
            None => builder.no_escalation(),
        }
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn test_unprivileged_command_runs_directly() {
        let handler = echo_handler(Some("sudo"));
        let (events, output) = handler
            .execute(&ApkCommand::search(Some("curl"), true))
            .await
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(output.lines, vec!["search --verbose curl"]);
        assert_eq!(output.completion, Completion::Exited);
    }

    #[tokio::test]
    async fn test_privileged_command_goes_through_escalation() {
        let handler = ApkHandler::builder()
            .program("apk")
            .escalation("echo")
            .password("hunter2")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let mut stream = handler.add(["curl"]).unwrap();
        assert_eq!(stream.command(), "echo apk add curl");
        assert_eq!(stream.patterns().len(), 11);

        let event = stream.next_event().await.unwrap().unwrap();
        assert_eq!(event.kind(), EventKind::Other);
        assert_eq!(event, Event::other("apk add curl"));
        assert_eq!(stream.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_escalation_skips_auth_patterns() {
        let handler = echo_handler(None);
        let stream = handler.remove(["nginx"], true).unwrap();
        assert_eq!(stream.command(), "echo del -r nginx");
        assert_eq!(stream.patterns().len(), 7);
        drop(stream.into_output());
    }

    #[tokio::test]
    async fn test_missing_program_fails_before_events() {
        let handler = ApkHandler::builder()
            .program("/nonexistent/apk")
            .no_escalation()
            .build()
            .unwrap();
        let Err(err) = handler.update() else {
            panic!("spawning a missing program succeeded");
        };
        assert!(matches!(
            err,
            Error::Session(SessionError::SpawnFailed { .. })
        ));
    }

    #[test]
    fn test_empty_package_list_is_rejected() {
        let handler = echo_handler(None);
        assert!(handler.add(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let handler = ApkHandler::builder().password("hunter2").build().unwrap();
        assert!(!format!("{handler:?}").contains("hunter2"));
    }
}
