//! The sudo password dialogue.
//!
//! sudo interleaves four kinds of lines with apk's own output: the password
//! prompt, "Sorry, try again.", the final "incorrect password attempts"
//! message, and a bare line break once a password was read. The
//! [`Authenticator`] reacts to each of them and tells the stream what to
//! write back and which event to emit.

use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use secrecy::SecretString;

use super::event::Event;
use crate::channel::{PatternKind, PatternMatch};

/// Default number of passwords sent before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default time to wait for the child to exit after authentication failed.
pub const DEFAULT_FAILURE_GRACE: Duration = Duration::from_secs(5);

/// Limits applied to the password dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    /// Most passwords written in one run.
    pub max_attempts: u32,

    /// Total time the child gets to exit once authentication failed.
    pub failure_grace: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            failure_grace: DEFAULT_FAILURE_GRACE,
        }
    }
}

/// What to send back to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Nothing.
    None,
    /// The credential followed by a newline.
    Credential,
    /// The interrupt character, to abort sudo.
    Interrupt,
}

/// Reaction to one authentication line.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthStep {
    /// Write to perform before anything else.
    pub reply: Reply,

    /// Event to hand to the caller, if any.
    pub event: Option<Event>,

    /// Authentication is now known to have failed.
    pub failed: bool,
}

impl AuthStep {
    fn quiet() -> Self {
        Self {
            reply: Reply::None,
            event: None,
            failed: false,
        }
    }

    fn emit(event: Event) -> Self {
        Self {
            reply: Reply::None,
            event: Some(event),
            failed: false,
        }
    }
}

/// Answers sudo password prompts within an attempt budget.
///
/// After a "Sorry, try again." line the re-ask is reported right away and
/// the prompt that follows is answered without a second event, so a caller
/// sees exactly one PROMPT per password sudo asks for.
pub struct Authenticator {
    credential: Option<SecretString>,
    policy: AuthPolicy,
    attempts: u32,
    reprompt_pending: bool,
    gave_up: bool,
    user: Option<String>,
}

impl Authenticator {
    /// Create an authenticator. Without a credential, the first prompt
    /// fails authentication.
    pub fn new(credential: Option<SecretString>, policy: AuthPolicy) -> Self {
        Self {
            credential,
            policy,
            attempts: 0,
            reprompt_pending: false,
            gave_up: false,
            user: None,
        }
    }

    /// React to a matched authentication line.
    ///
    /// Kinds outside the sudo dialogue produce no reaction.
    pub fn handle(&mut self, m: &PatternMatch) -> AuthStep {
        match m.kind {
            PatternKind::SudoPrompt => self.on_prompt(m),
            PatternKind::SudoRetry => self.on_retry(m),
            PatternKind::SudoFailed => self.on_failure(m.group(1).unwrap_or(m.line())),
            PatternKind::Newline => AuthStep::emit(Event::newline()),
            _ => AuthStep::quiet(),
        }
    }

    fn on_prompt(&mut self, m: &PatternMatch) -> AuthStep {
        if let Some(user) = m.group(1) {
            self.user = Some(user.to_string());
        }
        if self.gave_up {
            return AuthStep::emit(Event::other(m.line()));
        }
        if self.credential.is_none() {
            return self.give_up("sudo asked for a password but none is configured");
        }
        if self.attempts >= self.policy.max_attempts {
            return self.give_up(&format!(
                "sudo password rejected {} times",
                self.attempts
            ));
        }

        self.attempts += 1;
        debug!(
            "answering sudo prompt for {:?} (attempt {} of {})",
            self.user, self.attempts, self.policy.max_attempts
        );

        let event = if self.reprompt_pending {
            self.reprompt_pending = false;
            None
        } else {
            Some(Event::prompt(self.user.clone(), self.attempts, false))
        };
        AuthStep {
            reply: Reply::Credential,
            event,
            failed: false,
        }
    }

    fn on_retry(&mut self, m: &PatternMatch) -> AuthStep {
        if self.gave_up {
            return AuthStep::emit(Event::other(m.line()));
        }
        if self.attempts >= self.policy.max_attempts {
            return self.give_up(&format!(
                "sudo password rejected {} times",
                self.attempts
            ));
        }
        self.reprompt_pending = true;
        AuthStep::emit(Event::prompt(self.user.clone(), self.attempts + 1, true))
    }

    fn on_failure(&mut self, message: &str) -> AuthStep {
        warn!("sudo authentication failed: {}", message);
        self.gave_up = true;
        self.reprompt_pending = false;
        AuthStep {
            reply: Reply::None,
            event: Some(Event::auth_error(message)),
            failed: true,
        }
    }

    fn give_up(&mut self, message: &str) -> AuthStep {
        warn!("{}; interrupting", message);
        self.gave_up = true;
        self.reprompt_pending = false;
        AuthStep {
            reply: Reply::Interrupt,
            event: Some(Event::auth_error(message)),
            failed: true,
        }
    }

    /// The credential to write for [`Reply::Credential`].
    pub fn credential(&self) -> Option<&SecretString> {
        self.credential.as_ref()
    }

    /// Passwords written so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether authentication has failed.
    pub fn has_failed(&self) -> bool {
        self.gave_up
    }

    /// The attempt policy.
    pub fn policy(&self) -> AuthPolicy {
        self.policy
    }

    /// User named by the last prompt.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .field("policy", &self.policy)
            .field("attempts", &self.attempts)
            .field("reprompt_pending", &self.reprompt_pending)
            .field("gave_up", &self.gave_up)
            .field("user", &self.user)
            .finish()
    }
}
