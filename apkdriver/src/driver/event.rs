//! Event records produced from classified output.
//!
//! Events serialize as internally tagged records, e.g.
//! `{"type": "PROGRESS", "step": 3, "total_steps": 10, ...}`.

use std::fmt;

use serde::Serialize;

/// Discriminator of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Error,
    Ok,
    Progress,
    Exec,
    Fetch,
    Getty,
    Prompt,
    Newline,
    Result,
    Detail,
    Other,
    UpdateTime,
    UpdateVersion,
}

impl EventKind {
    /// Upper-case tag, as used in the serialized `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Ok => "OK",
            Self::Progress => "PROGRESS",
            Self::Exec => "EXEC",
            Self::Fetch => "FETCH",
            Self::Getty => "GETTY",
            Self::Prompt => "PROMPT",
            Self::Newline => "NEWLINE",
            Self::Result => "RESULT",
            Self::Detail => "DETAIL",
            Self::Other => "OTHER",
            Self::UpdateTime => "UPDATE_TIME",
            Self::UpdateVersion => "UPDATE_VERSION",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Section of `apk info <pkg>` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailField {
    Description,
    Webpage,
    InstalledSize,
}

impl DetailField {
    /// Parse the header word apk prints before the colon.
    pub fn from_header(header: &str) -> Option<Self> {
        match header {
            "description" => Some(Self::Description),
            "webpage" => Some(Self::Webpage),
            "installed size" => Some(Self::InstalledSize),
            _ => None,
        }
    }
}

/// One classified line (or prompt) of child output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// `ERROR:` line, or a failed sudo dialogue.
    Error { message: String, description: String },

    /// `OK:` line; apk is done.
    Ok { message: String, description: String },

    /// `(step/total) message` transaction step.
    Progress {
        step: u32,
        total_steps: u32,
        percent: f64,
        message: String,
        description: String,
    },

    /// Install/remove script or trigger being run.
    Exec {
        package: String,
        version: String,
        script: String,
        description: String,
    },

    /// Repository being fetched during a transaction.
    #[serde(rename = "FETCH")]
    FetchRepository { repo: String, description: String },

    /// Index URL fetched by `update`.
    Fetch { url: String, description: String },

    /// Getty configured on a serial port.
    Getty {
        port: String,
        baud_rate: u32,
        description: String,
    },

    /// The sudo password was asked for and answered.
    Prompt {
        user: Option<String>,
        attempt: u32,
        retry: bool,
        description: String,
    },

    /// A bare line break.
    Newline { description: String },

    /// A package listed by search or the installed query.
    Result {
        package: String,
        version: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    /// One section of `apk info <pkg>`.
    Detail {
        package: String,
        version: String,
        field: DetailField,
        value: String,
    },

    /// Any line without a more specific classification.
    Other { message: String, description: String },

    /// Timestamp of an updated repository index.
    UpdateTime { time: String, url: String },

    /// Version of an updated repository index.
    UpdateVersion {
        version: String,
        url: String,
        description: String,
    },
}

impl Event {
    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            description: "Command failed".to_string(),
        }
    }

    pub(crate) fn auth_error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            description: "Failed because sudo password is wrong".to_string(),
        }
    }

    pub(crate) fn ok(message: impl Into<String>) -> Self {
        Self::Ok {
            message: message.into(),
            description: "Command completed successfully".to_string(),
        }
    }

    pub(crate) fn progress(step: u32, total_steps: u32, message: impl Into<String>) -> Self {
        let percent = if total_steps == 0 {
            0.0
        } else {
            f64::from(step) / f64::from(total_steps) * 100.0
        };
        Self::Progress {
            step,
            total_steps,
            percent,
            message: message.into(),
            description: format!("Step {step} of {total_steps}"),
        }
    }

    pub(crate) fn prompt(user: Option<String>, attempt: u32, retry: bool) -> Self {
        let description = if retry {
            "Asked again for sudo password"
        } else {
            "Asked for sudo password"
        };
        Self::Prompt {
            user,
            attempt,
            retry,
            description: description.to_string(),
        }
    }

    pub(crate) fn newline() -> Self {
        Self::Newline {
            description: "Received a newline on its own".to_string(),
        }
    }

    pub(crate) fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            description: "Got an unexpected response".to_string(),
        }
    }

    /// The discriminator of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Error { .. } => EventKind::Error,
            Self::Ok { .. } => EventKind::Ok,
            Self::Progress { .. } => EventKind::Progress,
            Self::Exec { .. } => EventKind::Exec,
            Self::FetchRepository { .. } | Self::Fetch { .. } => EventKind::Fetch,
            Self::Getty { .. } => EventKind::Getty,
            Self::Prompt { .. } => EventKind::Prompt,
            Self::Newline { .. } => EventKind::Newline,
            Self::Result { .. } => EventKind::Result,
            Self::Detail { .. } => EventKind::Detail,
            Self::Other { .. } => EventKind::Other,
            Self::UpdateTime { .. } => EventKind::UpdateTime,
            Self::UpdateVersion { .. } => EventKind::UpdateVersion,
        }
    }

    /// Human-readable summary, where the event carries one.
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Error { description, .. }
            | Self::Ok { description, .. }
            | Self::Progress { description, .. }
            | Self::Exec { description, .. }
            | Self::FetchRepository { description, .. }
            | Self::Fetch { description, .. }
            | Self::Getty { description, .. }
            | Self::Prompt { description, .. }
            | Self::Newline { description }
            | Self::Other { description, .. }
            | Self::UpdateVersion { description, .. } => Some(description.as_str()),
            Self::Result { description, .. } => description.as_deref(),
            Self::Detail { .. } | Self::UpdateTime { .. } => None,
        }
    }

    /// Check if this is an ERROR event.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.kind())?;
        match self {
            Self::Error { message, .. } | Self::Ok { message, .. } => f.write_str(message),
            Self::Progress {
                percent, message, ..
            } => write!(f, "{percent:5.1}% {message}"),
            Self::Result {
                package,
                version,
                description,
            } => {
                write!(f, "{package} {version}")?;
                if let Some(description) = description {
                    write!(f, " - {description}")?;
                }
                Ok(())
            }
            Self::Detail {
                package,
                field,
                value,
                ..
            } => write!(f, "{package} {field:?}: {value}"),
            Self::UpdateTime { time, url } => write!(f, "{url} updated {time}"),
            Self::Other { message, .. } => f.write_str(message),
            other => f.write_str(other.description().unwrap_or_default()),
        }
    }
}
