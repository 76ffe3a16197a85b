//! High-level driver for apk runs.
//!
//! The driver layer provides the main API: assembling apk commands, running
//! them through sudo when needed, and turning their output into events.

mod auth;
mod builder;
mod command;
mod dispatch;
pub mod event;
mod handler;
mod response;
mod stream;

pub use auth::{AuthPolicy, AuthStep, Authenticator, Reply};
pub use builder::{HandlerBuilder, HandlerConfig};
pub use command::{ApkCommand, CommandFamily, CommandKind};
pub use dispatch::Dispatcher;
pub use event::{DetailField, Event, EventKind};
pub use handler::ApkHandler;
pub use response::{Completion, RunOutput};
pub use stream::EventStream;
