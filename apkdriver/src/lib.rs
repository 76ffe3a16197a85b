//! # apkdriver
//!
//! Async automation of the Alpine `apk` package manager over a pseudo-terminal.
//!
//! apkdriver runs apk (through sudo when a command needs root), classifies
//! each line it prints against an ordered pattern table, and hands the caller
//! a typed [`Event`] per line as the output streams in.
//!
//! ## Features
//!
//! - Real pty via `pty-process`, so apk and sudo behave as on a terminal
//! - Earliest-match line classification with tagged pattern families
//! - sudo password prompts answered with a bounded attempt budget
//! - Lazy, pull-based events (`next_event` or a `futures` `Stream`)
//! - Serializable events for forwarding as JSON
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use apkdriver::ApkHandler;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), apkdriver::Error> {
//!     let handler = ApkHandler::builder().password("secret").build()?;
//!
//!     let mut stream = handler.add(["curl"])?;
//!     while let Some(event) = stream.next_event().await? {
//!         println!("{event}");
//!     }
//!
//!     let output = stream.into_output();
//!     println!("{:?} after {:?}", output.completion, output.elapsed);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;

// Re-export main types for convenience
pub use driver::{
    ApkCommand, ApkHandler, Completion, Event, EventKind, EventStream, HandlerBuilder,
    RunOutput,
};
pub use error::{Error, Result};
