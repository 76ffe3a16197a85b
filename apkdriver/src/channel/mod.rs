//! Channel layer: pty sessions and line pattern matching.
//!
//! This module owns the child process, its pseudo-terminal and the
//! pattern table used to classify what the child prints.

mod buffer;
pub mod patterns;
mod pty;

pub use buffer::{MatchBuffer, split_lines};
pub use patterns::{PatternEntry, PatternFamily, PatternKind, PatternMatch, PatternSet};
pub use pty::{MatchOutcome, PtyConfig, PtySession};
