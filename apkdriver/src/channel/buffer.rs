//! Match buffer: pending output plus the transcript of what was consumed.
//!
//! Output from the child is appended to a pending region. A successful
//! match consumes everything up to the end of the match; the consumed bytes
//! move to an append-only transcript, which is what callers get back as the
//! raw output of a run.

use bytes::{Buf, BytesMut};
use memchr::memmem;
use vte::{Parser, Perform};

use super::patterns::{PatternMatch, PatternSet};

/// Buffer for accumulating output and consuming pattern matches.
pub struct MatchBuffer {
    /// Text received but not yet consumed by a match.
    pending: BytesMut,

    /// Every consumed byte, in order.
    transcript: Vec<u8>,

    /// ANSI stripper, `None` when output is kept verbatim.
    stripper: Option<AnsiStripper>,
}

impl MatchBuffer {
    /// Create a new buffer.
    ///
    /// # Arguments
    ///
    /// * `strip_ansi` - Remove terminal escape sequences before matching.
    pub fn new(strip_ansi: bool) -> Self {
        Self {
            pending: BytesMut::with_capacity(4096),
            transcript: Vec::with_capacity(4096),
            stripper: strip_ansi.then(AnsiStripper::new),
        }
    }

    /// Extend the pending region with new data.
    pub fn extend(&mut self, data: &[u8]) {
        match self.stripper.as_mut() {
            Some(stripper) => stripper.strip_into(data, &mut self.pending),
            None => self.pending.extend_from_slice(data),
        }
    }

    /// Find the winning pattern in the pending region and consume through it.
    ///
    /// Text before the match is consumed too, so the transcript stays a
    /// faithful copy of the output.
    pub fn consume_match(&mut self, patterns: &PatternSet) -> Option<PatternMatch> {
        let (index, range) = patterns.earliest_match(&self.pending)?;
        let entry = patterns.get(index)?;

        let (groups, text) = {
            let caps = entry.regex().captures(&self.pending[range.start..])?;
            let groups = caps
                .iter()
                .skip(1)
                .map(|g| g.map(|g| String::from_utf8_lossy(g.as_bytes()).into_owned()))
                .collect();
            let text = String::from_utf8_lossy(&self.pending[range.clone()]).into_owned();
            (groups, text)
        };

        let consumed = self.pending.split_to(range.end);
        self.transcript.extend_from_slice(&consumed);

        Some(PatternMatch {
            index,
            kind: entry.kind(),
            groups,
            text,
        })
    }

    /// Move whatever is still pending into the transcript.
    pub fn flush_pending(&mut self) {
        self.transcript.extend_from_slice(&self.pending);
        self.pending.advance(self.pending.len());
    }

    /// Bytes received but not consumed.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Every consumed byte.
    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    /// Check if nothing was received at all.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.transcript.is_empty()
    }
}

impl std::fmt::Debug for MatchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchBuffer")
            .field("pending", &self.pending.len())
            .field("transcript", &self.transcript.len())
            .field("strip_ansi", &self.stripper.is_some())
            .finish()
    }
}

/// Split raw output on `\r\n`.
///
/// A trailing terminator does not produce an empty last line, so empty
/// output gives no lines at all.
pub fn split_lines(data: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    for end in memmem::find_iter(data, b"\r\n") {
        lines.push(String::from_utf8_lossy(&data[start..end]).into_owned());
        start = end + 2;
    }
    if start < data.len() {
        lines.push(String::from_utf8_lossy(&data[start..]).into_owned());
    }
    lines
}

/// Streaming ANSI escape stripper.
///
/// The vte parser keeps its state between calls, so an escape sequence or a
/// UTF-8 character split across two reads is still handled.
struct AnsiStripper {
    parser: Parser,
}

impl AnsiStripper {
    fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    fn strip_into(&mut self, data: &[u8], out: &mut BytesMut) {
        let mut sink = TextSink { out };
        self.parser.advance(&mut sink, data);
    }
}

/// Keeps printable text and line control characters, drops the rest.
struct TextSink<'a> {
    out: &'a mut BytesMut,
}

impl Perform for TextSink<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\r' | b'\n' | b'\t') {
            self.out.extend_from_slice(&[byte]);
        }
    }
}
