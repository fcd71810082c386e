// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Server-sent events line parsing.
//!
//! The stream body arrives in arbitrary network chunks. [`LineBuffer`]
//! reassembles complete lines (`\n` or `\r\n` terminated) and
//! [`parse_line`] classifies each one:
//!
//! ```text
//! event: orderCreated        → SseLine::Event
//! data: {"EventId":...}      → SseLine::Data
//! id: 42                     → SseLine::Id
//! retry: 3000                → SseLine::Retry
//! : keep-alive               → SseLine::Comment
//! (empty)                    → SseLine::Blank
//! ```
//!
//! One space after the colon is stripped; further whitespace is part of
//! the value.

/// One classified line of an event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// `event:` field (event name, informational).
    Event(&'a str),
    /// `data:` field (one JSON event envelope).
    Data(&'a str),
    /// `id:` field (resume position for `Last-Event-ID`).
    Id(&'a str),
    /// `retry:` field (server reconnect hint, in milliseconds).
    Retry(&'a str),
    /// Line starting with `:`.
    Comment(&'a str),
    /// Empty line (dispatch boundary).
    Blank,
    /// Any other field name.
    Unknown(&'a str),
}

/// Classify a single line with its terminator already removed.
pub fn parse_line(line: &str) -> SseLine<'_> {
    if line.is_empty() {
        return SseLine::Blank;
    }
    if let Some(comment) = line.strip_prefix(':') {
        return SseLine::Comment(comment);
    }

    let (field, value) = match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
    };

    match field {
        "event" => SseLine::Event(value),
        "data" => SseLine::Data(value),
        "id" => SseLine::Id(value),
        "retry" => SseLine::Retry(value),
        other => SseLine::Unknown(other),
    }
}

/// Reassembles lines from a chunked byte stream.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk as received from the network.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its terminator.
    ///
    /// Returns `None` until a `\n` has been received. Invalid UTF-8 is
    /// replaced rather than rejected; the JSON decoder reports it later.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes held that do not yet form a complete line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
