//! Fuzz target for SSE line reassembly and parsing.
//!
//! Arbitrary bytes are fed through the line buffer in two chunks; every
//! line produced must parse without panicking and no bytes may be lost.

#![no_main]

use event_replication::transport::sse::{parse_line, LineBuffer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&[u8], &[u8])| {
    let (first, second) = data;

    let mut buffer = LineBuffer::new();
    buffer.push(first);
    buffer.push(second);

    let mut consumed = 0;
    while let Some(line) = buffer.next_line() {
        let _ = parse_line(&line);
        consumed += 1;
    }

    // Everything left is a partial line
    let newlines = first.iter().chain(second).filter(|&&b| b == b'\n').count();
    assert_eq!(consumed, newlines);
    assert!(!first.iter().chain(second).rev().take(buffer.pending()).any(|&b| b == b'\n'));
});
