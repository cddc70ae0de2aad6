//! Cached node contents and the facts derived from them.

use std::time::{Duration, Instant};

/// Bytes last read from a node, plus derived metadata.
#[derive(Debug, Clone, Default)]
pub struct NodeData {
    bytes: Vec<u8>,
    lines: usize,
    is_utf8: bool,
    num_base: Option<u32>,
    updated: Option<Instant>,
}

impl NodeData {
    /// Replace the contents and stamp them as fresh.
    pub(crate) fn store(&mut self, bytes: Vec<u8>) {
        let text = std::str::from_utf8(&bytes).ok();
        self.is_utf8 = text.is_some();
        self.num_base = text.and_then(guess_base);
        self.lines = count_lines(&bytes);
        self.bytes = bytes;
        self.updated = Some(Instant::now());
    }

    /// Drop the contents. The update stamp goes too, so the next read is
    /// never skipped as fresh.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of lines; a missing final newline still ends a line.
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn is_utf8(&self) -> bool {
        self.is_utf8
    }

    /// The contents as text, if valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        if self.is_utf8 {
            std::str::from_utf8(&self.bytes).ok()
        } else {
            None
        }
    }

    /// Base of the value if it reads as a bare number: 10 or 16.
    pub fn num_base(&self) -> Option<u32> {
        self.num_base
    }

    /// When the contents were last read successfully.
    pub fn updated(&self) -> Option<Instant> {
        self.updated
    }

    /// Time since the last successful read.
    pub fn age(&self) -> Option<Duration> {
        self.updated.map(|t| t.elapsed())
    }
}

fn count_lines(bytes: &[u8]) -> usize {
    if bytes.is_empty() {
        return 0;
    }
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
    if bytes.ends_with(b"\n") { newlines } else { newlines + 1 }
}

/// Guess the numeric base of a trimmed value: 10 if all decimal digits,
/// 16 if all hex digits (an `0x` prefix is allowed), otherwise `None`.
pub fn guess_base(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.bytes().all(|b| b.is_ascii_digit()) {
        return Some(10);
    }
    let hex = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Some(16);
    }
    None
}
