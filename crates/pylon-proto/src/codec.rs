//! CRLF line codec.
//!
//! A read from a socket may contain zero, one, or many terminated lines plus
//! a trailing unterminated fragment. [`LineBuffer`] carries that fragment
//! between reads and yields only complete lines, in arrival order.
//!
//! # Invariants
//!
//! - No data loss: concatenating the returned lines (terminators reinserted)
//!   with the remaining partial reproduces the fed bytes exactly, for any
//!   fragmentation of the input.
//! - [`normalize`] is idempotent: a line already carrying the terminator is
//!   returned unchanged.

use bytes::{Buf, BytesMut};

use crate::errors::ProtocolError;

/// The IRC line terminator.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Ensure a line ends with the CRLF terminator, without ever duplicating it.
pub fn normalize(line: &str) -> String {
    normalize_with(line, LINE_TERMINATOR)
}

/// [`normalize`] with an explicit terminator, for servers that do not conform
/// to the specification.
pub fn normalize_with(line: &str, terminator: &str) -> String {
    if line.ends_with(terminator) {
        line.to_string()
    } else {
        let mut out = String::with_capacity(line.len() + terminator.len());
        out.push_str(line);
        out.push_str(terminator);
        out
    }
}

/// Encode an outbound command for transmission.
///
/// Parts are joined with a single space, normalized, and converted to bytes.
/// This is the only place outbound framing happens; callers never append
/// terminators themselves.
pub fn encode(parts: &[&str]) -> Vec<u8> {
    normalize(&parts.join(" ")).into_bytes()
}

/// Reassembly buffer for one connection's inbound byte stream.
///
/// Owns the carried-over partial line. One instance per connection; the
/// partial is part of the connection's state and dies with it.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: BytesMut,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly received bytes, returning every line completed by them.
    ///
    /// The carried partial is prepended, the combined bytes are split on
    /// CRLF, and the segment after the last terminator becomes the new
    /// partial (empty when the input ended exactly on a terminator). Lines
    /// are returned without their terminators, in arrival order.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InvalidEncoding`] if a *complete* line is not valid
    /// UTF-8. The partial is never decoded, so a read ending mid-way through
    /// a multi-byte sequence is not an error.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, ProtocolError> {
        self.partial.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(at) = find_terminator(&self.partial) {
            let line = self.partial.split_to(at);
            self.partial.advance(LINE_TERMINATOR.len());

            let text = std::str::from_utf8(&line)
                .map_err(|e| ProtocolError::InvalidEncoding { offset: e.valid_up_to() })?;
            lines.push(text.to_string());
        }

        Ok(lines)
    }

    /// Bytes received but not yet terminated.
    pub fn partial(&self) -> &[u8] {
        &self.partial
    }
}

/// Byte offset of the first CRLF, if any.
fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
