//! Wire protocol layer for the Pylon bouncer.
//!
//! IRC is a line-oriented text protocol: every message is UTF-8 text
//! terminated by CRLF, with at most one message per terminator. This crate
//! turns a possibly-fragmented byte stream into discrete lines and back
//! ([`codec`]), and tags each inbound line with the category the relay engine
//! buffers it under ([`message`]).
//!
//! No I/O happens here. The relay engine (`pylon-core`) consumes these types
//! from its own read events; the production runtime (`pylon-server`) only
//! touches [`codec::encode`] output bytes.

mod codec;
mod errors;
mod message;

pub use codec::{LINE_TERMINATOR, LineBuffer, encode, normalize, normalize_with};
pub use errors::ProtocolError;
pub use message::{Category, Fields, LineKind, classify, split_fields};
