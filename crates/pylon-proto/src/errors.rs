//! Wire protocol error types.
//!
//! Framing errors are fatal to the connection that produced them: a peer
//! sending bytes we cannot decode has desynchronized, and continuing would
//! corrupt every downstream buffer. The owning connection must be torn down.

use thiserror::Error;

/// Errors produced while framing or decoding wire bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A complete line contained bytes that do not decode as UTF-8.
    ///
    /// Fatal to the owning connection only. Never silently dropped - the
    /// caller must close the connection rather than forward garbage.
    #[error("line at byte offset {offset} is not valid UTF-8")]
    InvalidEncoding {
        /// Offset of the first undecodable byte within the line.
        offset: usize,
    },
}
