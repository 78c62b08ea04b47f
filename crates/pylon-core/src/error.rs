//! Relay engine error types.
//!
//! The driver surfaces errors only for events that reference state it does
//! not hold - a logic bug or a runtime race. Per-connection failures
//! (framing, transport) are not errors at this level: they resolve into
//! close actions for the single connection that failed, leaving siblings
//! untouched.

use thiserror::Error;

/// Errors from [`crate::RelayDriver`] event processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// An event referenced an upstream connection the driver does not know.
    ///
    /// The runtime may deliver reads that raced a close; callers log and
    /// drop the event.
    #[error("unknown upstream connection: {0}")]
    UnknownEndpoint(u64),

    /// An event referenced a client the driver does not know.
    #[error("unknown client: {0}")]
    UnknownClient(u64),
}
