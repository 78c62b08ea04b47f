//! Server error types.

use std::fmt;

use pylon_core::RelayError;

use crate::datastore::DatastoreError;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad datastore path, etc.).
    ///
    /// These are fatal errors that prevent server startup. Fix configuration
    /// and restart.
    Config(String),

    /// Transport/network error (connection failure, I/O error, etc.).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    /// Check error message for details.
    Transport(String),

    /// Relay error (from `RelayDriver` processing).
    ///
    /// Wraps errors from the core relay logic. A `RelayError` means an event
    /// referenced a connection the driver no longer holds.
    Relay(RelayError),

    /// Datastore error (network records, channel records, access password).
    ///
    /// Wraps errors from the persistence backend. See `DatastoreError` for
    /// details.
    Datastore(DatastoreError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Relay(err) => write!(f, "relay error: {err}"),
            Self::Datastore(err) => write!(f, "datastore error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Relay(err) => Some(err),
            Self::Datastore(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RelayError> for ServerError {
    fn from(err: RelayError) -> Self {
        Self::Relay(err)
    }
}

impl From<DatastoreError> for ServerError {
    fn from(err: DatastoreError) -> Self {
        Self::Datastore(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
