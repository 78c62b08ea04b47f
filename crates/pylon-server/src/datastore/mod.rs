//! Persistence abstraction for bouncer configuration.
//!
//! Stores the three things that must survive a restart: the network records
//! (credentials for each configured IRC network), the channel records
//! (channels to rejoin, with optional keys), and the bouncer access password
//! (bcrypt-hashed, never plaintext). The trait is synchronous; callers run it
//! outside the async event path.

mod memory;
mod redb;

use std::collections::HashMap;

pub use memory::MemoryDatastore;
use pylon_core::NetworkCredentials;
use thiserror::Error;

pub use self::redb::RedbDatastore;

/// Bcrypt work factor for the access password.
const BCRYPT_COST: u32 = 12;

/// Errors that can occur during datastore operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatastoreError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.).
    #[error("I/O error: {0}")]
    Io(String),

    /// Password hashing or verification failed.
    #[error("password hashing error: {0}")]
    Hashing(String),
}

/// Persistence for network records, channel records, and the access password.
///
/// Must be Clone (shared between the runtime and the configuration surface),
/// Send + Sync, and synchronous. Implementations share internal state via
/// Arc, so clones access the same underlying store.
pub trait Datastore: Clone + Send + Sync + 'static {
    /// Persist a network record, overwriting any existing one.
    fn store_network(&self, network: &str, creds: &NetworkCredentials)
    -> Result<(), DatastoreError>;

    /// Remove a network record. Removing an absent record is a no-op.
    fn remove_network(&self, network: &str) -> Result<(), DatastoreError>;

    /// All stored network records, keyed by network identity.
    fn networks(&self) -> Result<HashMap<String, NetworkCredentials>, DatastoreError>;

    /// Persist a channel record under `network`, with an optional key.
    fn store_channel(
        &self,
        network: &str,
        channel: &str,
        key: Option<&str>,
    ) -> Result<(), DatastoreError>;

    /// Remove a channel record. Removing an absent record is a no-op.
    fn remove_channel(&self, network: &str, channel: &str) -> Result<(), DatastoreError>;

    /// Stored channel records, optionally filtered to one network.
    ///
    /// Keys are `<network>:<channel>`; values are the channel key, `None`
    /// for keyless channels.
    fn channels(
        &self,
        network: Option<&str>,
    ) -> Result<HashMap<String, Option<String>>, DatastoreError>;

    /// Store the bcrypt hash of the access password.
    fn store_password_hash(&self, hash: &str) -> Result<(), DatastoreError>;

    /// The stored access password hash. `None` until a password is set.
    fn password_hash(&self) -> Result<Option<String>, DatastoreError>;

    /// Hash and store the access password.
    fn set_password(&self, password: &str) -> Result<(), DatastoreError> {
        let hash =
            bcrypt::hash(password, BCRYPT_COST).map_err(|e| DatastoreError::Hashing(e.to_string()))?;
        self.store_password_hash(&hash)
    }

    /// Check a password attempt against the stored hash.
    ///
    /// `false` when no password has been set.
    fn verify_password(&self, password: &str) -> Result<bool, DatastoreError> {
        match self.password_hash()? {
            Some(hash) => {
                bcrypt::verify(password, &hash).map_err(|e| DatastoreError::Hashing(e.to_string()))
            },
            None => Ok(false),
        }
    }
}

/// Compose the `<network>:<channel>` record key.
fn channel_key(network: &str, channel: &str) -> String {
    format!("{network}:{channel}")
}

/// True when a channel record key belongs to `network`.
fn channel_key_matches(key: &str, network: &str) -> bool {
    key.strip_prefix(network).is_some_and(|rest| rest.starts_with(':'))
}
