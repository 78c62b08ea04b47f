//! Redb-backed durable datastore.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. All
//! configuration survives bouncer restarts.

use std::{collections::HashMap, path::Path, sync::Arc};

use pylon_core::NetworkCredentials;
use redb::{Database, ReadableTable, TableDefinition};

use super::{Datastore, DatastoreError, channel_key, channel_key_matches};

/// Table: networks
/// Key: network identity
/// Value: CBOR-encoded `NetworkCredentials`
const NETWORKS: TableDefinition<&str, &[u8]> = TableDefinition::new("networks");

/// Table: channels
/// Key: `<network>:<channel>`
/// Value: channel key, empty string for keyless channels
const CHANNELS: TableDefinition<&str, &str> = TableDefinition::new("channels");

/// Table: settings
/// Key: setting name
/// Value: setting value
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Settings key holding the bcrypt hash of the access password.
const PASSWORD_KEY: &str = "password";

/// Durable datastore backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbDatastore {
    db: Arc<Database>,
}

impl RedbDatastore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (NETWORKS, CHANNELS, SETTINGS).
    ///
    /// # Errors
    ///
    /// Returns `DatastoreError::Io` if the database cannot be opened or
    /// created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatastoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| DatastoreError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| DatastoreError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(NETWORKS).map_err(|e| DatastoreError::Io(e.to_string()))?;
            let _ = txn.open_table(CHANNELS).map_err(|e| DatastoreError::Io(e.to_string()))?;
            let _ = txn.open_table(SETTINGS).map_err(|e| DatastoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| DatastoreError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Datastore for RedbDatastore {
    fn store_network(
        &self,
        network: &str,
        creds: &NetworkCredentials,
    ) -> Result<(), DatastoreError> {
        let txn = self.db.begin_write().map_err(|e| DatastoreError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(NETWORKS).map_err(|e| DatastoreError::Io(e.to_string()))?;

            let mut bytes = Vec::new();
            ciborium::into_writer(creds, &mut bytes)
                .map_err(|e| DatastoreError::Serialization(e.to_string()))?;

            table
                .insert(network, bytes.as_slice())
                .map_err(|e| DatastoreError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| DatastoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove_network(&self, network: &str) -> Result<(), DatastoreError> {
        let txn = self.db.begin_write().map_err(|e| DatastoreError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(NETWORKS).map_err(|e| DatastoreError::Io(e.to_string()))?;
            table.remove(network).map_err(|e| DatastoreError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| DatastoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn networks(&self) -> Result<HashMap<String, NetworkCredentials>, DatastoreError> {
        let txn = self.db.begin_read().map_err(|e| DatastoreError::Io(e.to_string()))?;
        let table = txn.open_table(NETWORKS).map_err(|e| DatastoreError::Io(e.to_string()))?;

        let mut networks = HashMap::new();
        for result in table.iter().map_err(|e| DatastoreError::Io(e.to_string()))? {
            let (key, value) = result.map_err(|e| DatastoreError::Io(e.to_string()))?;
            let creds: NetworkCredentials = ciborium::from_reader(value.value())
                .map_err(|e| DatastoreError::Serialization(e.to_string()))?;
            networks.insert(key.value().to_string(), creds);
        }

        Ok(networks)
    }

    fn store_channel(
        &self,
        network: &str,
        channel: &str,
        key: Option<&str>,
    ) -> Result<(), DatastoreError> {
        let txn = self.db.begin_write().map_err(|e| DatastoreError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(CHANNELS).map_err(|e| DatastoreError::Io(e.to_string()))?;
            table
                .insert(channel_key(network, channel).as_str(), key.unwrap_or(""))
                .map_err(|e| DatastoreError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| DatastoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove_channel(&self, network: &str, channel: &str) -> Result<(), DatastoreError> {
        let txn = self.db.begin_write().map_err(|e| DatastoreError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(CHANNELS).map_err(|e| DatastoreError::Io(e.to_string()))?;
            table
                .remove(channel_key(network, channel).as_str())
                .map_err(|e| DatastoreError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| DatastoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn channels(
        &self,
        network: Option<&str>,
    ) -> Result<HashMap<String, Option<String>>, DatastoreError> {
        let txn = self.db.begin_read().map_err(|e| DatastoreError::Io(e.to_string()))?;
        let table = txn.open_table(CHANNELS).map_err(|e| DatastoreError::Io(e.to_string()))?;

        let mut channels = HashMap::new();
        for result in table.iter().map_err(|e| DatastoreError::Io(e.to_string()))? {
            let (key, value) = result.map_err(|e| DatastoreError::Io(e.to_string()))?;
            let record_key = key.value().to_string();
            if network.is_none_or(|n| channel_key_matches(&record_key, n)) {
                // Empty string marks a keyless channel.
                let stored_key = match value.value() {
                    "" => None,
                    key => Some(key.to_string()),
                };
                channels.insert(record_key, stored_key);
            }
        }

        Ok(channels)
    }

    fn store_password_hash(&self, hash: &str) -> Result<(), DatastoreError> {
        let txn = self.db.begin_write().map_err(|e| DatastoreError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(SETTINGS).map_err(|e| DatastoreError::Io(e.to_string()))?;
            table.insert(PASSWORD_KEY, hash).map_err(|e| DatastoreError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| DatastoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn password_hash(&self) -> Result<Option<String>, DatastoreError> {
        let txn = self.db.begin_read().map_err(|e| DatastoreError::Io(e.to_string()))?;
        let table = txn.open_table(SETTINGS).map_err(|e| DatastoreError::Io(e.to_string()))?;

        match table.get(PASSWORD_KEY).map_err(|e| DatastoreError::Io(e.to_string()))? {
            Some(value) => Ok(Some(value.value().to_string())),
            None => Ok(None),
        }
    }
}
