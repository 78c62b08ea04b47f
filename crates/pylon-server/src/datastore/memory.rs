#![allow(clippy::expect_used, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use pylon_core::NetworkCredentials;

use super::{Datastore, DatastoreError, channel_key, channel_key_matches};

/// In-memory datastore for testing.
///
/// All state is wrapped in Arc<Mutex<>> to allow Clone and concurrent access.
/// Uses `lock().expect()`, which panics if the mutex is poisoned; acceptable
/// for test code.
#[derive(Clone, Default)]
pub struct MemoryDatastore {
    inner: Arc<Mutex<MemoryDatastoreInner>>,
}

#[derive(Default)]
struct MemoryDatastoreInner {
    networks: HashMap<String, NetworkCredentials>,
    /// Channel key (`<network>:<channel>`) → optional channel key.
    channels: HashMap<String, Option<String>>,
    password_hash: Option<String>,
}

impl MemoryDatastore {
    /// Create a new empty `MemoryDatastore`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Datastore for MemoryDatastore {
    fn store_network(
        &self,
        network: &str,
        creds: &NetworkCredentials,
    ) -> Result<(), DatastoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.networks.insert(network.to_string(), creds.clone());
        Ok(())
    }

    fn remove_network(&self, network: &str) -> Result<(), DatastoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.networks.remove(network);
        Ok(())
    }

    fn networks(&self) -> Result<HashMap<String, NetworkCredentials>, DatastoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.networks.clone())
    }

    fn store_channel(
        &self,
        network: &str,
        channel: &str,
        key: Option<&str>,
    ) -> Result<(), DatastoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.channels.insert(channel_key(network, channel), key.map(String::from));
        Ok(())
    }

    fn remove_channel(&self, network: &str, channel: &str) -> Result<(), DatastoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.channels.remove(&channel_key(network, channel));
        Ok(())
    }

    fn channels(
        &self,
        network: Option<&str>,
    ) -> Result<HashMap<String, Option<String>>, DatastoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner
            .channels
            .iter()
            .filter(|(key, _)| network.is_none_or(|n| channel_key_matches(key, n)))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn store_password_hash(&self, hash: &str) -> Result<(), DatastoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.password_hash = Some(hash.to_string());
        Ok(())
    }

    fn password_hash(&self) -> Result<Option<String>, DatastoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.password_hash.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(nick: &str) -> NetworkCredentials {
        NetworkCredentials::new("irc.example.org", 6667, nick, "user", "Real Name")
    }

    #[test]
    fn network_records_round_trip() {
        let store = MemoryDatastore::new();
        store.store_network("freenode", &creds("freenick")).unwrap();
        store.store_network("quakenet", &creds("quakenick")).unwrap();

        let networks = store.networks().unwrap();
        assert_eq!(networks.len(), 2);
        assert_eq!(networks["freenode"].nickname, "freenick");

        store.remove_network("freenode").unwrap();
        assert_eq!(store.networks().unwrap().len(), 1);
    }

    #[test]
    fn channels_filter_by_network() {
        let store = MemoryDatastore::new();
        store.store_channel("freenode", "#rust", None).unwrap();
        store.store_channel("quakenet", "#quake", Some("key")).unwrap();
        store.store_channel("quakenet", "#q2", None).unwrap();

        assert_eq!(store.channels(None).unwrap().len(), 3);

        let quakenet = store.channels(Some("quakenet")).unwrap();
        assert_eq!(quakenet.len(), 2);
        assert_eq!(quakenet["quakenet:#quake"].as_deref(), Some("key"));
    }

    #[test]
    fn verify_without_password_is_false() {
        let store = MemoryDatastore::new();
        assert!(!store.verify_password("anything").unwrap());
    }

    #[test]
    fn password_set_and_verify() {
        let store = MemoryDatastore::new();
        store.set_password("testpassword").unwrap();

        assert!(store.verify_password("testpassword").unwrap());
        assert!(!store.verify_password("wrongpassword").unwrap());

        // Updating replaces the old hash.
        store.set_password("newpassword").unwrap();
        assert!(!store.verify_password("testpassword").unwrap());
        assert!(store.verify_password("newpassword").unwrap());
    }
}
