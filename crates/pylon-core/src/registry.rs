//! Connection registry for upstream and client tracking.
//!
//! The registry is the single shared coordinator: it maps each network
//! identity to its one live upstream connection and holds the set of
//! attached clients. A client's broker reference is a lookup key (the
//! network identity) resolved through the registry at forward time, never an
//! owning reference, so a superseded upstream cannot be reached after
//! teardown.

use std::collections::HashMap;

/// Information about a registered downstream client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Network identity of the upstream this client is paired with, or
    /// `None` before attachment.
    pub broker: Option<String>,
}

/// Registry for the network→upstream map and the live client set.
///
/// Enforces at most one live upstream per network identity: registering a
/// new connection for an identity evicts the previous one, and the caller is
/// responsible for closing the evictee.
#[derive(Debug, Default)]
pub struct RelayRegistry {
    /// Network identity → live upstream connection ID.
    upstreams: HashMap<String, u64>,
    /// Client ID → client info.
    clients: HashMap<u64, ClientInfo>,
}

impl RelayRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live upstream connection for a network identity.
    ///
    /// Returns the connection ID of the evicted predecessor when the
    /// identity was already registered. Exactly one live upstream per
    /// identity holds at all times.
    pub fn register_upstream(&mut self, network: &str, conn_id: u64) -> Option<u64> {
        self.upstreams.insert(network.to_string(), conn_id)
    }

    /// Remove an upstream registration, but only if `conn_id` is still the
    /// live one.
    ///
    /// A superseded endpoint tearing down after its replacement registered
    /// must not remove the replacement's entry; that late teardown is a
    /// no-op and this returns `false`.
    pub fn unregister_upstream(&mut self, network: &str, conn_id: u64) -> bool {
        match self.upstreams.get(network) {
            Some(&current) if current == conn_id => {
                self.upstreams.remove(network);
                true
            },
            _ => false,
        }
    }

    /// Live upstream connection ID for a network. `None` if not connected.
    pub fn upstream_id(&self, network: &str) -> Option<u64> {
        self.upstreams.get(network).copied()
    }

    /// Number of live upstream connections.
    pub fn upstream_count(&self) -> usize {
        self.upstreams.len()
    }

    /// Register a newly accepted client, unattached.
    ///
    /// Returns `false` if the client ID is already registered.
    pub fn register_client(&mut self, client_id: u64) -> bool {
        if self.clients.contains_key(&client_id) {
            return false;
        }
        self.clients.insert(client_id, ClientInfo::default());
        true
    }

    /// Pair a registered client with the named network's upstream.
    ///
    /// Fails when the client is unknown or the network has no live
    /// upstream - the broker reference must always point at a
    /// currently-registered endpoint.
    pub fn attach_client(&mut self, client_id: u64, network: &str) -> bool {
        if !self.upstreams.contains_key(network) {
            return false;
        }
        match self.clients.get_mut(&client_id) {
            Some(info) => {
                info.broker = Some(network.to_string());
                true
            },
            None => false,
        }
    }

    /// Remove a client from the registry.
    ///
    /// Returns the client's info if it was registered. Detaching the last
    /// client of an upstream never closes that upstream; it stays registered
    /// and keeps buffering.
    pub fn unregister_client(&mut self, client_id: u64) -> Option<ClientInfo> {
        self.clients.remove(&client_id)
    }

    /// Check if a client is registered.
    pub fn has_client(&self, client_id: u64) -> bool {
        self.clients.contains_key(&client_id)
    }

    /// Broker network identity of a client, if attached.
    pub fn broker_of(&self, client_id: u64) -> Option<&str> {
        self.clients.get(&client_id)?.broker.as_deref()
    }

    /// All clients currently attached to the named network.
    ///
    /// An O(clients) scan; acceptable because per-user client counts are
    /// single digits.
    pub fn clients_of<'a>(&'a self, network: &'a str) -> impl Iterator<Item = u64> + 'a {
        self.clients
            .iter()
            .filter(move |(_, info)| info.broker.as_deref() == Some(network))
            .map(|(&id, _)| id)
    }

    /// Total number of registered clients, attached or not.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
