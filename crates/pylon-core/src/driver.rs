//! Relay driver.
//!
//! Ties together upstream endpoints, downstream clients, and the registry.
//! The runtime feeds it [`RelayEvent`]s and executes the returned
//! [`RelayAction`]s; the driver itself performs no I/O.
//!
//! # Forwarding rules
//!
//! A line forwarded from an upstream goes to every client whose broker is
//! that upstream's network: an O(attached clients) scan. A line from a
//! client goes to exactly one destination, the broker, resolved through the
//! registry at forward time - if the broker's upstream is gone the line is
//! skipped, never an error, because the registry map is the authoritative
//! state, not the client's pairing.
//!
//! # Handoff policy
//!
//! A new upstream registering for an already-connected network identity
//! evicts the old one: the old socket is closed with no notification to
//! attached clients, whose broker keys now resolve to the replacement on
//! the next forward.

use std::collections::HashMap;

use pylon_proto::encode;

use crate::{
    config::NetworkCredentials,
    downstream::DownstreamEndpoint,
    error::RelayError,
    registry::RelayRegistry,
    upstream::{UpstreamAction, UpstreamEndpoint},
};

/// Events the relay driver processes, produced by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// An upstream socket was established.
    UpstreamConnected {
        /// Network identity the runtime dialed.
        network: String,
        /// Unique connection ID assigned by the runtime.
        conn_id: u64,
    },

    /// Bytes arrived from an upstream socket.
    UpstreamData {
        /// Connection the bytes arrived on.
        conn_id: u64,
        /// The received bytes, possibly a fragment of a line.
        bytes: Vec<u8>,
    },

    /// An upstream socket closed (peer close or error).
    UpstreamClosed {
        /// Connection that closed.
        conn_id: u64,
        /// Reason for closure.
        reason: String,
    },

    /// A client socket was accepted.
    ClientConnected {
        /// Unique client ID assigned by the runtime.
        client_id: u64,
    },

    /// Bytes arrived from a client socket.
    ClientData {
        /// Client the bytes arrived from.
        client_id: u64,
        /// The received bytes.
        bytes: Vec<u8>,
    },

    /// A client socket closed.
    ClientClosed {
        /// Client that closed.
        client_id: u64,
    },
}

/// Actions the relay driver produces, executed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Dial a new upstream connection.
    ConnectUpstream {
        /// Network identity to report back in `UpstreamConnected`.
        network: String,
        /// Hostname to dial.
        hostname: String,
        /// Port to dial.
        port: u16,
    },

    /// Write bytes to an upstream socket.
    SendUpstream {
        /// Target connection.
        conn_id: u64,
        /// Wire bytes, already terminated.
        bytes: Vec<u8>,
    },

    /// Write bytes to a client socket.
    SendClient {
        /// Target client.
        client_id: u64,
        /// Wire bytes, already terminated.
        bytes: Vec<u8>,
    },

    /// Close an upstream socket.
    CloseUpstream {
        /// Connection to close.
        conn_id: u64,
        /// Reason for closure.
        reason: String,
    },

    /// Close a client socket.
    CloseClient {
        /// Client to close.
        client_id: u64,
        /// Reason for closure.
        reason: String,
    },

    /// Log a message.
    Log {
        /// Log level.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels for driver actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// Event→action orchestrator for the whole relay.
///
/// Single-threaded by design: the runtime serializes events through one
/// driver, so every registry mutation is a single atomic step relative to
/// I/O suspension points.
#[derive(Debug, Default)]
pub struct RelayDriver {
    /// Network→upstream map and live client set.
    registry: RelayRegistry,
    /// Upstream connection ID → endpoint state machine.
    endpoints: HashMap<u64, UpstreamEndpoint>,
    /// Client ID → framing state.
    clients: HashMap<u64, DownstreamEndpoint>,
    /// Configured networks, loaded at startup and mutated by the
    /// configuration UI.
    credentials: HashMap<String, NetworkCredentials>,
    /// Stored channels, keyed `<network>:<channel>`, with an optional
    /// channel key. Joined after the auth triad on each connect.
    channels: HashMap<String, Option<String>>,
}

/// Build the JOIN command for a stored channel.
fn join_action(conn_id: u64, channel: &str, key: Option<&str>) -> RelayAction {
    let bytes = match key {
        Some(key) => encode(&["JOIN", channel, key]),
        None => encode(&["JOIN", channel]),
    };
    RelayAction::SendUpstream { conn_id, bytes }
}

impl RelayDriver {
    /// Create an empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the startup maps and request a dial for each stored network.
    ///
    /// `channels` is keyed `<network>:<channel>`; each entry is joined once
    /// its network's upstream comes up. Neither map is re-read after
    /// startup.
    pub fn startup(
        &mut self,
        networks: HashMap<String, NetworkCredentials>,
        channels: HashMap<String, Option<String>>,
    ) -> Vec<RelayAction> {
        self.channels = channels;
        let mut actions = Vec::new();
        for (network, creds) in networks {
            actions.extend(self.add_network(&network, creds));
        }
        actions
    }

    /// Configure a network and request a dial.
    ///
    /// Takes effect immediately: the credentials are visible before the next
    /// client attachment attempt. If the identity already has a live
    /// upstream, the new connection will evict it on arrival.
    pub fn add_network(&mut self, network: &str, creds: NetworkCredentials) -> Vec<RelayAction> {
        let hostname = creds.hostname.clone();
        let port = creds.port;
        self.credentials.insert(network.to_string(), creds);

        vec![
            RelayAction::Log {
                level: LogLevel::Info,
                message: format!("network {network} configured, dialing {hostname}:{port}"),
            },
            RelayAction::ConnectUpstream { network: network.to_string(), hostname, port },
        ]
    }

    /// Remove a configured network, closing its live upstream if any.
    pub fn remove_network(&mut self, network: &str) -> Vec<RelayAction> {
        self.credentials.remove(network);

        let mut actions = Vec::new();
        if let Some(conn_id) = self.registry.upstream_id(network) {
            self.teardown_upstream(conn_id);
            actions.push(RelayAction::CloseUpstream {
                conn_id,
                reason: "network removed".to_string(),
            });
        }
        actions.push(RelayAction::Log {
            level: LogLevel::Info,
            message: format!("network {network} removed"),
        });
        actions
    }

    /// Record a channel and join it on the network's live upstream, if any.
    pub fn add_channel(
        &mut self,
        network: &str,
        channel: &str,
        key: Option<&str>,
    ) -> Vec<RelayAction> {
        self.channels.insert(format!("{network}:{channel}"), key.map(String::from));
        match self.registry.upstream_id(network) {
            Some(conn_id) => vec![join_action(conn_id, channel, key)],
            None => Vec::new(),
        }
    }

    /// Forget a channel and part it on the network's live upstream, if any.
    pub fn remove_channel(&mut self, network: &str, channel: &str) -> Vec<RelayAction> {
        self.channels.remove(&format!("{network}:{channel}"));
        match self.registry.upstream_id(network) {
            Some(conn_id) => {
                vec![RelayAction::SendUpstream { conn_id, bytes: encode(&["PART", channel]) }]
            },
            None => Vec::new(),
        }
    }

    /// Process one runtime event and return the actions to execute.
    ///
    /// # Errors
    ///
    /// [`RelayError`] when the event references a connection the driver does
    /// not hold (a read that raced a close); callers log and drop the event.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, RelayError> {
        match event {
            RelayEvent::UpstreamConnected { network, conn_id } => {
                Ok(self.handle_upstream_connected(&network, conn_id))
            },
            RelayEvent::UpstreamData { conn_id, bytes } => {
                self.handle_upstream_data(conn_id, &bytes)
            },
            RelayEvent::UpstreamClosed { conn_id, reason } => {
                Ok(self.handle_upstream_closed(conn_id, &reason))
            },
            RelayEvent::ClientConnected { client_id } => Ok(self.handle_client_connected(client_id)),
            RelayEvent::ClientData { client_id, bytes } => {
                self.handle_client_data(client_id, &bytes)
            },
            RelayEvent::ClientClosed { client_id } => Ok(self.handle_client_closed(client_id)),
        }
    }

    /// Registry state, for observability and tests.
    pub fn registry(&self) -> &RelayRegistry {
        &self.registry
    }

    /// Upstream endpoint state, for observability and tests.
    pub fn endpoint(&self, conn_id: u64) -> Option<&UpstreamEndpoint> {
        self.endpoints.get(&conn_id)
    }

    fn handle_upstream_connected(&mut self, network: &str, conn_id: u64) -> Vec<RelayAction> {
        let Some(creds) = self.credentials.get(network) else {
            // A dial completing after remove_network.
            return vec![
                RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!("upstream for unconfigured network {network}, closing"),
                },
                RelayAction::CloseUpstream {
                    conn_id,
                    reason: "network not configured".to_string(),
                },
            ];
        };

        let mut endpoint = UpstreamEndpoint::new(network, creds.clone());
        let mut actions = vec![RelayAction::Log {
            level: LogLevel::Info,
            message: format!("connected to network {network} (conn {conn_id})"),
        }];
        for action in endpoint.on_connected() {
            actions.extend(self.map_upstream_action(conn_id, network, action));
        }
        for (channel, key) in self.channels_of(network) {
            actions.push(join_action(conn_id, &channel, key.as_deref()));
        }

        self.endpoints.insert(conn_id, endpoint);

        // At most one live upstream per identity: a predecessor is evicted
        // and closed, with no notification to its attached clients.
        if let Some(evicted) = self.registry.register_upstream(network, conn_id) {
            if let Some(mut old) = self.endpoints.remove(&evicted) {
                old.close();
            }
            actions.push(RelayAction::Log {
                level: LogLevel::Info,
                message: format!("network {network}: conn {evicted} superseded by {conn_id}"),
            });
            actions.push(RelayAction::CloseUpstream {
                conn_id: evicted,
                reason: "superseded by new connection".to_string(),
            });
        }

        actions
    }

    fn handle_upstream_data(
        &mut self,
        conn_id: u64,
        bytes: &[u8],
    ) -> Result<Vec<RelayAction>, RelayError> {
        let endpoint =
            self.endpoints.get_mut(&conn_id).ok_or(RelayError::UnknownEndpoint(conn_id))?;
        let network = endpoint.network().to_string();
        let clients_attached = self.registry.clients_of(&network).next().is_some();

        match endpoint.on_data(bytes, clients_attached) {
            Ok(upstream_actions) => {
                let mut actions = Vec::new();
                for action in upstream_actions {
                    actions.extend(self.map_upstream_action(conn_id, &network, action));
                }
                Ok(actions)
            },
            // Framing failure is fatal to this connection only.
            Err(e) => {
                self.teardown_upstream(conn_id);
                Ok(vec![
                    RelayAction::Log {
                        level: LogLevel::Warn,
                        message: format!("network {network}: framing error, closing: {e}"),
                    },
                    RelayAction::CloseUpstream { conn_id, reason: e.to_string() },
                ])
            },
        }
    }

    fn handle_upstream_closed(&mut self, conn_id: u64, reason: &str) -> Vec<RelayAction> {
        // Second close of an already-torn-down endpoint is a no-op.
        let Some(endpoint) = self.endpoints.get(&conn_id) else {
            return Vec::new();
        };
        let network = endpoint.network().to_string();
        self.teardown_upstream(conn_id);

        vec![RelayAction::Log {
            level: LogLevel::Info,
            message: format!("disconnected from network {network} (conn {conn_id}): {reason}"),
        }]
    }

    fn handle_client_connected(&mut self, client_id: u64) -> Vec<RelayAction> {
        self.clients.insert(client_id, DownstreamEndpoint::new());
        self.registry.register_client(client_id);

        vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("client {client_id} connected, awaiting attachment"),
        }]
    }

    fn handle_client_data(
        &mut self,
        client_id: u64,
        bytes: &[u8],
    ) -> Result<Vec<RelayAction>, RelayError> {
        let client = self.clients.get_mut(&client_id).ok_or(RelayError::UnknownClient(client_id))?;

        let lines = match client.feed(bytes) {
            Ok(lines) => lines,
            Err(e) => {
                self.teardown_client(client_id);
                return Ok(vec![
                    RelayAction::Log {
                        level: LogLevel::Warn,
                        message: format!("client {client_id}: framing error, closing: {e}"),
                    },
                    RelayAction::CloseClient { client_id, reason: e.to_string() },
                ]);
            },
        };

        let mut actions = Vec::new();
        for line in lines {
            match self.registry.broker_of(client_id) {
                Some(broker) => {
                    // Mirror forward: exactly one destination, resolved
                    // through the registry at forward time. A vanished
                    // broker means skip, not error.
                    let network = broker.to_string();
                    match self.registry.upstream_id(&network) {
                        Some(conn_id) => actions.push(RelayAction::SendUpstream {
                            conn_id,
                            bytes: encode(&[&line]),
                        }),
                        None => actions.push(RelayAction::Log {
                            level: LogLevel::Debug,
                            message: format!(
                                "client {client_id}: broker {network} not connected, dropping line"
                            ),
                        }),
                    }
                },
                None => actions.extend(self.handle_attach_line(client_id, &line)),
            }
        }

        Ok(actions)
    }

    /// Pre-attachment client line: `PASS <network>` selects the broker.
    ///
    /// Registration chatter (NICK, USER) before attachment is swallowed; the
    /// upstream already registered long ago.
    fn handle_attach_line(&mut self, client_id: u64, line: &str) -> Vec<RelayAction> {
        let fields = pylon_proto::split_fields(line);
        if fields.first != "PASS" {
            return vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("client {client_id}: ignoring pre-attach line"),
            }];
        }

        let Some(network) = fields.second else {
            return vec![RelayAction::CloseClient {
                client_id,
                reason: "PASS without a network name".to_string(),
            }];
        };

        if !self.registry.attach_client(client_id, network) {
            return vec![
                RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!("client {client_id}: no such network {network}"),
                },
                RelayAction::CloseClient {
                    client_id,
                    reason: format!("unknown network: {network}"),
                },
            ];
        }

        let mut actions = vec![RelayAction::Log {
            level: LogLevel::Info,
            message: format!("client {client_id} attached to network {network}"),
        }];

        // Replay the chat backlog to every attached client, the new one
        // included. The control log is not replayed.
        if let Some(conn_id) = self.registry.upstream_id(network) {
            let backlog = match self.endpoints.get_mut(&conn_id) {
                Some(endpoint) => endpoint.drain_chat(),
                None => Vec::new(),
            };
            for line in backlog {
                actions.extend(self.map_upstream_action(
                    conn_id,
                    network,
                    UpstreamAction::ForwardToClients(line),
                ));
            }
        }

        actions
    }

    fn handle_client_closed(&mut self, client_id: u64) -> Vec<RelayAction> {
        if self.clients.remove(&client_id).is_none() {
            return Vec::new();
        }
        self.registry.unregister_client(client_id);

        // Detaching the last client never closes the upstream; it stays
        // registered and keeps buffering.
        vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("client {client_id} disconnected"),
        }]
    }

    /// Translate one endpoint action into runtime actions.
    ///
    /// `ForwardToClients` fans out to one `SendClient` per client attached
    /// to this endpoint's network.
    fn map_upstream_action(
        &self,
        conn_id: u64,
        network: &str,
        action: UpstreamAction,
    ) -> Vec<RelayAction> {
        match action {
            UpstreamAction::SendUpstream(bytes) => {
                vec![RelayAction::SendUpstream { conn_id, bytes }]
            },
            UpstreamAction::ForwardToClients(line) => {
                let bytes = encode(&[&line]);
                self.registry
                    .clients_of(network)
                    .map(|client_id| RelayAction::SendClient { client_id, bytes: bytes.clone() })
                    .collect()
            },
        }
    }

    /// Stored channels for one network, in a stable order.
    ///
    /// The prefix includes the separator, so "free" never matches records
    /// under "freenode".
    fn channels_of(&self, network: &str) -> Vec<(String, Option<String>)> {
        let prefix = format!("{network}:");
        let mut channels: Vec<_> = self
            .channels
            .iter()
            .filter_map(|(key, chan_key)| {
                key.strip_prefix(&prefix).map(|channel| (channel.to_string(), chan_key.clone()))
            })
            .collect();
        channels.sort();
        channels
    }

    /// Remove an endpoint and its registry entry in one atomic step.
    fn teardown_upstream(&mut self, conn_id: u64) {
        if let Some(mut endpoint) = self.endpoints.remove(&conn_id) {
            endpoint.close();
            let network = endpoint.network().to_string();
            self.registry.unregister_upstream(&network, conn_id);
        }
    }

    /// Remove a client and its registry entry in one atomic step.
    fn teardown_client(&mut self, client_id: u64) {
        self.clients.remove(&client_id);
        self.registry.unregister_client(client_id);
    }
}
