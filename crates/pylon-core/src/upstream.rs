//! Upstream endpoint state machine.
//!
//! One instance per live connection to an IRC network. Runs the line codec
//! over inbound bytes, classifies each complete line, buffers control and
//! chat traffic separately, and answers keep-alive probes within the same
//! processing step.
//!
//! # State machine
//!
//! ```text
//! ┌────────────┐ socket up ┌────────────────┐ first non-error ┌─────────────┐
//! │ Connecting │──────────>│ Authenticating │────────────────>│ Established │
//! └────────────┘           └───────┬────────┘     reply       └──────┬──────┘
//!                                  │ close/error                     │ close
//!                                  ▼                                 ▼
//!                              ┌────────┐                       ┌────────┐
//!                              │ Closed │<──────────────────────│ Closed │
//!                              └────────┘                       └────────┘
//! ```
//!
//! The Authenticating→Established transition is tracked for observability;
//! classification and forwarding proceed identically in both states.
//!
//! This is a pure state machine: no sockets, no registry. The driver
//! registers the endpoint and fans `ForwardToClients` out to the attached
//! client set.

use std::collections::VecDeque;

use pylon_proto::{LineBuffer, LineKind, ProtocolError, classify, encode, split_fields};

use crate::config::NetworkCredentials;

/// Lifecycle state of an upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamState {
    /// Socket not yet established.
    Connecting,
    /// Auth triad sent, waiting for the first server response.
    Authenticating,
    /// Server responded; normal relay operation.
    Established,
    /// Torn down (peer close, error, or eviction by a replacement).
    Closed,
}

/// Actions produced by the upstream state machine.
///
/// The driver executes these: `SendUpstream` becomes a write on this
/// endpoint's own socket, `ForwardToClients` becomes one write per client
/// currently attached to this endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamAction {
    /// Write these bytes to the network socket.
    SendUpstream(Vec<u8>),
    /// Forward this line to every attached client.
    ForwardToClients(String),
}

/// One live connection to an IRC network.
#[derive(Debug)]
pub struct UpstreamEndpoint {
    /// Network identity this endpoint serves.
    network: String,
    credentials: NetworkCredentials,
    state: UpstreamState,
    /// Carried-over partial line between reads.
    buffer: LineBuffer,
    /// Ordered log of control messages (notices, mode changes, numerics).
    control_log: Vec<String>,
    /// Chat lines awaiting delivery to an attached client.
    ///
    /// Grows without bound while no client is attached; replayed FIFO on the
    /// next attachment.
    chat_queue: VecDeque<String>,
}

impl UpstreamEndpoint {
    /// Create an endpoint in [`UpstreamState::Connecting`].
    pub fn new(network: impl Into<String>, credentials: NetworkCredentials) -> Self {
        Self {
            network: network.into(),
            credentials,
            state: UpstreamState::Connecting,
            buffer: LineBuffer::new(),
            control_log: Vec::new(),
            chat_queue: VecDeque::new(),
        }
    }

    /// Network identity this endpoint serves.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Current lifecycle state.
    pub fn state(&self) -> UpstreamState {
        self.state
    }

    /// Socket established: send the authentication triad.
    ///
    /// Transitions Connecting→Authenticating. A PASS line is always sent,
    /// empty when the network has no password. Returns nothing when called
    /// in any other state.
    pub fn on_connected(&mut self) -> Vec<UpstreamAction> {
        if self.state != UpstreamState::Connecting {
            return Vec::new();
        }
        self.state = UpstreamState::Authenticating;

        let password = self.credentials.password.clone().unwrap_or_default();
        let usermode = self.credentials.usermode.to_string();
        let realname = format!(":{}", self.credentials.realname);

        vec![
            UpstreamAction::SendUpstream(encode(&["PASS", &password])),
            UpstreamAction::SendUpstream(encode(&["NICK", &self.credentials.nickname])),
            UpstreamAction::SendUpstream(encode(&[
                "USER",
                &self.credentials.username,
                &usermode,
                "*",
                &realname,
            ])),
        ]
    }

    /// Process one read event from the network socket.
    ///
    /// Feeds the codec with the carried partial, classifies each complete
    /// line, and buffers or answers it. After all lines from this read are
    /// classified, the chat queue is drained FIFO, but only when
    /// `clients_attached` is true; otherwise backlog accumulates for replay.
    ///
    /// # Errors
    ///
    /// [`ProtocolError`] on undecodable bytes. Fatal to this connection: the
    /// caller must tear the endpoint down rather than corrupt downstream
    /// state.
    pub fn on_data(
        &mut self,
        bytes: &[u8],
        clients_attached: bool,
    ) -> Result<Vec<UpstreamAction>, ProtocolError> {
        let lines = self.buffer.feed(bytes)?;
        let mut actions = Vec::new();

        for line in lines {
            if self.state == UpstreamState::Authenticating && !is_error_line(&line) {
                self.state = UpstreamState::Established;
            }

            match classify(&line) {
                // Liveness check: answered in the same processing step,
                // never queued.
                LineKind::Probe { token } => {
                    let reply = match token {
                        Some(token) => encode(&["PONG", token]),
                        None => encode(&["PONG"]),
                    };
                    actions.push(UpstreamAction::SendUpstream(reply));
                },
                // Liveness round-trip: must not be delayed behind backlog.
                LineKind::Ack { rest } => {
                    let line = match rest {
                        Some(rest) => format!("PONG {rest}"),
                        None => "PONG".to_string(),
                    };
                    actions.push(UpstreamAction::ForwardToClients(line));
                },
                LineKind::Control => self.control_log.push(line),
                LineKind::Chat => self.chat_queue.push_back(line),
            }
        }

        if clients_attached {
            while let Some(line) = self.chat_queue.pop_front() {
                actions.push(UpstreamAction::ForwardToClients(line));
            }
        }

        Ok(actions)
    }

    /// Drain the chat queue FIFO, for replay on client attachment.
    pub fn drain_chat(&mut self) -> Vec<String> {
        self.chat_queue.drain(..).collect()
    }

    /// Mark the endpoint closed. Idempotent: a second close is a no-op.
    pub fn close(&mut self) {
        self.state = UpstreamState::Closed;
    }

    /// Buffered control messages, in arrival order.
    pub fn control_log(&self) -> &[String] {
        &self.control_log
    }

    /// Number of chat lines awaiting delivery.
    pub fn chat_backlog(&self) -> usize {
        self.chat_queue.len()
    }
}

/// True when the line is the server's ERROR command.
///
/// Gates the Authenticating→Established transition: any other response
/// counts as the server accepting us.
fn is_error_line(line: &str) -> bool {
    let fields = split_fields(line);
    let command =
        if fields.first.starts_with(':') { fields.second.unwrap_or("") } else { fields.first };
    command == "ERROR"
}
