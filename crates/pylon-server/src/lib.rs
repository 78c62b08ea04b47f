//! Pylon production bouncer.
//!
//! Production runtime using Tokio for async I/O and plain TCP on both sides:
//! IRC clients connect to the bind address, and the bouncer dials out to
//! configured IRC networks.
//!
//! # Architecture
//!
//! This crate provides the "glue" that wraps [`pylon_core`]'s action-based
//! relay logic with real I/O. The [`pylon_core::RelayDriver`] is pure logic
//! with no sockets; the [`Bouncer`] owns the sockets, feeds the driver
//! events, and executes the actions it returns. All events flow through one
//! driver behind a mutex, and the resulting socket writes happen before the
//! mutex is released, so registry mutations never interleave across await
//! points and deliveries reach each socket in event-processing order.
//!
//! # Components
//!
//! - [`pylon_core::RelayDriver`]: event→action orchestrator (pure logic)
//! - [`Bouncer`]: production runtime that executes driver actions
//! - [`TcpTransport`]: client listener and upstream dialer
//! - [`Datastore`]: persistence for networks, channels, and the access
//!   password

mod error;
mod transport;

pub mod datastore;

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::BytesMut;
pub use datastore::{Datastore, DatastoreError, MemoryDatastore, RedbDatastore};
pub use error::ServerError;
use pylon_core::{LogLevel, NetworkCredentials, RelayAction, RelayDriver, RelayEvent};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::{Mutex, RwLock},
};
pub use transport::{TcpTransport, dial};

/// Read buffer size for both client and upstream sockets.
const READ_BUFFER_SIZE: usize = 8192;

/// Shared state for all connections.
///
/// Holds the write halves for message routing. Delivery ordering comes from
/// the driver mutex, which is held across action execution; the per-writer
/// mutex only guards the socket handle itself.
struct SharedState {
    /// Map of upstream connection ID to socket write half.
    upstream_writers: RwLock<HashMap<u64, Mutex<OwnedWriteHalf>>>,
    /// Map of client ID to socket write half.
    client_writers: RwLock<HashMap<u64, Mutex<OwnedWriteHalf>>>,
    /// Connection ID allocator, shared by upstreams and clients.
    next_id: AtomicU64,
}

impl SharedState {
    fn new() -> Self {
        Self {
            upstream_writers: RwLock::new(HashMap::new()),
            client_writers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Bouncer configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct BouncerConfig {
    /// Address to listen on for IRC clients (e.g., "0.0.0.0:6667").
    pub bind_address: String,
}

impl Default for BouncerConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:6667".to_string() }
    }
}

/// Production Pylon bouncer.
///
/// Wraps `RelayDriver` with TCP transport and a persistence backend.
pub struct Bouncer<D: Datastore> {
    /// The action-based relay driver.
    driver: Arc<Mutex<RelayDriver>>,
    /// Client listener.
    transport: TcpTransport,
    /// Configuration persistence.
    datastore: D,
    /// Connection maps.
    shared: Arc<SharedState>,
}

impl<D: Datastore> Bouncer<D> {
    /// Create and bind a new bouncer.
    ///
    /// # Errors
    ///
    /// [`ServerError::Config`] or [`ServerError::Transport`] when the client
    /// listener cannot be bound.
    pub async fn bind(config: BouncerConfig, datastore: D) -> Result<Self, ServerError> {
        let transport = TcpTransport::bind(&config.bind_address).await?;

        Ok(Self {
            driver: Arc::new(Mutex::new(RelayDriver::new())),
            transport,
            datastore,
            shared: Arc::new(SharedState::new()),
        })
    }

    /// Local address the client listener is bound to.
    ///
    /// # Errors
    ///
    /// [`ServerError::Transport`] if the socket has no local address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// A cloneable handle for configuration changes while the bouncer runs.
    pub fn handle(&self) -> BouncerHandle<D> {
        BouncerHandle {
            driver: Arc::clone(&self.driver),
            datastore: self.datastore.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run the bouncer: dial the stored networks, then accept clients.
    ///
    /// Runs until shut down or the listener fails.
    ///
    /// # Errors
    ///
    /// [`ServerError::Datastore`] when the stored networks or channels
    /// cannot be loaded.
    pub async fn run(self) -> Result<(), ServerError> {
        let networks = self.datastore.networks()?;
        let channels = self.datastore.channels(None)?;
        tracing::info!(
            "loaded {} stored network(s), {} stored channel(s)",
            networks.len(),
            channels.len()
        );

        {
            let mut driver = self.driver.lock().await;
            let actions = driver.startup(networks, channels);
            execute_actions(actions, &self.driver, &self.shared).await;
        }

        loop {
            match self.transport.accept().await {
                Ok((stream, addr)) => {
                    let client_id = self.shared.allocate_id();
                    tracing::debug!("client {client_id} connected from {addr}");

                    let (read, write) = stream.into_split();
                    {
                        let mut writers = self.shared.client_writers.write().await;
                        writers.insert(client_id, Mutex::new(write));
                    }

                    let driver = Arc::clone(&self.driver);
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        client_session(client_id, read, driver, shared).await;
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }
}

/// Configuration surface for a running bouncer.
///
/// Cheap to clone; every clone drives the same relay and datastore.
pub struct BouncerHandle<D: Datastore> {
    driver: Arc<Mutex<RelayDriver>>,
    datastore: D,
    shared: Arc<SharedState>,
}

impl<D: Datastore> Clone for BouncerHandle<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            datastore: self.datastore.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: Datastore> BouncerHandle<D> {
    /// Configure a network, persist it, and dial it.
    ///
    /// # Errors
    ///
    /// [`ServerError::Datastore`] when the record cannot be persisted; the
    /// network is not dialed in that case.
    pub async fn add_network(
        &self,
        network: &str,
        creds: NetworkCredentials,
    ) -> Result<(), ServerError> {
        self.datastore.store_network(network, &creds)?;
        let mut driver = self.driver.lock().await;
        let actions = driver.add_network(network, creds);
        execute_actions(actions, &self.driver, &self.shared).await;
        Ok(())
    }

    /// Remove a network, delete its record, and close its upstream.
    ///
    /// # Errors
    ///
    /// [`ServerError::Datastore`] when the record cannot be deleted.
    pub async fn remove_network(&self, network: &str) -> Result<(), ServerError> {
        self.datastore.remove_network(network)?;
        let mut driver = self.driver.lock().await;
        let actions = driver.remove_network(network);
        execute_actions(actions, &self.driver, &self.shared).await;
        Ok(())
    }

    /// Persist a channel and join it on the network's live upstream.
    ///
    /// # Errors
    ///
    /// [`ServerError::Datastore`] when the record cannot be persisted; no
    /// JOIN is sent in that case.
    pub async fn add_channel(
        &self,
        network: &str,
        channel: &str,
        key: Option<&str>,
    ) -> Result<(), ServerError> {
        self.datastore.store_channel(network, channel, key)?;
        let mut driver = self.driver.lock().await;
        let actions = driver.add_channel(network, channel, key);
        execute_actions(actions, &self.driver, &self.shared).await;
        Ok(())
    }

    /// Delete a channel record and part it on the network's live upstream.
    ///
    /// # Errors
    ///
    /// [`ServerError::Datastore`] when the record cannot be deleted.
    pub async fn remove_channel(&self, network: &str, channel: &str) -> Result<(), ServerError> {
        self.datastore.remove_channel(network, channel)?;
        let mut driver = self.driver.lock().await;
        let actions = driver.remove_channel(network, channel);
        execute_actions(actions, &self.driver, &self.shared).await;
        Ok(())
    }

    /// Hash and store the access password.
    ///
    /// # Errors
    ///
    /// [`ServerError::Datastore`] when hashing or storage fails.
    pub fn set_password(&self, password: &str) -> Result<(), ServerError> {
        self.datastore.set_password(password)?;
        Ok(())
    }
}

/// Feed one event through the driver and execute the resulting actions.
///
/// The driver lock is held until the actions have hit the sockets, so two
/// events processed back to back cannot have their writes interleave. In
/// particular a backlog replay finishes before any later live line.
///
/// A `RelayError` means the event raced a close; it is logged and dropped.
///
/// Returns a boxed future to break the `dispatch` → `execute_actions` →
/// spawned `upstream_session` → `dispatch` cycle that otherwise prevents the
/// compiler from proving the spawned future is `Send`.
fn dispatch<'a>(
    event: RelayEvent,
    driver: &'a Arc<Mutex<RelayDriver>>,
    shared: &'a Arc<SharedState>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let mut guard = driver.lock().await;
        match guard.process_event(event) {
            Ok(actions) => execute_actions(actions, driver, shared).await,
            Err(e) => tracing::debug!("dropping event: {e}"),
        }
    })
}

/// Execute relay actions.
///
/// Called with the driver lock held; never locks the driver itself.
/// `ConnectUpstream` only spawns the session task, which takes the lock on
/// its own schedule.
async fn execute_actions(
    actions: Vec<RelayAction>,
    driver: &Arc<Mutex<RelayDriver>>,
    shared: &Arc<SharedState>,
) {
    for action in actions {
        match action {
            RelayAction::ConnectUpstream { network, hostname, port } => {
                let driver = Arc::clone(driver);
                let shared = Arc::clone(shared);
                tokio::spawn(async move {
                    upstream_session(network, hostname, port, driver, shared).await;
                });
            },

            RelayAction::SendUpstream { conn_id, bytes } => {
                let writers = shared.upstream_writers.read().await;
                if let Some(writer) = writers.get(&conn_id) {
                    if let Err(e) = writer.lock().await.write_all(&bytes).await {
                        tracing::warn!("upstream write failed for conn {conn_id}: {e}");
                    }
                } else {
                    tracing::warn!("SendUpstream: conn {conn_id} not found");
                }
            },

            RelayAction::SendClient { client_id, bytes } => {
                let writers = shared.client_writers.read().await;
                if let Some(writer) = writers.get(&client_id) {
                    if let Err(e) = writer.lock().await.write_all(&bytes).await {
                        tracing::warn!("client write failed for {client_id}: {e}");
                    }
                } else {
                    tracing::warn!("SendClient: client {client_id} not found");
                }
            },

            RelayAction::CloseUpstream { conn_id, reason } => {
                tracing::info!("closing upstream conn {conn_id}: {reason}");
                let mut writers = shared.upstream_writers.write().await;
                if let Some(writer) = writers.remove(&conn_id) {
                    let _ = writer.lock().await.shutdown().await;
                }
            },

            RelayAction::CloseClient { client_id, reason } => {
                tracing::info!("closing client {client_id}: {reason}");
                let mut writers = shared.client_writers.write().await;
                if let Some(writer) = writers.remove(&client_id) {
                    let _ = writer.lock().await.shutdown().await;
                }
            },

            RelayAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

/// Dial one network and relay its traffic until the socket closes.
async fn upstream_session(
    network: String,
    hostname: String,
    port: u16,
    driver: Arc<Mutex<RelayDriver>>,
    shared: Arc<SharedState>,
) {
    let stream = match transport::dial(&hostname, port).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("network {network}: {e}");
            return;
        },
    };

    let conn_id = shared.allocate_id();
    let (mut read, write) = stream.into_split();
    {
        let mut writers = shared.upstream_writers.write().await;
        writers.insert(conn_id, Mutex::new(write));
    }

    dispatch(RelayEvent::UpstreamConnected { network: network.clone(), conn_id }, &driver, &shared)
        .await;

    let reason = read_loop(&mut read, |bytes| RelayEvent::UpstreamData { conn_id, bytes }, &driver, &shared)
        .await;

    {
        let mut writers = shared.upstream_writers.write().await;
        writers.remove(&conn_id);
    }

    dispatch(RelayEvent::UpstreamClosed { conn_id, reason }, &driver, &shared).await;
}

/// Relay one client's traffic until the socket closes.
async fn client_session(
    client_id: u64,
    mut read: OwnedReadHalf,
    driver: Arc<Mutex<RelayDriver>>,
    shared: Arc<SharedState>,
) {
    dispatch(RelayEvent::ClientConnected { client_id }, &driver, &shared).await;

    let reason = read_loop(&mut read, |bytes| RelayEvent::ClientData { client_id, bytes }, &driver, &shared)
        .await;
    tracing::debug!("client {client_id} read loop ended: {reason}");

    {
        let mut writers = shared.client_writers.write().await;
        writers.remove(&client_id);
    }

    dispatch(RelayEvent::ClientClosed { client_id }, &driver, &shared).await;
}

/// Pump socket reads into the driver until EOF or a read error.
///
/// Returns the close reason. Each read becomes one event; partial lines are
/// the driver's problem, not the runtime's.
async fn read_loop(
    read: &mut OwnedReadHalf,
    to_event: impl Fn(Vec<u8>) -> RelayEvent,
    driver: &Arc<Mutex<RelayDriver>>,
    shared: &Arc<SharedState>,
) -> String {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        buf.clear();
        match read.read_buf(&mut buf).await {
            Ok(0) => return "connection closed".to_string(),
            Ok(_) => {
                dispatch(to_event(buf.to_vec()), driver, shared).await;
            },
            Err(e) => return format!("read error: {e}"),
        }
    }
}
