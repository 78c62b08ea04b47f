//! Pylon relay engine.
//!
//! The bouncer core: one persistent upstream connection per configured IRC
//! network, fanned out to a dynamic set of downstream clients, with chat
//! backlog replay across client disconnects.
//!
//! # Architecture
//!
//! Everything here is sans-IO. [`RelayDriver`] consumes [`RelayEvent`]s
//! produced by a runtime (socket established, bytes received, peer closed)
//! and returns [`RelayAction`]s for that runtime to execute (write these
//! bytes, close that connection). The driver is a single-threaded state
//! machine: the runtime serializes events through it, so the registry's
//! collections mutate atomically with respect to I/O suspension points and
//! never need their own locking.
//!
//! # Components
//!
//! - [`UpstreamEndpoint`]: per-network connection state machine
//!   (authentication, classification, buffering)
//! - [`DownstreamEndpoint`]: per-client framing state
//! - [`RelayRegistry`]: the shared coordinator mapping network identities to
//!   live upstreams and clients to their brokers
//! - [`RelayDriver`]: event→action orchestrator tying them together

mod config;
mod downstream;
mod driver;
mod error;
mod registry;
mod upstream;

pub use config::NetworkCredentials;
pub use downstream::DownstreamEndpoint;
pub use driver::{LogLevel, RelayAction, RelayDriver, RelayEvent};
pub use error::RelayError;
pub use registry::{ClientInfo, RelayRegistry};
pub use upstream::{UpstreamAction, UpstreamEndpoint, UpstreamState};
