//! Downstream endpoint: one attached user client.
//!
//! Holds only the per-client framing state. The client's broker pairing
//! lives in the registry as a lookup key, and the fan-out logic lives in the
//! driver - a downstream endpoint never holds a reference to its upstream.

use pylon_proto::{LineBuffer, ProtocolError};

/// Framing state for one connected user client.
#[derive(Debug, Default)]
pub struct DownstreamEndpoint {
    buffer: LineBuffer,
}

impl DownstreamEndpoint {
    /// Create an endpoint for a freshly accepted client socket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes read from the client socket, returning complete lines.
    ///
    /// # Errors
    ///
    /// [`ProtocolError`] on undecodable bytes; fatal to this client only.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, ProtocolError> {
        self.buffer.feed(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_reassembles_client_lines() {
        let mut endpoint = DownstreamEndpoint::new();
        assert!(endpoint.feed(b"PRIVMSG #c ").unwrap().is_empty());
        let lines = endpoint.feed(b":hello\r\n").unwrap();
        assert_eq!(lines, vec!["PRIVMSG #c :hello"]);
    }
}
