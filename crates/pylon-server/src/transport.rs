//! TCP transport for client and network connections.
//!
//! The bouncer speaks plain TCP on both sides: it listens for IRC clients on
//! the bind address and dials out to IRC networks. Each accepted or dialed
//! socket is split into owned read and write halves so reads can run in
//! their own task while writes go through the shared connection maps.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::error::ServerError;

/// TCP listener for downstream client connections.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Create and bind a new TCP transport.
    ///
    /// # Errors
    ///
    /// `ServerError::Config` for an unparseable address,
    /// `ServerError::Transport` when the bind itself fails.
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        Ok(Self { listener })
    }

    /// Accept the next client connection.
    ///
    /// # Errors
    ///
    /// `ServerError::Transport` on accept failure; the caller logs and keeps
    /// accepting.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))?;
        stream.set_nodelay(true)?;
        Ok((stream, addr))
    }

    /// Local address the transport is bound to.
    ///
    /// # Errors
    ///
    /// `ServerError::Transport` if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }
}

/// Dial an IRC network.
///
/// Hostname resolution happens here; a multi-homed network connects to the
/// first address that accepts.
///
/// # Errors
///
/// `ServerError::Transport` when resolution or the connect fails.
pub async fn dial(hostname: &str, port: u16) -> Result<TcpStream, ServerError> {
    let stream = TcpStream::connect((hostname, port))
        .await
        .map_err(|e| ServerError::Transport(format!("failed to dial {hostname}:{port}: {e}")))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_rejects_invalid_address() {
        let result = TcpTransport::bind("not an address").await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn bind_and_accept_round_trip() {
        let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();

        let dialer = tokio::spawn(async move { TcpStream::connect(addr).await });

        let (stream, peer) = transport.accept().await.unwrap();
        assert_eq!(stream.local_addr().unwrap(), addr);
        assert_eq!(peer, dialer.await.unwrap().unwrap().local_addr().unwrap());
    }

    #[tokio::test]
    async fn dial_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = dial("127.0.0.1", addr.port()).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }
}
