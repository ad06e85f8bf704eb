//! TCP terminals for serve mode.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use super::{LineTerminal, TransportKind};
use crate::error::TransportError;

/// Shown to connections turned away at capacity.
pub const BUSY_MESSAGE: &str = "server busy, please try again in a few minutes";

/// Parses `addr` and binds a listener.
///
/// # Errors
///
/// Returns [`TransportError::InvalidAddress`] for an unparsable address and
/// [`TransportError::Bind`] if binding fails.
pub async fn bind_listener(addr: &str) -> Result<TcpListener, TransportError> {
    let addr: SocketAddr = addr
        .trim()
        .parse()
        .map_err(|_| TransportError::InvalidAddress(addr.to_string()))?;
    TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source })
}

/// Wraps an accepted connection.
#[must_use]
pub fn tcp_terminal(stream: TcpStream, peer: SocketAddr, max_line: usize) -> LineTerminal<OwnedWriteHalf> {
    let _ = stream.set_nodelay(true);
    let (read, write) = stream.into_split();
    LineTerminal::new(read, write, TransportKind::Tcp, peer.to_string(), max_line)
}

/// Tells the peer the server is full and closes the connection.
pub async fn reject_busy(mut stream: TcpStream, peer: SocketAddr) {
    debug!(%peer, "rejecting connection at capacity");
    let _ = stream.write_all(BUSY_MESSAGE.as_bytes()).await;
    let _ = stream.write_all(b"\n").await;
    let _ = stream.shutdown().await;
}
