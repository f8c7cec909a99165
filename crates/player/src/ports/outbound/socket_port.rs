//! Socket Port - raw text-frame transport to the game server
//!
//! A connector opens one socket and hands back a pair of channels. The
//! transport never sees the underlying websocket library, which lets tests
//! drive it with in-memory channels.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Invalid socket URL: {0}")]
    InvalidUrl(String),
}

/// Event surfaced by an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame arrived
    Text(String),
    /// The socket reported an error; a `Closed` normally follows
    Error(String),
    /// The socket closed (either side)
    Closed,
}

/// One open socket.
///
/// Dropping `outgoing` asks the adapter to close the socket.
#[derive(Debug)]
pub struct SocketConnection {
    pub outgoing: mpsc::Sender<String>,
    pub incoming: mpsc::Receiver<SocketEvent>,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SocketConnector: Send + Sync {
    /// Open a socket to `url`, resolving once the handshake completes.
    async fn connect(&self, url: &str) -> Result<SocketConnection, TransportError>;
}
