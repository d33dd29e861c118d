//! Transport abstraction layer for the Hookman client.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! the socket the client talks through. The protocol engine only needs to
//! send a text frame, receive the next inbound frame, and close.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//!
//! The [`memory`] transport is always available. It connects a client to an
//! in-process peer and is what the client tests drive.

mod error;
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryConnection, MemoryConnector, MemoryPeer};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide connection ID.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Details of a closed connection, handed to `disconnect` listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseDetails {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason sent by the closing side, possibly empty.
    pub reason: String,
    /// `false` when the connection dropped without a closing handshake.
    pub was_clean: bool,
}

impl CloseDetails {
    /// A clean close with code 1000 and no reason.
    pub fn normal() -> Self {
        Self {
            code: CLOSE_NORMAL,
            reason: String::new(),
            was_clean: true,
        }
    }

    /// A connection that dropped without a closing handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
            was_clean: false,
        }
    }
}

impl fmt::Display for CloseDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            write!(f, "code {} ({})", self.code, self.reason)
        }
    }
}

/// One inbound event from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame.
    Text(String),
    /// The connection closed. No further frames follow.
    Closed(CloseDetails),
}

/// Opens client connections to a service endpoint.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a connection to `url`. Resolving successfully is the
    /// transport's "open" notification.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single open connection that carries text frames.
pub trait Connection: Send + Sync + 'static {
    /// Sends a text frame to the remote peer.
    ///
    /// Fails with [`TransportError::NotOpen`] once the connection has been
    /// closed locally.
    fn send(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next inbound frame.
    ///
    /// Returns [`Frame::Closed`] exactly once when the connection ends.
    fn recv(&self) -> impl Future<Output = Result<Frame, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
