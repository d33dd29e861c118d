//! In-process transport: a client connection wired to a [`MemoryPeer`].
//!
//! The peer plays the service side. It sees every frame the client sends
//! and injects inbound frames, closes, and transport errors. Useful for
//! tests and for wiring the client to something that lives in the same
//! process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, mpsc};

use crate::{CloseDetails, Connection, ConnectionId, Connector, Frame, TransportError};

type Inbound = Result<Frame, TransportError>;

/// Creates a connected client/peer pair.
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    let conn = MemoryConnection {
        id: ConnectionId::next(),
        outbound: out_tx,
        inbound: Mutex::new(in_rx),
        loopback: in_tx.downgrade(),
        closed: Arc::clone(&closed),
        broken: AtomicBool::new(false),
    };
    let peer = MemoryPeer {
        sent: out_rx,
        inbound: in_tx,
        closed,
    };
    (conn, peer)
}

/// A [`Connector`] that hands out one pre-built [`MemoryConnection`].
///
/// Any later `connect` call fails, as does every call on a connector
/// built with [`MemoryConnector::refusing`].
pub struct MemoryConnector {
    slot: StdMutex<Option<MemoryConnection>>,
}

impl MemoryConnector {
    /// Creates a connector and the peer on the other end of its connection.
    pub fn pair() -> (Self, MemoryPeer) {
        let (conn, peer) = pair();
        let connector = Self {
            slot: StdMutex::new(Some(conn)),
        };
        (connector, peer)
    }

    /// A connector whose every `connect` fails.
    pub fn refusing() -> Self {
        Self {
            slot: StdMutex::new(None),
        }
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError> {
        let conn = self
            .slot
            .lock()
            .map_err(|_| refused("connector state poisoned"))?
            .take()
            .ok_or_else(|| refused("no connection available"))?;
        tracing::debug!(id = %conn.id, url, "opened in-memory connection");
        Ok(conn)
    }
}

fn refused(msg: &str) -> TransportError {
    TransportError::ConnectFailed(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        msg.to_owned(),
    ))
}

/// The client side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<String>,
    inbound: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    /// Weak so that dropping the peer still ends the inbound stream.
    loopback: mpsc::WeakUnboundedSender<Inbound>,
    closed: Arc<AtomicBool>,
    broken: AtomicBool,
}

impl Connection for MemoryConnection {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::NotOpen);
        }
        self.outbound
            .send(text.to_owned())
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Frame, TransportError> {
        if self.broken.load(Ordering::Acquire) {
            return Ok(Frame::Closed(CloseDetails::abnormal("connection lost")));
        }
        match self.inbound.lock().await.recv().await {
            Some(Err(e)) => {
                if e.is_fatal() {
                    self.broken.store(true, Ordering::Release);
                }
                Err(e)
            }
            Some(item) => item,
            None => Ok(Frame::Closed(CloseDetails::abnormal("peer dropped"))),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // Deliver our own close notification, like a closing handshake.
            if let Some(loopback) = self.loopback.upgrade() {
                let _ = loopback.send(Ok(Frame::Closed(CloseDetails::normal())));
            }
        }
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// The service side of an in-memory connection.
pub struct MemoryPeer {
    sent: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<Inbound>,
    closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Waits for the next frame the client sent.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Returns the next frame the client sent, if one is already queued.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Drains every frame the client has sent so far.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Delivers a text frame to the client. Returns `false` if the client
    /// connection is gone.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.inbound.send(Ok(Frame::Text(text.into()))).is_ok()
    }

    /// Closes the connection from the service side.
    pub fn push_close(&self, details: CloseDetails) -> bool {
        self.inbound.send(Ok(Frame::Closed(details))).is_ok()
    }

    /// Delivers a transport error to the client.
    pub fn push_error(&self, error: TransportError) -> bool {
        self.inbound.send(Err(error)).is_ok()
    }

    /// Returns `true` once the client closed its side.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
