//! Unified error type for the Hookman client.

use std::sync::Arc;

use hookman_protocol::ProtocolError;
use hookman_transport::TransportError;

use crate::registry::RegistryError;

/// Error type returned by user handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Why a single handler invocation failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerFailure {
    /// The handler returned `Err`.
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),

    /// The handler panicked. Holds the panic message when it was a string.
    #[error("panicked: {0}")]
    Panicked(String),
}

/// Top-level error that wraps every failure the client can report.
///
/// Each variant is also what `error` listeners receive, so the type is
/// `Clone`; sources that aren't `Clone` themselves are held in an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HookmanError {
    /// The service rejected the API key. The connection stays open.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The transport reported an error.
    #[error("transport error: {0}")]
    Transport(#[source] Arc<TransportError>),

    /// An inbound frame couldn't be decoded, or a command couldn't be
    /// encoded.
    #[error(transparent)]
    Protocol(Arc<ProtocolError>),

    /// A command couldn't be sent, usually because the connection is
    /// closed or was never opened.
    #[error("send failed: {0}")]
    Send(#[source] Arc<TransportError>),

    /// The subscription registry found itself in a state it should never
    /// reach.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A listener or topic handler failed while being dispatched to.
    #[error("{target} handler failed: {failure}")]
    Handler {
        target: String,
        #[source]
        failure: HandlerFailure,
    },

    /// `init` was called on a client that was already initialized.
    #[error("client already initialized")]
    AlreadyInitialized,
}

impl HookmanError {
    /// Wraps a failed send.
    pub fn send(err: TransportError) -> Self {
        Self::Send(Arc::new(err))
    }

    /// Returns `true` for send failures caused by a closed or unopened
    /// connection.
    pub fn is_not_open(&self) -> bool {
        matches!(self, Self::Send(e) if matches!(**e, TransportError::NotOpen))
    }
}

impl From<TransportError> for HookmanError {
    fn from(err: TransportError) -> Self {
        Self::Transport(Arc::new(err))
    }
}

impl From<ProtocolError> for HookmanError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(Arc::new(err))
    }
}
