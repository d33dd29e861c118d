/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The connection was never opened or has already been closed.
    #[error("connection is not open")]
    NotOpen,

    /// The connection was closed by the remote side.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed. The connection is unusable afterwards.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// A frame arrived that cannot be turned into text.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

impl TransportError {
    /// Returns `true` if the connection cannot be used after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidFrame(_))
    }
}
