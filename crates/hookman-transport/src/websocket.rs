//! WebSocket transport implementation using `tokio-tungstenite`.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{CloseDetails, Connection, ConnectionId, Connector, Frame, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A [`Connector`] that dials a WebSocket endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let id = ConnectionId::next();
        tracing::debug!(%id, url, "opened WebSocket connection");

        // Sink and stream are locked separately so a send never waits
        // behind a pending receive.
        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
        })
    }
}

/// A single client-side WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closed: AtomicBool,
    broken: AtomicBool,
}

impl Connection for WebSocketConnection {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::NotOpen);
        }
        self.sink
            .lock()
            .await
            .send(Message::text(text))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    async fn recv(&self) -> Result<Frame, TransportError> {
        // After a receive error the stream is unusable; report the
        // abnormal close the remote never got to send.
        if self.broken.load(Ordering::Acquire) {
            return Ok(Frame::Closed(CloseDetails::abnormal(
                "connection lost",
            )));
        }

        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Frame::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec())
                        .map(Frame::Text)
                        .map_err(|_| {
                            TransportError::InvalidFrame(
                                "binary frame is not valid UTF-8".into(),
                            )
                        });
                }
                Some(Ok(Message::Close(frame))) => {
                    let details = match frame {
                        Some(frame) => CloseDetails {
                            code: u16::from(frame.code),
                            reason: frame.reason.as_str().to_owned(),
                            was_clean: true,
                        },
                        None => CloseDetails::normal(),
                    };
                    return Ok(Frame::Closed(details));
                }
                None => {
                    return Ok(Frame::Closed(CloseDetails::abnormal(
                        "stream ended without close frame",
                    )));
                }
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    self.broken.store(true, Ordering::Release);
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
