//! `HookmanClient` builder, connection lifecycle, and public API.
//!
//! This is the entry point for application code. It ties the layers
//! together: transport → protocol → dispatch → handlers on the way in,
//! and API call → registry → protocol → transport on the way out.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use hookman_protocol::{Codec, Command, JsonCodec, ProtocolError, RequestIds};
use hookman_transport::{Connection, Connector, Frame, TransportError, WebSocketConnector};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, watch};

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::HookmanError;
use crate::handler::{HookmanEvent, Listener};
use crate::registry::{Subscribed, TopicHandler, Unsubscribed};
use crate::state::ConnectionState;

/// Builder for configuring a [`HookmanClient`].
///
/// # Example
///
/// ```rust
/// use hookman::HookmanClient;
///
/// let client = HookmanClient::builder("my-api-key")
///     .endpoint("ws://localhost:9000")
///     .build();
/// assert_eq!(client.config().endpoint, "ws://localhost:9000");
/// ```
pub struct HookmanClientBuilder<T: Connector = WebSocketConnector> {
    config: ClientConfig,
    connector: T,
}

impl HookmanClientBuilder<WebSocketConnector> {
    /// Creates a builder with the default endpoint and WebSocket transport.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(api_key),
            connector: WebSocketConnector,
        }
    }
}

impl<T: Connector> HookmanClientBuilder<T> {
    /// Sets the service endpoint.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    /// Swaps the transport.
    pub fn connector<U: Connector>(self, connector: U) -> HookmanClientBuilder<U> {
        HookmanClientBuilder {
            config: self.config,
            connector,
        }
    }

    /// Builds the client. Nothing is connected until [`HookmanClient::init`].
    pub fn build(self) -> HookmanClient<T> {
        HookmanClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                connector: self.connector,
                codec: JsonCodec,
                ids: RequestIds::new(),
                dispatcher: Arc::new(Dispatcher::new()),
                conn: Mutex::new(None),
                initialized: AtomicBool::new(false),
            }),
        }
    }
}

struct ClientInner<T: Connector> {
    config: ClientConfig,
    connector: T,
    codec: JsonCodec,
    ids: RequestIds,
    dispatcher: Arc<Dispatcher>,
    /// `Some` from a successful `init` until `close` or the transport
    /// closing.
    conn: Mutex<Option<Arc<T::Connection>>>,
    initialized: AtomicBool,
}

impl<T: Connector> Drop for ClientInner<T> {
    /// The last handle is gone: close the connection so the reader task
    /// and the socket don't outlive the client.
    fn drop(&mut self) {
        let Some(conn) = self.conn.get_mut().take() else {
            return;
        };
        let conn_id = conn.id();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(%conn_id, "client dropped, closing connection");
                runtime.spawn(async move {
                    if let Err(e) = conn.close().await {
                        tracing::debug!(%conn_id, error = %e, "close on drop failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(%conn_id, "client dropped outside a runtime, connection not closed");
            }
        }
    }
}

/// A client for the Hookman publish/subscribe service.
///
/// Cloning is cheap and every clone drives the same connection. Dropping
/// the last clone closes the connection. A handler that captures a clone
/// keeps the client alive until it is unsubscribed or `close` is called.
pub struct HookmanClient<T: Connector = WebSocketConnector> {
    inner: Arc<ClientInner<T>>,
}

impl<T: Connector> Clone for HookmanClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl HookmanClient<WebSocketConnector> {
    /// Creates a WebSocket client for `api_key` on the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        HookmanClientBuilder::new(api_key).build()
    }

    /// Creates a builder.
    pub fn builder(api_key: impl Into<String>) -> HookmanClientBuilder {
        HookmanClientBuilder::new(api_key)
    }
}

impl<T: Connector> HookmanClient<T> {
    // -----------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.dispatcher.state()
    }

    /// A receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.dispatcher.subscribe_state()
    }

    /// The token from the last successful auth, if any. Routing never
    /// needs it; it's here for addressing unicast replies.
    pub async fn client_token(&self) -> Option<String> {
        self.inner.dispatcher.client_token().await
    }

    /// Topics with an active subscription, sorted.
    pub async fn topics(&self) -> Vec<String> {
        self.inner.dispatcher.topics.lock().await.topics()
    }

    /// Returns `true` if `topic` has an active subscription.
    pub async fn is_subscribed(&self, topic: &str) -> bool {
        self.inner.dispatcher.topics.lock().await.contains(topic)
    }

    /// Number of listeners registered for `event`.
    pub async fn listener_count(&self, event: HookmanEvent) -> usize {
        self.inner.dispatcher.general.lock().await.count(event)
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Opens the connection and sends the auth command.
    ///
    /// Must be called exactly once, before anything is sent. The
    /// outcome of auth arrives later as a `connect` or `error` event;
    /// there is no timeout on it.
    pub async fn init(&self) -> Result<(), HookmanError> {
        if self.inner.initialized.swap(true, Ordering::AcqRel) {
            return Err(self.report(HookmanError::AlreadyInitialized).await);
        }

        let dispatcher = &self.inner.dispatcher;
        let endpoint = self.inner.config.endpoint.as_str();
        dispatcher.transition(ConnectionState::Connecting);

        let conn = match self.inner.connector.connect(endpoint).await {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                tracing::warn!(endpoint, error = %e, "connect failed");
                dispatcher.transition(ConnectionState::Closed);
                return Err(self.report(e.into()).await);
            }
        };
        let conn_id = conn.id();
        tracing::info!(%conn_id, endpoint, "connection open");
        *self.inner.conn.lock().await = Some(Arc::clone(&conn));

        let auth = self
            .send_command(Command::Auth {
                key: self.inner.config.api_key.clone(),
            })
            .await;
        if auth.is_ok() {
            dispatcher.transition(ConnectionState::Authenticating);
        }

        // Started even if auth failed to go out, so the close that follows
        // still reaches `disconnect` listeners.
        tokio::spawn(read_loop(
            Arc::downgrade(&self.inner),
            Arc::clone(dispatcher),
            conn,
        ));
        auth
    }

    /// Closes the connection. Sends made afterwards fail.
    ///
    /// `disconnect` fires once the transport confirms the close. Calling
    /// this on a client that isn't open does nothing.
    pub async fn close(&self) -> Result<(), HookmanError> {
        let conn = self.inner.conn.lock().await.take();
        let Some(conn) = conn else {
            return Ok(());
        };
        tracing::info!(conn_id = %conn.id(), "closing connection");
        if let Err(e) = conn.close().await {
            return Err(self.report(HookmanError::send(e)).await);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Lifecycle listeners
    // -----------------------------------------------------------------

    /// Registers a lifecycle listener. Registering the same one twice has
    /// no effect.
    pub async fn on(&self, listener: &Listener) {
        let added = self.inner.dispatcher.general.lock().await.add(listener);
        if added {
            tracing::trace!(event = %listener.event(), "listener added");
        }
    }

    /// Unregisters a lifecycle listener.
    pub async fn off(&self, listener: &Listener) {
        let removed = self.inner.dispatcher.general.lock().await.remove(listener);
        if removed {
            tracing::trace!(event = %listener.event(), "listener removed");
        }
    }

    /// Alias of [`on`](Self::on).
    pub async fn add_event_listener(&self, listener: &Listener) {
        self.on(listener).await;
    }

    /// Alias of [`off`](Self::off).
    pub async fn remove_event_listener(&self, listener: &Listener) {
        self.off(listener).await;
    }

    // -----------------------------------------------------------------
    // Topics
    // -----------------------------------------------------------------

    /// Subscribes `handler` to `topic`.
    ///
    /// The first handler on a topic sends `listen`; later ones (and
    /// repeats of the same handler) send nothing. If `listen` can't be
    /// sent the subscription is rolled back.
    pub async fn subscribe(&self, topic: &str, handler: &TopicHandler) -> Result<(), HookmanError> {
        // Held across the send so entry creation and `listen` are atomic
        // with respect to other registry changes.
        let mut topics = self.inner.dispatcher.topics.lock().await;
        let outcome = match topics.subscribe(topic, handler) {
            Ok(outcome) => outcome,
            Err(e) => {
                drop(topics);
                return Err(self.report(e.into()).await);
            }
        };

        if outcome == Subscribed::NewSubscription {
            let sent = self
                .send_command(Command::Listen {
                    channel: topic.to_owned(),
                })
                .await;
            if let Err(e) = sent {
                topics.remove_topic(topic);
                return Err(e);
            }
            tracing::debug!(topic, "listening");
        }
        Ok(())
    }

    /// Unsubscribes `handler` from `topic`.
    ///
    /// Removing the topic's last handler sends `unlisten`. Unknown topics
    /// and handlers are ignored.
    pub async fn unsubscribe(&self, topic: &str, handler: &TopicHandler) -> Result<(), HookmanError> {
        let mut topics = self.inner.dispatcher.topics.lock().await;
        let outcome = match topics.unsubscribe(topic, handler) {
            Ok(outcome) => outcome,
            Err(e) => {
                drop(topics);
                return Err(self.report(e.into()).await);
            }
        };

        if outcome == Unsubscribed::LastUnsubscribed {
            // The entry stays removed even if this fails: a send failure
            // means the server-side subscription is gone with the socket.
            self.inner.dispatcher.retire_topic(topic);
            self.send_command(Command::Unlisten {
                channel: topic.to_owned(),
            })
            .await?;
            tracing::debug!(topic, "unlistened");
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------

    /// Publishes `message` to every subscriber of `topic`. Subscribing
    /// first isn't required.
    pub async fn publish<M>(&self, topic: &str, message: &M) -> Result<(), HookmanError>
    where
        M: Serialize + ?Sized,
    {
        self.send(message, None, Some(topic)).await
    }

    /// Sends `message` to every connected client.
    pub async fn broadcast<M>(&self, message: &M) -> Result<(), HookmanError>
    where
        M: Serialize + ?Sized,
    {
        self.send(message, None, None).await
    }

    /// Sends `message` to the one client holding `client_token`.
    pub async fn send_to_client_token<M>(
        &self,
        message: &M,
        client_token: &str,
    ) -> Result<(), HookmanError>
    where
        M: Serialize + ?Sized,
    {
        self.send(message, Some(client_token), None).await
    }

    /// Sends a `ccast`. Empty `client_token`/`channel` count as absent;
    /// with both absent the message is a broadcast.
    pub async fn send<M>(
        &self,
        message: &M,
        client_token: Option<&str>,
        channel: Option<&str>,
    ) -> Result<(), HookmanError>
    where
        M: Serialize + ?Sized,
    {
        let payload = match to_payload(message) {
            Ok(payload) => payload,
            Err(e) => return Err(self.report(e.into()).await),
        };
        self.send_command(Command::ccast(payload, client_token, channel))
            .await
    }

    /// Asks the service to deliver broadcasts to this client.
    pub async fn receive_broadcast_on(&self) -> Result<(), HookmanError> {
        self.send_command(Command::Broadcast { broadcast: true }).await
    }

    /// Asks the service to stop delivering broadcasts to this client.
    pub async fn receive_broadcast_off(&self) -> Result<(), HookmanError> {
        self.send_command(Command::Broadcast { broadcast: false }).await
    }

    /// Encodes and sends one command. Failures are reported to `error`
    /// listeners as well as returned.
    async fn send_command(&self, command: Command) -> Result<(), HookmanError> {
        let kind = command.kind();
        let text = match self.inner.codec.encode_command(&self.inner.ids, command) {
            Ok(text) => text,
            Err(e) => return Err(self.report(e.into()).await),
        };

        let conn = self.inner.conn.lock().await.clone();
        let Some(conn) = conn else {
            tracing::debug!(kind, "send on a connection that isn't open");
            return Err(self.report(HookmanError::send(TransportError::NotOpen)).await);
        };
        if let Err(e) = conn.send(&text).await {
            tracing::debug!(conn_id = %conn.id(), kind, error = %e, "send failed");
            return Err(self.report(HookmanError::send(e)).await);
        }
        tracing::trace!(conn_id = %conn.id(), kind, "command sent");
        Ok(())
    }

    /// Funnels `err` to `error` listeners and hands it back for returning.
    async fn report(&self, err: HookmanError) -> HookmanError {
        self.inner.dispatcher.emit_error(err.clone()).await;
        err
    }
}

fn to_payload<M: Serialize + ?Sized>(message: &M) -> Result<Value, ProtocolError> {
    serde_json::to_value(message).map_err(ProtocolError::Encode)
}

/// Reads frames until the connection closes, routing each one before
/// reading the next.
///
/// Holds the client only weakly so that dropping every handle closes the
/// connection, which in turn ends this loop.
async fn read_loop<T: Connector>(
    inner: Weak<ClientInner<T>>,
    dispatcher: Arc<Dispatcher>,
    conn: Arc<T::Connection>,
) {
    let conn_id = conn.id();
    loop {
        match conn.recv().await {
            Ok(Frame::Text(text)) => {
                tracing::trace!(%conn_id, len = text.len(), "frame received");
                dispatcher.handle_text(&text).await;
            }
            Ok(Frame::Closed(details)) => {
                tracing::info!(%conn_id, %details, "connection closed");
                if let Some(inner) = inner.upgrade() {
                    let mut slot = inner.conn.lock().await;
                    if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, &conn)) {
                        *slot = None;
                    }
                }
                dispatcher.on_closed(details).await;
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "transport error");
                dispatcher.on_transport_error(e).await;
            }
        }
    }
}
