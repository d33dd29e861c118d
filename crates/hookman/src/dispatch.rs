//! Inbound routing: turns decoded frames into lifecycle events and topic
//! deliveries.
//!
//! Routing decisions (which handler set, which state transition) are made
//! in frame arrival order by the caller awaiting [`Dispatcher::handle_text`].
//! The resulting fan-outs are queued on ordered delivery lanes (see
//! [`crate::delivery`]), so handlers see events in the order the frames
//! arrived, and a slow topic handler delays only later deliveries on that
//! topic.

use std::sync::Arc;

use hookman_protocol::{AuthOutcome, Codec, Envelope, Inbound, JsonCodec};
use hookman_transport::{CloseDetails, TransportError};
use serde_json::Value;
use tokio::sync::{Mutex, watch};

use crate::delivery::{Delivery, Lane};
use crate::error::HookmanError;
use crate::handler::{ConnectInfo, FanOut, GeneralHandlers};
use crate::registry::{Routing, SubscriptionRegistry};
use crate::state::ConnectionState;

/// Shared routing state for one client: listeners, topic registry, and
/// connection state.
pub(crate) struct Dispatcher {
    codec: JsonCodec,
    pub(crate) general: Mutex<GeneralHandlers>,
    pub(crate) topics: Mutex<SubscriptionRegistry>,
    state: watch::Sender<ConnectionState>,
    client_token: Mutex<Option<String>>,
    delivery: Delivery,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        Self {
            codec: JsonCodec,
            general: Mutex::new(GeneralHandlers::new()),
            topics: Mutex::new(SubscriptionRegistry::new()),
            state,
            client_token: Mutex::new(None),
            delivery: Delivery::new(),
        }
    }

    // -- Connection state --

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Moves to `target` if the state machine allows it.
    pub(crate) fn transition(&self, target: ConnectionState) -> bool {
        let mut moved = false;
        self.state.send_if_modified(|current| {
            if current.can_transition_to(target) {
                tracing::debug!(from = %current, to = %target, "connection state");
                *current = target;
                moved = true;
            }
            moved
        });
        moved
    }

    pub(crate) async fn client_token(&self) -> Option<String> {
        self.client_token.lock().await.clone()
    }

    // -- Inbound frames --

    /// Decodes and routes one inbound text frame.
    ///
    /// Nothing escapes: a frame that doesn't decode becomes an `error`
    /// event and is dropped.
    pub(crate) async fn handle_text(self: &Arc<Self>, text: &str) {
        match self.codec.decode_envelope(text) {
            Ok(envelope) => self.route(envelope).await,
            Err(e) => {
                tracing::debug!(error = %e, "dropping undecodable frame");
                self.emit_error(e.into()).await;
            }
        }
    }

    /// Routes a decoded envelope by its type.
    pub(crate) async fn route(self: &Arc<Self>, envelope: Envelope) {
        match envelope.into_inbound() {
            Inbound::Auth(AuthOutcome::Rejected { message }) => {
                tracing::warn!(%message, "authentication rejected");
                self.transition(ConnectionState::Disconnected);
                self.emit_error(HookmanError::Auth(message)).await;
            }
            Inbound::Auth(AuthOutcome::Accepted { client_token }) => {
                tracing::info!("authenticated");
                self.client_token.lock().await.clone_from(&client_token);
                self.transition(ConnectionState::Ready);
                self.emit_connect(ConnectInfo { client_token }).await;
            }
            Inbound::Event {
                channel: Some(topic),
                payload,
            } => {
                let routing = self.topics.lock().await.dispatch(&topic, payload);
                match routing {
                    Ok(Routing::Topic(fan)) => {
                        tracing::trace!(%topic, handlers = fan.len(), "topic event");
                        self.deliver(Lane::Topic(topic), fan);
                    }
                    Ok(Routing::Unrouted(payload)) => self.emit_message(payload).await,
                    Err(e) => self.emit_error(e.into()).await,
                }
            }
            Inbound::Event {
                channel: None,
                payload,
            } => self.emit_message(payload).await,
            Inbound::BroadcastToggled { enabled } => {
                if enabled {
                    tracing::info!("broadcasts enabled");
                } else {
                    tracing::info!("broadcasts disabled");
                }
            }
            Inbound::Ignored(kind) => {
                tracing::debug!(%kind, "ignoring envelope");
            }
        }
    }

    // -- Transport notifications --

    /// The transport closed: state → `Closed`, then `disconnect`.
    pub(crate) async fn on_closed(self: &Arc<Self>, details: CloseDetails) {
        self.transition(ConnectionState::Closed);
        self.emit_disconnect(details).await;
    }

    /// The transport reported an error. State is left alone.
    pub(crate) async fn on_transport_error(self: &Arc<Self>, err: TransportError) {
        self.emit_error(err.into()).await;
    }

    // -- Lifecycle events --

    pub(crate) async fn emit_connect(self: &Arc<Self>, info: ConnectInfo) {
        let fan = self.general.lock().await.connect.fan_out("connect", info);
        self.deliver(Lane::Lifecycle, fan);
    }

    pub(crate) async fn emit_disconnect(self: &Arc<Self>, details: CloseDetails) {
        let fan = self
            .general
            .lock()
            .await
            .disconnect
            .fan_out("disconnect", details);
        self.deliver(Lane::Lifecycle, fan);
    }

    pub(crate) async fn emit_message(self: &Arc<Self>, payload: Value) {
        let fan = self.general.lock().await.message.fan_out("message", payload);
        self.deliver(Lane::Lifecycle, fan);
    }

    /// Delivers `err` to `error` listeners. With none registered the error
    /// is dropped.
    pub(crate) async fn emit_error(&self, err: HookmanError) {
        let fan = {
            let general = self.general.lock().await;
            if general.error.is_empty() {
                tracing::debug!(error = %err, "no error listener, dropping");
                return;
            }
            general.error.fan_out("error", err)
        };
        self.delivery.enqueue(
            Lane::Lifecycle,
            Box::pin(async move {
                // A failing error listener has nowhere left to report to.
                for failure in fan.run().await {
                    tracing::warn!(error = %failure, "error listener failed");
                }
            }),
        );
    }

    /// Forgets `topic`'s delivery lane once nothing listens to it.
    pub(crate) fn retire_topic(&self, topic: &str) {
        self.delivery.retire_topic(topic);
    }

    /// Queues `fan` on `lane`. Handler failures are reported as `error`
    /// events once the fan-out finishes.
    fn deliver<A: Clone + Send + 'static>(self: &Arc<Self>, lane: Lane, fan: FanOut<A>) {
        if fan.is_empty() {
            return;
        }
        let this = Arc::clone(self);
        self.delivery.enqueue(
            lane,
            Box::pin(async move {
                for failure in fan.run().await {
                    tracing::warn!(error = %failure, "handler failed");
                    this.emit_error(failure).await;
                }
            }),
        );
    }
}
