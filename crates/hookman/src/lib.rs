//! # Hookman
//!
//! Async client for the Hookman publish/subscribe service.
//!
//! A [`HookmanClient`] keeps one WebSocket connection to the service,
//! authenticates it with an API key, and from then on lets the application
//! subscribe handlers to topics, publish to topics, message individual
//! clients by token, and broadcast. Connection lifecycle is surfaced through
//! `connect`, `disconnect`, `message` and `error` listeners.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hookman::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), HookmanError> {
//! let client = HookmanClient::new("my-api-key");
//!
//! client
//!     .on(&Listener::Connect(Handler::from_fn(|info: ConnectInfo| {
//!         println!("connected as {:?}", info.client_token);
//!     })))
//!     .await;
//!
//! let news = Handler::from_fn(|payload: serde_json::Value| println!("news: {payload}"));
//! client.init().await?;
//! client.subscribe("news", &news).await?;
//! client.publish("news", &json!({ "headline": "hello" })).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod delivery;
mod dispatch;
mod error;
mod handler;
mod registry;
mod state;

pub use client::{HookmanClient, HookmanClientBuilder};
pub use config::{ClientConfig, DEFAULT_ENDPOINT};
pub use error::{HandlerError, HandlerFailure, HookmanError};
pub use handler::{
    ConnectInfo, FanOut, GeneralHandlers, Handler, HandlerResult, HandlerSet, HookmanEvent,
    Listener,
};
pub use registry::{RegistryError, Routing, Subscribed, SubscriptionRegistry, TopicHandler, Unsubscribed};
pub use state::ConnectionState;

pub use hookman_protocol as protocol;
pub use hookman_transport as transport;
pub use hookman_transport::CloseDetails;

pub mod prelude {
    pub use crate::{
        ClientConfig, CloseDetails, ConnectInfo, ConnectionState, Handler, HandlerResult,
        HookmanClient, HookmanError, HookmanEvent, Listener, TopicHandler,
    };
}
