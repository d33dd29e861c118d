//! Echo bot: listens on a topic and sends every payload back to the
//! client named in its `reply_to` field, or to the whole topic when there
//! is none.
//!
//! ```text
//! HOOKMAN_API_KEY=... cargo run -p hookman-echo
//! ```
//!
//! `HOOKMAN_ENDPOINT` overrides the service URL and `HOOKMAN_TOPIC` the
//! topic (default `echo`). Log verbosity follows `RUST_LOG`.

use hookman::HandlerError;
use hookman::prelude::*;
use serde_json::{Value, json};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_TOPIC: &str = "echo";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hookman=info,hookman_echo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let api_key = std::env::var("HOOKMAN_API_KEY").map_err(|_| "HOOKMAN_API_KEY is not set")?;
    let topic = std::env::var("HOOKMAN_TOPIC").unwrap_or_else(|_| DEFAULT_TOPIC.to_owned());

    let mut builder = HookmanClient::builder(api_key);
    if let Ok(endpoint) = std::env::var("HOOKMAN_ENDPOINT") {
        builder = builder.endpoint(endpoint);
    }
    let client = builder.build();
    tracing::info!(config = ?client.config(), %topic, "starting");

    client
        .on(&Listener::Connect(Handler::from_fn(|info: ConnectInfo| {
            tracing::info!(token = ?info.client_token, "connected");
        })))
        .await;
    client
        .on(&Listener::Disconnect(Handler::from_fn(|details: CloseDetails| {
            tracing::info!(%details, "disconnected");
        })))
        .await;
    client
        .on(&Listener::Error(Handler::from_fn(|err: HookmanError| {
            tracing::warn!(error = %err, "client error");
        })))
        .await;

    let echo = {
        let client = client.clone();
        let topic = topic.clone();
        Handler::new(move |payload: Value| {
            let client = client.clone();
            let topic = topic.clone();
            async move {
                // Skip our own echoes coming back around the topic.
                if payload.get("echo").is_some() {
                    return Ok::<(), HandlerError>(());
                }
                let reply_to = payload.get("reply_to").and_then(Value::as_str).map(str::to_owned);
                let reply = json!({ "echo": payload });
                match reply_to {
                    Some(token) => client.send_to_client_token(&reply, &token).await?,
                    None => client.publish(&topic, &reply).await?,
                }
                Ok(())
            }
        })
    };

    client.init().await?;
    client.subscribe(&topic, &echo).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    client.close().await?;
    Ok(())
}
