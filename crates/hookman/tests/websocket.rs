//! End-to-end test: a full client session against a scripted WebSocket
//! service on a loopback socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hookman::prelude::*;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

async fn read_json(ws: &mut ServerWs) -> Value {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for client")
            .expect("client hung up")
            .expect("read should succeed");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("client sent invalid JSON");
        }
    }
}

async fn send_json(ws: &mut ServerWs, value: Value) {
    ws.send(Message::text(value.to_string()))
        .await
        .expect("server send should succeed");
}

#[tokio::test]
async fn test_full_session_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let url = format!("ws://{}", listener.local_addr().expect("should have addr"));

    let service = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("should accept");
        let mut ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed");

        let auth = read_json(&mut ws).await;
        assert_eq!(auth, json!({"id": "auth", "type": "auth", "key": "e2e-key"}));
        send_json(
            &mut ws,
            json!({"id": "auth", "type": "auth", "ack": true, "client_token": "tok-1"}),
        )
        .await;

        let listen = read_json(&mut ws).await;
        assert_eq!(listen["type"], "listen");
        assert_eq!(listen["channel"], "news");
        send_json(&mut ws, json!({"id": listen["id"], "type": "listen", "ack": true})).await;

        // Echo the publish back as a topic event.
        let ccast = read_json(&mut ws).await;
        assert_eq!(ccast["type"], "ccast");
        send_json(
            &mut ws,
            json!({"type": "event", "channel": ccast["channel"], "payload": ccast["payload"]}),
        )
        .await;

        // Keep reading so the close handshake completes; the stream ends
        // once the client has hung up.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = HookmanClient::builder("e2e-key").endpoint(url).build();

    let (connect_tx, mut connected) = mpsc::unbounded_channel();
    client
        .on(&Listener::Connect(Handler::from_fn(move |info: ConnectInfo| {
            let _ = connect_tx.send(info);
        })))
        .await;
    let (disconnect_tx, mut disconnected) = mpsc::unbounded_channel();
    client
        .on(&Listener::Disconnect(Handler::from_fn(move |details: CloseDetails| {
            let _ = disconnect_tx.send(details);
        })))
        .await;

    client.init().await.expect("init should succeed");
    let info = tokio::time::timeout(WAIT, connected.recv())
        .await
        .expect("timed out waiting for connect")
        .expect("channel open");
    assert_eq!(info.client_token.as_deref(), Some("tok-1"));

    let (news_tx, mut news) = mpsc::unbounded_channel();
    let on_news = Handler::from_fn(move |payload: Value| {
        let _ = news_tx.send(payload);
    });
    client.subscribe("news", &on_news).await.expect("subscribe");
    client
        .publish("news", &json!({"headline": "hi"}))
        .await
        .expect("publish");

    let payload = tokio::time::timeout(WAIT, news.recv())
        .await
        .expect("timed out waiting for topic event")
        .expect("channel open");
    assert_eq!(payload, json!({"headline": "hi"}));

    client.close().await.expect("close");
    let details = tokio::time::timeout(WAIT, disconnected.recv())
        .await
        .expect("timed out waiting for disconnect")
        .expect("channel open");
    assert_eq!(details.code, 1000);
    assert_eq!(client.state(), ConnectionState::Closed);

    service.await.expect("service task should finish cleanly");
}
