//! Integration tests for the WebSocket transport.
//!
//! These tests spin up a real WebSocket server with `tokio-tungstenite`
//! and dial it through [`WebSocketConnector`], so frames actually cross a
//! loopback socket.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use hookman_transport::{Connection, Connector, Frame, TransportError, WebSocketConnector};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Helper: binds a listener on a random port and returns it with the
    /// `ws://` URL a client should dial.
    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}"))
    }

    async fn accept(listener: TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed")
    }

    #[tokio::test]
    async fn test_websocket_send_and_receive_text() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept(listener));

        let conn = WebSocketConnector
            .connect(&url)
            .await
            .expect("client should connect");
        let mut server_ws = server.await.expect("task should complete");

        assert!(conn.id().into_inner() > 0);

        // --- Client sends, server receives ---
        conn.send(r#"{"id":"auth","type":"auth","key":"k"}"#)
            .await
            .expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert_eq!(
            msg.into_text().unwrap().as_str(),
            r#"{"id":"auth","type":"auth","key":"k"}"#
        );

        // --- Server sends, client receives ---
        server_ws
            .send(Message::text(r#"{"type":"event","payload":1}"#))
            .await
            .unwrap();
        let frame = conn.recv().await.expect("recv should succeed");
        assert_eq!(
            frame,
            Frame::Text(r#"{"type":"event","payload":1}"#.into())
        );
    }

    #[tokio::test]
    async fn test_websocket_binary_utf8_is_read_as_text() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept(listener));
        let conn = WebSocketConnector.connect(&url).await.unwrap();
        let mut server_ws = server.await.unwrap();

        server_ws
            .send(Message::Binary(b"{\"type\":\"event\"}".to_vec().into()))
            .await
            .unwrap();
        assert_eq!(
            conn.recv().await.unwrap(),
            Frame::Text("{\"type\":\"event\"}".into())
        );
    }

    #[tokio::test]
    async fn test_websocket_server_close_carries_details() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept(listener));
        let conn = WebSocketConnector.connect(&url).await.unwrap();
        let mut server_ws = server.await.unwrap();

        server_ws
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "maintenance".into(),
            }))
            .await
            .unwrap();

        match conn.recv().await.expect("recv should not error") {
            Frame::Closed(details) => {
                assert_eq!(details.code, 1001);
                assert_eq!(details.reason, "maintenance");
                assert!(details.was_clean);
            }
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_send_after_close_is_not_open() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept(listener));
        let conn = WebSocketConnector.connect(&url).await.unwrap();
        let _server_ws = server.await.unwrap();

        conn.close().await.expect("close should succeed");
        let result = conn.send("late").await;
        assert!(matches!(result, Err(TransportError::NotOpen)));
    }

    #[tokio::test]
    async fn test_websocket_connect_refused() {
        // Bind then drop to get a port that nothing listens on.
        let (listener, url) = listen().await;
        drop(listener);
        let result = WebSocketConnector.connect(&url).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
