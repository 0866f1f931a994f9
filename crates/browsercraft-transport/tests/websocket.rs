//! Integration tests for the WebSocket transport over a real socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use browsercraft_transport::{Connection, Handshake, Transport, WebSocketTransport};
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn bind_and_accept() -> (browsercraft_transport::WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr");

        let accept = tokio::spawn(async move {
            let pending = transport.accept().await.expect("should accept");
            pending.complete().await.expect("should upgrade")
        });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let server = accept.await.expect("accept task");
        (server, client)
    }

    #[tokio::test]
    async fn test_send_and_receive_both_directions() {
        let (server, mut client) = bind_and_accept().await;
        assert!(server.id().into_inner() > 0);

        server.send(br#"{"hello":"client"}"#).await.expect("send");
        let msg = client.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "utf-8 frames go out as text");
        assert_eq!(msg.into_data().as_ref(), br#"{"hello":"client"}"#);

        client
            .send(Message::Text(r#"{"hello":"server"}"#.into()))
            .await
            .unwrap();
        let received = server.recv().await.expect("recv").expect("data");
        assert_eq!(received, br#"{"hello":"server"}"#);

        server.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_client_close() {
        let (server, mut client) = bind_and_accept().await;
        client.send(Message::Close(None)).await.unwrap();

        let result = server.recv().await.expect("recv should not error");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_send_is_not_blocked_by_pending_recv() {
        let (server, mut client) = bind_and_accept().await;
        let server = std::sync::Arc::new(server);

        let reader = {
            let server = std::sync::Arc::clone(&server);
            tokio::spawn(async move { server.recv().await })
        };
        // Give the reader time to park inside recv.
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(2), server.send(b"tick"))
            .await
            .expect("send must not wait for the reader")
            .expect("send");
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"tick");

        client.send(Message::Close(None)).await.unwrap();
        let read = reader.await.unwrap().expect("recv");
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_accept_does_not_wait_for_the_upgrade() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr");

        // Connects but never sends an upgrade request.
        let _silent = tokio::net::TcpStream::connect(addr).await.expect("tcp connect");
        let stalled = tokio::time::timeout(Duration::from_secs(2), transport.accept())
            .await
            .expect("accept returns before any handshake")
            .expect("accept");
        assert_eq!(stalled.peer_addr().ip(), addr.ip());

        let client = tokio::spawn(tokio_tungstenite::connect_async(format!("ws://{addr}")));
        let pending = tokio::time::timeout(Duration::from_secs(2), transport.accept())
            .await
            .expect("second socket is accepted while the first is stalled")
            .expect("accept");
        let server = pending.complete().await.expect("upgrade");
        let (mut client, _) = client.await.unwrap().expect("client connects");

        server.send(b"hello").await.expect("send");
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_garbage_upgrade_is_a_handshake_error() {
        use tokio::io::AsyncWriteExt;

        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr");

        let mut raw = tokio::net::TcpStream::connect(addr).await.expect("tcp connect");
        raw.write_all(b"hello there\r\n\r\n").await.expect("write");

        let pending = transport.accept().await.expect("accept");
        let err = pending.complete().await.err().expect("upgrade must fail");
        assert!(matches!(err, browsercraft_transport::TransportError::HandshakeFailed(_)));
    }
}
