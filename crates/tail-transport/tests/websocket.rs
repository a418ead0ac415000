use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tail_transport::websocket::INCOMING_BACKLOG;
use tail_transport::{CloseReason, DialError, Frame, TailConnection, TailTransport, WebSocketTransport};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

#[test_timeout::tokio_timeout_test(20)]
async fn exchanges_text_and_binary_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let collector = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("upgrade");
        let hello = ws.next().await.expect("hello").expect("frame");
        assert_eq!(hello, Message::Text("run-1".into()));
        ws.send(Message::Text("12".into())).await.expect("reply");
        let data = ws.next().await.expect("data").expect("frame");
        assert_eq!(data, Message::Binary(b"tail bytes".to_vec()));
    });

    let transport = WebSocketTransport::new();
    let mut conn = transport
        .connect(&format!("ws://{addr}"), DIAL_TIMEOUT)
        .await
        .expect("dial");
    conn.send(Frame::Text("run-1".into())).await.expect("send hello");
    assert_eq!(conn.receive().await.expect("offset"), Frame::Text("12".into()));
    conn.send(Frame::Binary(Bytes::from_static(b"tail bytes")))
        .await
        .expect("send data");

    collector.await.expect("collector task");
    conn.close(CloseReason::Normal).await;
    conn.close(CloseReason::Normal).await;
    assert!(!conn.is_connected());
}

#[test_timeout::tokio_timeout_test(20)]
async fn dialing_a_closed_port_is_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = WebSocketTransport::new()
        .connect(&format!("ws://{addr}"), DIAL_TIMEOUT)
        .await
        .err()
        .expect("dial should fail");
    assert!(err.is_refused(), "expected refusal, got {err}");
}

#[test_timeout::tokio_timeout_test(20)]
async fn malformed_address_is_not_a_refusal() {
    let err = WebSocketTransport::new()
        .connect("not a url", DIAL_TIMEOUT)
        .await
        .err()
        .expect("dial should fail");
    assert!(matches!(err, DialError::Failed { .. }), "got {err}");
}

#[test_timeout::tokio_timeout_test(20)]
async fn peer_close_is_observed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let collector = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("upgrade");
        ws.close(None).await.expect("close");
    });

    let mut conn = WebSocketTransport::new()
        .connect(&format!("ws://{addr}"), DIAL_TIMEOUT)
        .await
        .expect("dial");
    collector.await.expect("collector task");

    assert!(conn.receive().await.is_err());
    assert!(!conn.is_connected());
}

#[test_timeout::tokio_timeout_test(20)]
async fn chatty_collector_cannot_grow_the_backlog() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let burst = INCOMING_BACKLOG * 8;

    let collector = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("upgrade");
        for n in 0..burst {
            ws.send(Message::Text(n.to_string())).await.expect("chatter");
        }
        ws.close(None).await.expect("close");
    });

    let mut conn = WebSocketTransport::new()
        .connect(&format!("ws://{addr}"), DIAL_TIMEOUT)
        .await
        .expect("dial");
    collector.await.expect("collector task");
    while conn.is_connected() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut buffered = 0;
    while let Ok(frame) = conn.receive().await {
        assert_eq!(frame, Frame::Text(buffered.to_string()));
        buffered += 1;
    }
    assert_eq!(buffered, INCOMING_BACKLOG);
}
