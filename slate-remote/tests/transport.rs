use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use slate_core::event::{EventKind, IntegrationEvent};
use slate_remote::{
    ClientCommand, ConnectionEvent, ReconnectPolicy, TransportClient, TransportOptions,
    register_handlers,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

fn options(port: u16, base_delay_ms: u64) -> TransportOptions {
    TransportOptions {
        host: "127.0.0.1".to_string(),
        port,
        auto_reconnect: true,
        policy: ReconnectPolicy::new(Duration::from_millis(base_delay_ms), 5),
    }
}

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

#[tokio::test]
async fn routes_messages_and_sends_commands() {
    let (listener, port) = bind().await;
    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<Value>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake");
        for text in [
            r#"{"type":"CONNECTED","message":"hello"}"#,
            "this is not json",
            r#"{"type":"UNKNOWN_KIND"}"#,
            r#"{"type":"PAGE_CHANGED","page":3}"#,
        ] {
            socket
                .send(Message::Text(text.to_string()))
                .await
                .expect("server send");
        }
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Text(text) = message {
                if let Ok(value) = serde_json::from_str(&text) {
                    let _ = received_tx.send(value);
                }
            }
        }
    });

    let client = TransportClient::new(options(port, 50));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<IntegrationEvent>();
    register_handlers(
        &client,
        Arc::new(move |event: IntegrationEvent| {
            let _ = event_tx.send(event);
        }),
        Arc::new(|_: String| {}),
    );

    client.connect().await.expect("connect");
    assert!(client.is_connected());
    // 重复调用不会建立第二条连接
    client.connect().await.expect("idempotent connect");

    let first = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
        .await
        .expect("first event in time")
        .expect("first event");
    let second = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
        .await
        .expect("second event in time")
        .expect("second event");
    assert_eq!(first.kind, EventKind::Connected);
    assert_eq!(second.kind, EventKind::PageChanged);
    assert_eq!(second.payload["page"], 3);
    assert!(client.is_connected());

    assert!(client.send(&ClientCommand::GoToPage { page: 4 }));
    let sent = tokio::time::timeout(Duration::from_secs(2), received_rx.recv())
        .await
        .expect("server receives in time")
        .expect("server receives");
    assert_eq!(sent, json!({"type": "GO_TO_PAGE", "page": 4}));

    client.disconnect().await;
}

#[tokio::test]
async fn concurrent_connects_share_one_socket() {
    let (listener, port) = bind().await;
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(_)) = socket.next().await {}
            });
        }
    });

    let client = TransportClient::new(options(port, 10));
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&transitions);
    client.observe(Arc::new(move |event: &ConnectionEvent| {
        sink.lock().push(event.clone())
    }));

    let (first, second) = tokio::join!(client.connect(), client.connect());
    first.expect("first connect");
    second.expect("second connect");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert!(client.is_connected());
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(*transitions.lock(), vec![ConnectionEvent::Opened]);
    assert!(client.send(&ClientCommand::Ping));

    client.disconnect().await;
}

#[tokio::test]
async fn clean_disconnect_never_reconnects() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake");
        while let Some(Ok(_)) = socket.next().await {}
    });

    let client = TransportClient::new(options(port, 10));
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&transitions);
    client.observe(Arc::new(move |event: &ConnectionEvent| {
        sink.lock().push(event.clone())
    }));

    client.connect().await.expect("connect");
    client.disconnect().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!client.is_connected());
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(
        *transitions.lock(),
        vec![ConnectionEvent::Opened, ConnectionEvent::Closed { clean: true }]
    );
    assert!(!client.send(&ClientCommand::Ping));
}

#[tokio::test]
async fn reconnect_gives_up_after_five_attempts() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let socket = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake");
        // 服务端整体消失：连接与监听端口一起释放
        drop(socket);
        drop(listener);
    });

    let client = TransportClient::new(options(port, 10));
    client.connect().await.expect("connect");

    assert!(wait_until(|| client.reconnect_attempts() == 5).await);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.reconnect_attempts(), 5);
    assert!(!client.is_connected());
    assert!(client.connection_state().last_error.is_some());
}

#[tokio::test]
async fn failed_connect_reports_error() {
    let (listener, port) = bind().await;
    drop(listener);

    let mut options = options(port, 10);
    options.auto_reconnect = false;
    let client = TransportClient::new(options);

    assert!(client.connect().await.is_err());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.reconnect_attempts(), 0);
    assert!(!client.is_connected());
}
