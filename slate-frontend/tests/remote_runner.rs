use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use slate_frontend::{RemoteRunner, SyncSession};
use slate_remote::{ClientCommand, ReconnectPolicy, RemoteControlEvent, TransportOptions};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

const STATE: &str = r#"{"type":"STATE","page":5,"total_pages":10,"zoom":1.25,"pdf_loaded":true,"pdf_path":"/mock.pdf","pdf_title":"Mock","presenter_active":false}"#;

async fn wait_for_type(received: &mut mpsc::UnboundedReceiver<String>, wanted: &str) {
    let deadline = Duration::from_secs(3);
    tokio::time::timeout(deadline, async {
        while let Some(kind) = received.recv().await {
            if kind == wanted {
                return;
            }
        }
        panic!("server stopped before {wanted}");
    })
    .await
    .expect("message arrives in time");
}

#[tokio::test]
async fn runner_syncs_state_and_forwards_commands() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake");
        socket
            .send(Message::Text(STATE.to_string()))
            .await
            .expect("send state");
        while let Some(Ok(message)) = socket.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            if let Some(kind) = value["type"].as_str() {
                let _ = seen_tx.send(kind.to_string());
            }
        }
    });

    let options = TransportOptions {
        host: "127.0.0.1".to_string(),
        port,
        auto_reconnect: false,
        policy: ReconnectPolicy::new(Duration::from_millis(10), 5),
    };
    let runner = RemoteRunner::new(
        SyncSession::default(),
        options,
        Duration::from_secs(60),
        Duration::from_secs(60),
    );
    let bus = runner.bus();
    let commands = runner.command_sender();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let (session, ()) = tokio::join!(
        runner.run_until(async {
            let _ = shutdown_rx.await;
        }),
        async {
            // 连接建立后立即发出一次状态查询
            wait_for_type(&mut seen_rx, "GET_STATE").await;

            commands
                .send(ClientCommand::GoToPage { page: 3 })
                .expect("runner alive");
            wait_for_type(&mut seen_rx, "GO_TO_PAGE").await;

            bus.publish(RemoteControlEvent::PageChanged { page: 7 });
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = shutdown_tx.send(());
        }
    );

    let session = session.expect("runner finishes cleanly");
    let document = session.store().document().expect("document synced");
    assert_eq!(document.path, "/mock.pdf");
    assert_eq!(document.page_count, 10);
    assert_eq!(session.store().viewer().zoom, 1.25);
    assert_eq!(session.store().viewer().current_page, 7);
    assert_eq!(session.status_message(), "Remote page 7");
}

#[tokio::test]
async fn runner_without_reconnect_fails_when_server_is_absent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let options = TransportOptions {
        host: "127.0.0.1".to_string(),
        port,
        auto_reconnect: false,
        policy: ReconnectPolicy::default(),
    };
    let runner = RemoteRunner::new(
        SyncSession::default(),
        options,
        Duration::from_secs(60),
        Duration::from_secs(60),
    );
    let result = runner.run_until(std::future::pending()).await;
    assert!(result.is_err());
}
