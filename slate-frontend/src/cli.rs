use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use slate_config::AppConfig;
use slate_core::event::IntegrationEvent;
use slate_engine::command::CommandRequest;
use slate_remote::protocol::message_type;
use slate_remote::{MessageHandler, MessageRouter, RemoteControlEvent, register_handlers};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::session::SyncSession;

/// 离线演示脚本：模拟远程控制服务依次推送的消息，包含一条损坏消息。
const DEMO_SCRIPT: &[&str] = &[
    r#"{"type":"CONNECTED","message":"Connected to remote control"}"#,
    r#"{"type":"STATE","page":5,"total_pages":10,"zoom":1.25,"pdf_loaded":true,"pdf_path":"/mock.pdf","pdf_title":"Mock","presenter_active":false}"#,
    r##"{"type":"ANNOTATIONS_UPDATED","annotations":{"5":[{"id":"hl-1","type":"highlight","pageNumber":5,"x":72,"y":120,"width":240,"height":18,"content":"","color":"#ffeb3b","opacity":0.4},{"id":"note-1","type":"note","page_number":5,"x":320,"y":80,"width":24,"height":24,"content":"check figure"}],"draft":[]}}"##,
    "{this is not json",
    r#"{"type":"STATE","page":6,"total_pages":10,"zoom":1.25,"pdf_loaded":true,"pdf_path":"/mock.pdf","pdf_title":"Mock","presenter_active":false}"#,
    r#"{"type":"ZOOM_CHANGED","page":6,"zoom":1.5}"#,
    r#"{"type":"PRESENTER_CHANGED","active":true}"#,
    r#"{"type":"PONG"}"#,
];

const DEMO_COMMANDS: &[&str] = &["next_page", "rotate_clockwise", "zoom_out", "undo"];

/// 进程内路由：把脚本文本按 `type` 交给注册的处理器，代替真实连接。
#[derive(Default)]
struct ScriptRouter {
    handlers: Mutex<HashMap<String, MessageHandler>>,
}

impl ScriptRouter {
    fn deliver(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "脚本消息无法解析，已丢弃");
                return;
            }
        };
        let Some(kind) = message_type(&value) else {
            warn!("脚本消息缺少 type 字段");
            return;
        };
        let handler = self.handlers.lock().get(kind).cloned();
        if let Some(handler) = handler {
            handler(&value);
        }
    }
}

impl MessageRouter for ScriptRouter {
    fn on(&self, message_type: &str, handler: MessageHandler) {
        self.handlers
            .lock()
            .insert(message_type.to_string(), handler);
    }

    fn off(&self, message_type: &str) {
        self.handlers.lock().remove(message_type);
    }
}

/// 回放离线脚本并返回最终会话，供 CLI 打印概览。
pub fn replay_demo(config: &AppConfig) -> SyncSession {
    let mut session = SyncSession::from_config(config);
    let router = ScriptRouter::default();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<IntegrationEvent>();
    register_handlers(
        &router,
        Arc::new(move |event: IntegrationEvent| {
            let _ = event_tx.send(event);
        }),
        Arc::new(|message: String| warn!(%message, "脚本中的远端错误")),
    );

    for text in DEMO_SCRIPT {
        router.deliver(text);
        while let Ok(event) = event_rx.try_recv() {
            session.ingest(event);
        }
        session.pump();
    }

    // 进程内事件总线的消息与线上消息走同一条分发路径
    session.ingest(RemoteControlEvent::PageChanged { page: 8 }.into_integration_event());
    session.pump();

    for name in DEMO_COMMANDS {
        let response = session.execute(&CommandRequest::new(*name));
        info!(
            command = *name,
            success = response.success,
            message = response.message.as_deref().unwrap_or_default(),
            "执行本地命令"
        );
    }

    session
}

/// 简易 CLI 演示：回放脚本消息并打印会话概览。
pub fn run_demo(config: &AppConfig) {
    let session = replay_demo(config);
    let store = session.store();

    let mut commands: Vec<&str> = session.commands().available_commands().copied().collect();
    commands.sort_unstable();
    println!("支持的命令: {}", commands.join(", "));

    println!("Slate 同步引擎离线演示");
    match store.document() {
        Some(document) => println!(
            "当前文档: {} ({} 页, 标题: {})",
            document.path,
            document.page_count,
            document.title.as_deref().unwrap_or("-")
        ),
        None => println!("当前没有打开的文档。"),
    }

    let viewer = store.viewer();
    println!(
        "阅读器: 第 {} 页, 缩放={:.2}, 旋转={}°, 演示模式={}",
        viewer.current_page,
        viewer.zoom,
        viewer.rotation.degrees(),
        viewer.presenter_active
    );

    println!("批注：");
    for page in store.annotated_pages() {
        for annotation in store.page_annotations(page) {
            println!(
                "  - 第 {} 页 {} [{}] ({:.0}, {:.0}) {}×{}",
                page,
                annotation.id,
                annotation.kind.as_str(),
                annotation.bounds.x,
                annotation.bounds.y,
                annotation.bounds.width,
                annotation.bounds.height
            );
        }
    }

    println!(
        "历史: 可撤销 {} 步, 可重做 {} 步",
        store.undo_depth(),
        store.redo_depth()
    );
    println!(
        "事件队列: {} 条 (未处理 {})",
        session.queue().len(),
        session.queue().pending()
    );
    println!("状态: {}", session.status_message());
}
