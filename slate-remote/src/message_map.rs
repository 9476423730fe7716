use std::sync::Arc;

use serde_json::Value;
use slate_core::event::{EventKind, EventSource, IntegrationEvent};
use slate_core::payload;
use tracing::trace;

use crate::client::MessageRouter;

/// 线上消息类型到语义事件的静态映射，顺序即注册顺序。
pub const MESSAGE_MAP: &[(&str, EventKind)] = &[
    ("CONNECTED", EventKind::Connected),
    ("STATE", EventKind::StatusSync),
    ("PAGE_CHANGED", EventKind::PageChanged),
    ("ZOOM_CHANGED", EventKind::ZoomChanged),
    ("PDF_OPENED", EventKind::DocumentOpened),
    ("PDF_CLOSED", EventKind::DocumentClosed),
    ("PRESENTER_CHANGED", EventKind::PresenterToggled),
    ("ANNOTATIONS_UPDATED", EventKind::AnnotationsUpdated),
    ("ANNOTATIONS_CLEARED", EventKind::AnnotationsCleared),
    ("PONG", EventKind::Pong),
    ("ERROR", EventKind::Error),
];

pub const GENERIC_ERROR: &str = "Remote control reported an error";

pub type EventSink = Arc<dyn Fn(IntegrationEvent) + Send + Sync>;
pub type ErrorSink = Arc<dyn Fn(String) + Send + Sync>;

pub fn event_kind_for(message_type: &str) -> Option<EventKind> {
    MESSAGE_MAP
        .iter()
        .find(|(wire, _)| *wire == message_type)
        .map(|(_, kind)| *kind)
}

/// 从 `ERROR` 消息中提取可读的错误描述。
pub fn error_message(value: &Value) -> String {
    payload::read_string(value, &["message", "error", "detail"])
        .unwrap_or(GENERIC_ERROR)
        .to_string()
}

/// 把映射表中的每种消息绑定到 `enqueue`。
///
/// 先注销所有已知类型，重复调用不会叠加处理器。`ERROR` 消息在入队的同时调用 `on_error`。
pub fn register_handlers(router: &dyn MessageRouter, enqueue: EventSink, on_error: ErrorSink) {
    for (message_type, _) in MESSAGE_MAP {
        router.off(message_type);
    }

    for &(message_type, kind) in MESSAGE_MAP {
        let enqueue = Arc::clone(&enqueue);
        let on_error = (kind == EventKind::Error).then(|| Arc::clone(&on_error));
        router.on(
            message_type,
            Arc::new(move |value: &Value| {
                if let Some(on_error) = &on_error {
                    on_error(error_message(value));
                }
                trace!(message_type, kind = %kind, "消息入队");
                enqueue(IntegrationEvent::new(kind, EventSource::Wire, value.clone()));
            }),
        );
    }
}
