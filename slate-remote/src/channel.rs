use serde_json::{Value, json};
use slate_core::event::{EventKind, EventSource, IntegrationEvent};
use tokio::sync::broadcast;
use tracing::trace;

pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// 进程内远程控制事件，与控制通道上的同名消息语义一致。
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteControlEvent {
    PageChanged { page: u32 },
    ZoomChanged { zoom: f64 },
    PresenterChanged { active: bool },
    AnnotationAdded { page: u32, annotation: Value },
    AnnotationsCleared,
}

impl RemoteControlEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            Self::PageChanged { .. } => "page-changed",
            Self::ZoomChanged { .. } => "zoom-changed",
            Self::PresenterChanged { .. } => "presenter-changed",
            Self::AnnotationAdded { .. } => "annotation-added",
            Self::AnnotationsCleared => "annotations-cleared",
        }
    }

    /// 转换为待分发的事件，负载字段与线上消息保持一致。
    pub fn into_integration_event(self) -> IntegrationEvent {
        let (kind, payload) = match self {
            Self::PageChanged { page } => (EventKind::PageChanged, json!({ "page": page })),
            Self::ZoomChanged { zoom } => (EventKind::ZoomChanged, json!({ "zoom": zoom })),
            Self::PresenterChanged { active } => {
                (EventKind::PresenterToggled, json!({ "active": active }))
            }
            Self::AnnotationAdded { page, annotation } => (
                EventKind::AnnotationAdded,
                json!({ "page": page, "annotation": annotation }),
            ),
            Self::AnnotationsCleared => (EventKind::AnnotationsCleared, json!({})),
        };
        IntegrationEvent::new(kind, EventSource::RemoteChannel, payload)
    }
}

/// 基于 `broadcast` 的发布/订阅总线。
#[derive(Debug, Clone)]
pub struct RemoteEventBus {
    sender: broadcast::Sender<RemoteControlEvent>,
}

impl RemoteEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布事件，返回收到事件的订阅者数量；没有订阅者时事件被丢弃。
    pub fn publish(&self, event: RemoteControlEvent) -> usize {
        let channel = event.channel();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(channel, "没有订阅者，事件已丢弃");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemoteControlEvent> {
        self.sender.subscribe()
    }
}

impl Default for RemoteEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
