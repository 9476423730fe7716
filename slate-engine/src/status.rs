use slate_core::event::{EventKind, IntegrationEvent};
use slate_core::payload;

pub const READY: &str = "Ready";

/// 从最近的事件中生成一行状态栏文案。由新到旧扫描，第一条有信息量的事件胜出。
pub fn status_message<'a>(recent: impl IntoIterator<Item = &'a IntegrationEvent>) -> String {
    recent
        .into_iter()
        .find_map(summarize)
        .unwrap_or_else(|| READY.to_string())
}

fn summarize(event: &IntegrationEvent) -> Option<String> {
    let value = &event.payload;
    match event.kind {
        EventKind::PageChanged => {
            payload::read_page(value, &["page"]).map(|page| format!("Remote page {page}"))
        }
        EventKind::ZoomChanged => payload::read_number(value, &["zoom"])
            .filter(|zoom| *zoom > 0.0)
            .map(|zoom| format!("Remote zoom {}%", (zoom * 100.0).round())),
        EventKind::PresenterToggled => payload::read_bool(value, &["active", "presenter_active"])
            .map(|active| {
                if active {
                    "Presenter mode enabled remotely".to_string()
                } else {
                    "Presenter mode disabled remotely".to_string()
                }
            }),
        EventKind::StatusSync => Some(match payload::read_page(value, &["page"]) {
            Some(page) => format!("Synced with remote (page {page})"),
            None => "Synced with remote".to_string(),
        }),
        EventKind::DocumentOpened => payload::read_string(value, &["path", "pdf_path"])
            .map(|path| format!("Remote opened {path}")),
        EventKind::DocumentClosed => Some("Document closed remotely".to_string()),
        EventKind::AnnotationsUpdated => Some("Annotations updated remotely".to_string()),
        EventKind::AnnotationsCleared => Some("Annotations cleared remotely".to_string()),
        EventKind::AnnotationAdded => Some("Annotation added remotely".to_string()),
        EventKind::Error => Some(format!(
            "Remote error: {}",
            payload::read_string(value, &["message", "error", "detail"]).unwrap_or("unknown error")
        )),
        EventKind::Connected => Some("Connected to remote control".to_string()),
        EventKind::Pong => None,
    }
}
