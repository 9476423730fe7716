use std::collections::HashMap;

use serde_json::Value;
use slate_core::annotation::Annotation;
use slate_core::document::Document;
use slate_core::event::{EventKind, IntegrationEvent};
use slate_core::payload;
use tracing::{debug, trace};

use crate::store::DocumentStore;

/// 事件处理器可以执行的状态变更。远端来源的变更一律不记录撤销历史。
pub trait SyncActions {
    fn set_page(&mut self, page: u32);
    fn set_zoom(&mut self, zoom: f64);
    fn set_presenter(&mut self, active: bool);
    fn current_document(&self) -> Option<&Document>;
    fn replace_document(&mut self, document: Document);
    fn close_document(&mut self);
    fn replace_page_annotations(&mut self, page: u32, annotations: Vec<Annotation>);
    fn remote_add_annotation(&mut self, annotation: Annotation);
    fn remote_clear_annotations(&mut self);
}

impl SyncActions for DocumentStore {
    fn set_page(&mut self, page: u32) {
        DocumentStore::set_page(self, page);
    }

    fn set_zoom(&mut self, zoom: f64) {
        DocumentStore::set_zoom(self, zoom);
    }

    fn set_presenter(&mut self, active: bool) {
        DocumentStore::set_presenter(self, active);
    }

    fn current_document(&self) -> Option<&Document> {
        self.document()
    }

    fn replace_document(&mut self, document: Document) {
        self.set_document(Some(document));
    }

    fn close_document(&mut self) {
        DocumentStore::close_document(self);
    }

    fn replace_page_annotations(&mut self, page: u32, annotations: Vec<Annotation>) {
        DocumentStore::replace_page_annotations(self, page, annotations);
    }

    fn remote_add_annotation(&mut self, annotation: Annotation) {
        self.sync_add_annotation(annotation);
    }

    fn remote_clear_annotations(&mut self) {
        self.sync_clear_annotations();
    }
}

pub trait EventHandler: Send + Sync {
    fn kind(&self) -> EventKind;
    fn handle(&self, event: &IntegrationEvent, actions: &mut dyn SyncActions);
}

/// 每种语义事件至多一个处理器。
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Box<dyn EventHandler>>,
}

impl HandlerRegistry {
    /// 注册全部内置处理器。
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(PageChangedHandler);
        registry.register(ZoomChangedHandler);
        registry.register(PresenterToggledHandler);
        registry.register(StatusSyncHandler);
        registry.register(DocumentOpenedHandler);
        registry.register(DocumentClosedHandler);
        registry.register(AnnotationsUpdatedHandler);
        registry.register(AnnotationsClearedHandler);
        registry.register(AnnotationAddedHandler);
        registry
    }

    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// 注册处理器，同类型的旧处理器被替换。
    pub fn register<H: EventHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.kind(), Box::new(handler));
    }

    pub fn get(&self, kind: EventKind) -> Option<&dyn EventHandler> {
        self.handlers.get(&kind).map(|handler| handler.as_ref())
    }

    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.handlers.keys().copied()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

const PRESENTER_KEYS: &[&str] = &["active", "presenter_active"];

fn read_zoom(value: &Value) -> Option<f64> {
    payload::read_number(value, &["zoom"]).filter(|zoom| *zoom > 0.0)
}

/// 宽松解析一组批注并强制归属到 `page`，无法解析的条目被跳过。
fn parse_page_list(entries: &[Value], page: u32, event: &IntegrationEvent) -> Vec<Annotation> {
    entries
        .iter()
        .filter_map(|entry| Annotation::from_payload(entry, event.timestamp))
        .map(|mut annotation| {
            annotation.page_number = page;
            annotation
        })
        .collect()
}

struct PageChangedHandler;

impl EventHandler for PageChangedHandler {
    fn kind(&self) -> EventKind {
        EventKind::PageChanged
    }

    fn handle(&self, event: &IntegrationEvent, actions: &mut dyn SyncActions) {
        match payload::read_page(&event.payload, &["page"]) {
            Some(page) => actions.set_page(page),
            None => trace!(id = %event.id, "翻页事件缺少合法页码"),
        }
    }
}

struct ZoomChangedHandler;

impl EventHandler for ZoomChangedHandler {
    fn kind(&self) -> EventKind {
        EventKind::ZoomChanged
    }

    fn handle(&self, event: &IntegrationEvent, actions: &mut dyn SyncActions) {
        if let Some(page) = payload::read_page(&event.payload, &["page"]) {
            actions.set_page(page);
        }
        if let Some(zoom) = read_zoom(&event.payload) {
            actions.set_zoom(zoom);
        }
    }
}

struct PresenterToggledHandler;

impl EventHandler for PresenterToggledHandler {
    fn kind(&self) -> EventKind {
        EventKind::PresenterToggled
    }

    fn handle(&self, event: &IntegrationEvent, actions: &mut dyn SyncActions) {
        if let Some(active) = payload::read_bool(&event.payload, PRESENTER_KEYS) {
            actions.set_presenter(active);
        }
    }
}

/// 全量状态对账。先对齐文档，再设置页码、缩放与演示模式，保证页码按新文档的页数截断。
struct StatusSyncHandler;

impl EventHandler for StatusSyncHandler {
    fn kind(&self) -> EventKind {
        EventKind::StatusSync
    }

    fn handle(&self, event: &IntegrationEvent, actions: &mut dyn SyncActions) {
        let value = &event.payload;
        let loaded = payload::read_bool(value, &["pdf_loaded"]).unwrap_or(false);
        let path = payload::read_string(value, &["pdf_path"]);
        let total_pages = payload::read_page(value, &["total_pages"]);

        if let (true, Some(path), Some(total_pages)) = (loaded, path, total_pages) {
            let unchanged = actions
                .current_document()
                .is_some_and(|document| document.matches(path, total_pages));
            if unchanged {
                trace!(path, total_pages, "远端文档与本地一致，保留现有文档");
            } else {
                let mut document = Document::new(path, total_pages);
                if let Some(title) = payload::read_string(value, &["pdf_title"]) {
                    document = document.with_title(title);
                }
                debug!(path, total_pages, "状态同步替换当前文档");
                actions.replace_document(document);
            }
        }

        if let Some(page) = payload::read_page(value, &["page"]) {
            actions.set_page(page);
        }
        if let Some(zoom) = read_zoom(value) {
            actions.set_zoom(zoom);
        }
        if let Some(active) = payload::read_bool(value, PRESENTER_KEYS) {
            actions.set_presenter(active);
        }
    }
}

struct DocumentOpenedHandler;

impl EventHandler for DocumentOpenedHandler {
    fn kind(&self) -> EventKind {
        EventKind::DocumentOpened
    }

    fn handle(&self, event: &IntegrationEvent, actions: &mut dyn SyncActions) {
        let value = &event.payload;
        let Some(path) = payload::read_string(value, &["path", "pdf_path"]) else {
            trace!(id = %event.id, "打开事件缺少路径");
            return;
        };
        let Some(page_count) =
            payload::read_page(value, &["page_count", "pageCount", "total_pages"])
        else {
            trace!(id = %event.id, path, "打开事件缺少页数");
            return;
        };

        let mut document = Document::new(path, page_count);
        if let Some(title) = payload::read_string(value, &["title", "pdf_title"]) {
            document = document.with_title(title);
        }
        actions.replace_document(document);
        actions.set_page(1);
    }
}

struct DocumentClosedHandler;

impl EventHandler for DocumentClosedHandler {
    fn kind(&self) -> EventKind {
        EventKind::DocumentClosed
    }

    fn handle(&self, _event: &IntegrationEvent, actions: &mut dyn SyncActions) {
        actions.close_document();
    }
}

/// 按页整体替换。只处理可以解析为正整数的键，其余键（例如顶层的 `type`）被忽略。
struct AnnotationsUpdatedHandler;

impl EventHandler for AnnotationsUpdatedHandler {
    fn kind(&self) -> EventKind {
        EventKind::AnnotationsUpdated
    }

    fn handle(&self, event: &IntegrationEvent, actions: &mut dyn SyncActions) {
        let Some(pages) = payload::read_record(&event.payload, &["annotations"])
            .or_else(|| payload::as_record(&event.payload))
        else {
            return;
        };

        for (key, entries) in pages {
            let Some(page) = key.trim().parse::<u32>().ok().filter(|page| *page >= 1) else {
                trace!(key = key.as_str(), "忽略非页码键");
                continue;
            };
            let Some(entries) = entries.as_array() else {
                trace!(page, "页批注不是数组，已跳过");
                continue;
            };
            let annotations = parse_page_list(entries, page, event);
            if annotations.len() != entries.len() {
                debug!(
                    page,
                    dropped = entries.len() - annotations.len(),
                    "部分批注无法解析"
                );
            }
            actions.replace_page_annotations(page, annotations);
        }
    }
}

struct AnnotationsClearedHandler;

impl EventHandler for AnnotationsClearedHandler {
    fn kind(&self) -> EventKind {
        EventKind::AnnotationsCleared
    }

    fn handle(&self, _event: &IntegrationEvent, actions: &mut dyn SyncActions) {
        actions.remote_clear_annotations();
    }
}

struct AnnotationAddedHandler;

impl EventHandler for AnnotationAddedHandler {
    fn kind(&self) -> EventKind {
        EventKind::AnnotationAdded
    }

    fn handle(&self, event: &IntegrationEvent, actions: &mut dyn SyncActions) {
        let value = &event.payload;
        let raw = value
            .get("annotation")
            .filter(|inner| inner.is_object())
            .unwrap_or(value);
        let Some(mut annotation) = Annotation::from_payload(raw, event.timestamp) else {
            trace!(id = %event.id, "新增批注无法解析");
            return;
        };
        if let Some(page) = payload::read_page(value, &["page", "pageNumber", "page_number"]) {
            annotation.page_number = page;
        }
        actions.remote_add_annotation(annotation);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use slate_core::event::EventSource;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Page(u32),
        Zoom(f64),
        Presenter(bool),
        ReplaceDocument(String, u32),
        CloseDocument,
        ReplacePage(u32, Vec<String>),
        Add(u32, String),
        Clear,
    }

    #[derive(Default)]
    struct Recorder {
        document: Option<Document>,
        calls: Vec<Call>,
    }

    impl SyncActions for Recorder {
        fn set_page(&mut self, page: u32) {
            self.calls.push(Call::Page(page));
        }

        fn set_zoom(&mut self, zoom: f64) {
            self.calls.push(Call::Zoom(zoom));
        }

        fn set_presenter(&mut self, active: bool) {
            self.calls.push(Call::Presenter(active));
        }

        fn current_document(&self) -> Option<&Document> {
            self.document.as_ref()
        }

        fn replace_document(&mut self, document: Document) {
            self.calls
                .push(Call::ReplaceDocument(document.path.clone(), document.page_count));
            self.document = Some(document);
        }

        fn close_document(&mut self) {
            self.calls.push(Call::CloseDocument);
            self.document = None;
        }

        fn replace_page_annotations(&mut self, page: u32, annotations: Vec<Annotation>) {
            assert!(annotations.iter().all(|a| a.page_number == page));
            let ids = annotations.iter().map(|a| a.id.to_string()).collect();
            self.calls.push(Call::ReplacePage(page, ids));
        }

        fn remote_add_annotation(&mut self, annotation: Annotation) {
            self.calls
                .push(Call::Add(annotation.page_number, annotation.id.to_string()));
        }

        fn remote_clear_annotations(&mut self) {
            self.calls.push(Call::Clear);
        }
    }

    fn run(kind: EventKind, payload: Value, recorder: &mut Recorder) {
        let registry = HandlerRegistry::new();
        let event = IntegrationEvent::new(kind, EventSource::Wire, payload);
        if let Some(handler) = registry.get(kind) {
            handler.handle(&event, recorder);
        }
    }

    fn entry(id: &str) -> Value {
        json!({"id": id, "type": "highlight", "x": 1, "y": 2, "width": 3, "height": 4})
    }

    #[test]
    fn page_changed_floors_and_rejects_below_one() {
        let mut recorder = Recorder::default();
        run(EventKind::PageChanged, json!({"page": 4.7}), &mut recorder);
        run(EventKind::PageChanged, json!({"page": 0}), &mut recorder);
        run(EventKind::PageChanged, json!({"page": -3}), &mut recorder);
        run(EventKind::PageChanged, json!({"page": "5"}), &mut recorder);
        assert_eq!(recorder.calls, vec![Call::Page(4)]);
    }

    #[test]
    fn zoom_is_forwarded_verbatim_when_positive() {
        let mut recorder = Recorder::default();
        run(EventKind::ZoomChanged, json!({"zoom": 12.5}), &mut recorder);
        run(EventKind::ZoomChanged, json!({"zoom": 0}), &mut recorder);
        run(EventKind::ZoomChanged, json!({"zoom": -1.0}), &mut recorder);
        run(EventKind::ZoomChanged, json!({"page": 3, "zoom": 1.5}), &mut recorder);
        assert_eq!(
            recorder.calls,
            vec![Call::Zoom(12.5), Call::Page(3), Call::Zoom(1.5)]
        );
    }

    #[test]
    fn presenter_accepts_either_key_but_only_booleans() {
        let mut recorder = Recorder::default();
        run(EventKind::PresenterToggled, json!({"active": true}), &mut recorder);
        run(
            EventKind::PresenterToggled,
            json!({"presenter_active": false}),
            &mut recorder,
        );
        run(EventKind::PresenterToggled, json!({"active": 1}), &mut recorder);
        assert_eq!(
            recorder.calls,
            vec![Call::Presenter(true), Call::Presenter(false)]
        );
    }

    #[test]
    fn status_sync_keeps_matching_document() {
        let mut recorder = Recorder {
            document: Some(Document::new("/doc.pdf", 12)),
            calls: Vec::new(),
        };
        let before = recorder.document.as_ref().map(|doc| doc.id);
        run(
            EventKind::StatusSync,
            json!({
                "type": "STATE",
                "page": 3,
                "total_pages": 12,
                "zoom": 2.0,
                "pdf_loaded": true,
                "pdf_path": "/doc.pdf",
                "pdf_title": "Renamed",
                "presenter_active": true
            }),
            &mut recorder,
        );
        assert_eq!(
            recorder.calls,
            vec![Call::Page(3), Call::Zoom(2.0), Call::Presenter(true)]
        );
        assert_eq!(recorder.document.as_ref().map(|doc| doc.id), before);
    }

    #[test]
    fn status_sync_replaces_document_before_page() {
        let mut recorder = Recorder {
            document: Some(Document::new("/doc.pdf", 12)),
            calls: Vec::new(),
        };
        run(
            EventKind::StatusSync,
            json!({"page": 8, "total_pages": 20, "pdf_loaded": true, "pdf_path": "/doc.pdf"}),
            &mut recorder,
        );
        assert_eq!(
            recorder.calls,
            vec![Call::ReplaceDocument("/doc.pdf".into(), 20), Call::Page(8)]
        );
    }

    #[test]
    fn status_sync_without_loaded_document_only_moves_viewer() {
        let mut recorder = Recorder::default();
        run(
            EventKind::StatusSync,
            json!({"page": 2, "pdf_loaded": false, "pdf_path": "/doc.pdf", "total_pages": 4}),
            &mut recorder,
        );
        run(
            EventKind::StatusSync,
            json!({"pdf_loaded": true, "pdf_path": "", "total_pages": 4}),
            &mut recorder,
        );
        assert_eq!(recorder.calls, vec![Call::Page(2)]);
        assert!(recorder.document.is_none());
    }

    #[test]
    fn document_opened_requires_path_and_pages() {
        let mut recorder = Recorder::default();
        run(EventKind::DocumentOpened, json!({"path": "/a.pdf"}), &mut recorder);
        run(
            EventKind::DocumentOpened,
            json!({"path": "/a.pdf", "page_count": 0}),
            &mut recorder,
        );
        assert!(recorder.calls.is_empty());

        run(
            EventKind::DocumentOpened,
            json!({"path": "/a.pdf", "page_count": 9, "title": "A"}),
            &mut recorder,
        );
        assert_eq!(
            recorder.calls,
            vec![Call::ReplaceDocument("/a.pdf".into(), 9), Call::Page(1)]
        );
        assert_eq!(
            recorder.document.as_ref().and_then(|doc| doc.title.as_deref()),
            Some("A")
        );
    }

    #[test]
    fn annotations_updated_ignores_non_numeric_keys() {
        let mut recorder = Recorder::default();
        run(
            EventKind::AnnotationsUpdated,
            json!({"annotations": {"abc": [entry("x")], "0": [entry("z")], "2": [entry("y"), {"id": "broken"}]}}),
            &mut recorder,
        );
        assert_eq!(
            recorder.calls,
            vec![Call::ReplacePage(2, vec!["y".into()])]
        );
    }

    #[test]
    fn annotations_updated_accepts_top_level_pages() {
        let mut recorder = Recorder::default();
        run(
            EventKind::AnnotationsUpdated,
            json!({"type": "ANNOTATIONS_UPDATED", "3": [], "4": [entry("a"), entry("b")]}),
            &mut recorder,
        );
        assert_eq!(
            recorder.calls,
            vec![
                Call::ReplacePage(3, Vec::new()),
                Call::ReplacePage(4, vec!["a".into(), "b".into()]),
            ]
        );
    }

    #[test]
    fn annotation_added_forces_page() {
        let mut recorder = Recorder::default();
        run(
            EventKind::AnnotationAdded,
            json!({"page": 6, "annotation": entry("n1")}),
            &mut recorder,
        );
        run(EventKind::AnnotationAdded, json!({"page": 6}), &mut recorder);
        assert_eq!(recorder.calls, vec![Call::Add(6, "n1".into())]);
    }

    #[test]
    fn closed_and_cleared_forward_directly() {
        let mut recorder = Recorder {
            document: Some(Document::new("/doc.pdf", 2)),
            calls: Vec::new(),
        };
        run(EventKind::AnnotationsCleared, json!({}), &mut recorder);
        run(EventKind::DocumentClosed, Value::Null, &mut recorder);
        assert_eq!(recorder.calls, vec![Call::Clear, Call::CloseDocument]);
    }

    #[test]
    fn informational_kinds_have_no_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.get(EventKind::Pong).is_none());
        assert!(registry.get(EventKind::Connected).is_none());
        assert!(registry.get(EventKind::Error).is_none());
        assert_eq!(registry.kinds().count(), 9);
    }
}
