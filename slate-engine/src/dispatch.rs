use tracing::{debug, trace};

use crate::handlers::{HandlerRegistry, SyncActions};
use crate::queue::EventQueue;

/// 一次分发的统计结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// 本次新标记为已处理的事件数。
    pub processed: usize,
    /// 其中找到了处理器的事件数。
    pub applied: usize,
}

/// 按到达顺序处理队列中所有未处理事件。
///
/// 已处理的事件直接跳过；每个未处理事件无论是否有处理器都会被标记为已处理，
/// 因此重复调用不会重复产生副作用。
pub fn dispatch_pending(
    queue: &mut EventQueue,
    registry: &HandlerRegistry,
    actions: &mut dyn SyncActions,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for event in queue.iter_mut() {
        if event.is_handled() {
            continue;
        }
        match registry.get(event.kind) {
            Some(handler) => {
                trace!(id = %event.id, kind = %event.kind, "分发事件");
                handler.handle(event, actions);
                report.applied += 1;
            }
            None => trace!(id = %event.id, kind = %event.kind, "事件无处理器，仅标记"),
        }
        if event.mark_handled() {
            report.processed += 1;
        }
    }
    if report.processed > 0 {
        debug!(processed = report.processed, applied = report.applied, "事件分发完成");
    }
    report
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use slate_core::document::Document;
    use slate_core::event::{EventKind, EventSource, IntegrationEvent};

    use super::*;
    use crate::store::DocumentStore;

    fn wire(kind: EventKind, payload: serde_json::Value) -> IntegrationEvent {
        IntegrationEvent::new(kind, EventSource::Wire, payload)
    }

    #[test]
    fn each_event_is_applied_exactly_once() {
        let mut store = DocumentStore::new();
        store.set_document(Some(Document::new("/doc.pdf", 10)));
        let registry = HandlerRegistry::new();
        let mut queue = EventQueue::new();

        queue.push(wire(EventKind::PageChanged, json!({"page": 4})));
        queue.push(wire(EventKind::Pong, json!({})));
        let first = dispatch_pending(&mut queue, &registry, &mut store);
        assert_eq!(first, DispatchReport { processed: 2, applied: 1 });
        assert_eq!(store.viewer().current_page, 4);

        // 本地翻页后再次分发，旧事件不得覆盖
        store.set_page(7);
        let second = dispatch_pending(&mut queue, &registry, &mut store);
        assert_eq!(second, DispatchReport::default());
        assert_eq!(store.viewer().current_page, 7);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn events_apply_in_arrival_order() {
        let mut store = DocumentStore::new();
        let registry = HandlerRegistry::new();
        let mut queue = EventQueue::new();
        queue.push(wire(EventKind::PageChanged, json!({"page": 2})));
        queue.push(wire(EventKind::PageChanged, json!({"page": 9})));
        queue.push(wire(EventKind::ZoomChanged, json!({"zoom": 40})));

        dispatch_pending(&mut queue, &registry, &mut store);
        assert_eq!(store.viewer().current_page, 9);
        assert_eq!(store.viewer().zoom, 5.0);
    }

    #[test]
    fn remote_annotation_updates_do_not_touch_history() {
        let mut store = DocumentStore::new();
        let registry = HandlerRegistry::new();
        let mut queue = EventQueue::new();
        queue.push(wire(
            EventKind::AnnotationsUpdated,
            json!({"annotations": {"1": [
                {"id": "a", "type": "note", "x": 0, "y": 0, "width": 5, "height": 5}
            ]}}),
        ));
        queue.push(wire(EventKind::AnnotationsCleared, json!({})));

        dispatch_pending(&mut queue, &registry, &mut store);
        assert_eq!(store.annotation_count(), 0);
        assert!(!store.can_undo());
    }
}
