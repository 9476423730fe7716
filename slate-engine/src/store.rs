use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use slate_core::annotation::{Annotation, AnnotationId, AnnotationPatch};
use slate_core::document::Document;
use slate_core::viewer::{FitMode, Rotation, ViewMode, ViewerState, ZOOM_STEP};
use tracing::{debug, trace};

use crate::history::{DEFAULT_HISTORY_LIMIT, History};

/// 页码到批注列表的映射。列表以 `Arc` 共享，快照只复制指针，写入时按需拷贝。
pub type PageMap = BTreeMap<u32, Arc<Vec<Annotation>>>;

/// 批注状态的不可变快照，用于撤销/重做。
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationSnapshot {
    pages: PageMap,
    selection: Option<AnnotationId>,
}

impl AnnotationSnapshot {
    pub fn page(&self, page: u32) -> &[Annotation] {
        self.pages.get(&page).map(|list| list.as_slice()).unwrap_or(&[])
    }

    #[inline]
    pub fn selection(&self) -> Option<&AnnotationId> {
        self.selection.as_ref()
    }
}

/// 通知观察者的变更类型。
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Document,
    Viewer,
    /// `page` 为 `None` 表示多页同时变化。
    Annotations { page: Option<u32> },
    Selection,
    History,
    Reset,
}

pub type StoreObserver = Box<dyn FnMut(&StoreChange) + Send>;

/// 文档与批注的权威状态。
///
/// 本地编辑（新增、修改、删除、清空）会在变更前记录历史快照；
/// 远端的整页替换以及 `sync_*` 系列操作不会触碰历史。
pub struct DocumentStore {
    document: Option<Document>,
    pages: PageMap,
    selection: Option<AnnotationId>,
    viewer: ViewerState,
    history: History<AnnotationSnapshot>,
    observers: Vec<StoreObserver>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            document: None,
            pages: PageMap::new(),
            selection: None,
            viewer: ViewerState::default(),
            history: History::new(limit),
            observers: Vec::new(),
        }
    }

    /// 注册观察者。通知顺序与注册顺序一致。
    pub fn subscribe(&mut self, observer: StoreObserver) {
        self.observers.push(observer);
    }

    fn notify(&mut self, change: StoreChange) {
        for observer in &mut self.observers {
            observer(&change);
        }
    }

    // ---- 查询 ----

    #[inline]
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    #[inline]
    pub fn viewer(&self) -> &ViewerState {
        &self.viewer
    }

    #[inline]
    pub fn selection(&self) -> Option<&AnnotationId> {
        self.selection.as_ref()
    }

    /// 返回指定页的批注，不存在时返回空切片。
    pub fn page_annotations(&self, page: u32) -> &[Annotation] {
        self.pages.get(&page).map(|list| list.as_slice()).unwrap_or(&[])
    }

    pub fn annotation(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.pages
            .values()
            .flat_map(|list| list.iter())
            .find(|annotation| &annotation.id == id)
    }

    pub fn annotated_pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    pub fn annotation_count(&self) -> usize {
        self.pages.values().map(|list| list.len()).sum()
    }

    pub fn snapshot(&self) -> AnnotationSnapshot {
        AnnotationSnapshot {
            pages: self.pages.clone(),
            selection: self.selection.clone(),
        }
    }

    // ---- 本地批注编辑 ----

    pub fn add_annotation(&mut self, annotation: Annotation) {
        self.record_snapshot();
        let page = self.insert_annotation(annotation);
        self.notify(StoreChange::Annotations { page: Some(page) });
    }

    /// 按 ID 修改批注；ID 不存在时不做任何事，也不记录历史。
    pub fn update_annotation(&mut self, id: &AnnotationId, patch: AnnotationPatch) {
        let Some(page) = self.page_of(id) else {
            trace!(%id, "修改的批注不存在，忽略");
            return;
        };
        if patch.is_empty() {
            return;
        }
        self.record_snapshot();
        if let Some(list) = self.pages.get_mut(&page) {
            let list = Arc::make_mut(list);
            if let Some(annotation) = list.iter_mut().find(|annotation| &annotation.id == id) {
                patch.apply(annotation, Utc::now());
            }
        }
        self.notify(StoreChange::Annotations { page: Some(page) });
    }

    pub fn remove_annotation(&mut self, id: &AnnotationId) {
        let Some(page) = self.page_of(id) else {
            trace!(%id, "删除的批注不存在，忽略");
            return;
        };
        self.record_snapshot();
        self.take_annotation(id);
        if self.selection.as_ref() == Some(id) {
            self.selection = None;
            self.notify(StoreChange::Selection);
        }
        self.notify(StoreChange::Annotations { page: Some(page) });
    }

    pub fn clear_annotations(&mut self) {
        if self.pages.is_empty() {
            return;
        }
        self.record_snapshot();
        self.drop_all_annotations();
    }

    // ---- 远端同步 ----

    /// 以远端数据整页覆盖，不记录历史。
    ///
    /// 列表中每条批注的页码被强制改为 `page`；重复 ID 保留最后一条，
    /// 其他页上同 ID 的旧批注会被移除以保持全局唯一。
    pub fn replace_page_annotations(&mut self, page: u32, annotations: Vec<Annotation>) {
        let mut incoming: Vec<Annotation> = Vec::with_capacity(annotations.len());
        for mut annotation in annotations {
            annotation.page_number = page;
            incoming.retain(|existing| existing.id != annotation.id);
            incoming.push(annotation);
        }

        for (other_page, list) in self.pages.iter_mut() {
            if *other_page == page {
                continue;
            }
            if list.iter().any(|old| incoming.iter().any(|new| new.id == old.id)) {
                Arc::make_mut(list).retain(|old| incoming.iter().all(|new| new.id != old.id));
            }
        }
        self.pages.retain(|_, list| !list.is_empty());

        debug!(page, count = incoming.len(), "整页替换批注");
        if incoming.is_empty() {
            self.pages.remove(&page);
        } else {
            self.pages.insert(page, Arc::new(incoming));
        }
        self.revalidate_selection();
        self.notify(StoreChange::Annotations { page: Some(page) });
    }

    /// 远端新增单条批注，不记录历史。
    pub fn sync_add_annotation(&mut self, annotation: Annotation) {
        let page = self.insert_annotation(annotation);
        self.notify(StoreChange::Annotations { page: Some(page) });
    }

    /// 远端清空全部批注，不记录历史。
    pub fn sync_clear_annotations(&mut self) {
        if self.pages.is_empty() {
            return;
        }
        self.drop_all_annotations();
    }

    // ---- 选中 ----

    /// 选中指定批注；ID 不存在时不做任何事。
    pub fn select(&mut self, id: &AnnotationId) {
        if self.annotation(id).is_none() {
            trace!(%id, "选中的批注不存在，忽略");
            return;
        }
        self.selection = Some(id.clone());
        self.notify(StoreChange::Selection);
    }

    pub fn clear_selection(&mut self) {
        if self.selection.take().is_some() {
            self.notify(StoreChange::Selection);
        }
    }

    // ---- 文档 ----

    /// 替换当前文档并清空撤销/重做历史。批注保持不变，由后续同步消息覆盖。
    pub fn set_document(&mut self, document: Option<Document>) {
        self.history.clear();
        self.document = document;
        self.viewer.current_page = self.clamp_page(self.viewer.current_page);
        self.notify(StoreChange::Document);
    }

    /// 关闭文档：清空批注、选中与历史，并回到第 1 页。
    pub fn close_document(&mut self) {
        self.document = None;
        self.pages.clear();
        self.selection = None;
        self.history.clear();
        self.viewer.current_page = 1;
        self.notify(StoreChange::Document);
        self.notify(StoreChange::Annotations { page: None });
    }

    /// 恢复到初始状态。观察者与历史上限保留。
    pub fn reset(&mut self) {
        let limit = self.history.limit();
        self.document = None;
        self.pages.clear();
        self.selection = None;
        self.viewer = ViewerState::default();
        self.history = History::new(limit);
        self.notify(StoreChange::Reset);
    }

    // ---- 历史 ----

    pub fn begin_group(&mut self) {
        self.history.begin_group();
    }

    pub fn end_group(&mut self) {
        self.history.end_group();
    }

    /// 在一个历史分组内执行闭包，闭包中的多次编辑只产生一条撤销记录。
    pub fn with_group<R>(&mut self, edit: impl FnOnce(&mut Self) -> R) -> R {
        self.history.begin_group();
        let result = edit(self);
        self.history.end_group();
        result
    }

    pub fn record_snapshot(&mut self) {
        let pages = &self.pages;
        let selection = &self.selection;
        let recorded = self.history.record(|| AnnotationSnapshot {
            pages: pages.clone(),
            selection: selection.clone(),
        });
        if recorded {
            self.notify(StoreChange::History);
        }
    }

    pub fn undo(&mut self) -> bool {
        let pages = &self.pages;
        let selection = &self.selection;
        let previous = self.history.undo(|| AnnotationSnapshot {
            pages: pages.clone(),
            selection: selection.clone(),
        });
        match previous {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let pages = &self.pages;
        let selection = &self.selection;
        let next = self.history.redo(|| AnnotationSnapshot {
            pages: pages.clone(),
            selection: selection.clone(),
        });
        match next {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.notify(StoreChange::History);
    }

    #[inline]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[inline]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    #[inline]
    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    #[inline]
    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    // ---- 阅读器 ----

    /// 设置当前页。文档已加载时限制在 `[1, page_count]`，越界请求被截断而非拒绝。
    pub fn set_page(&mut self, page: u32) {
        let page = self.clamp_page(page);
        if self.viewer.current_page != page {
            self.viewer.current_page = page;
            self.notify(StoreChange::Viewer);
        }
    }

    pub fn next_page(&mut self) {
        self.set_page(self.viewer.current_page.saturating_add(1));
    }

    pub fn previous_page(&mut self) {
        self.set_page(self.viewer.current_page.saturating_sub(1));
    }

    /// 设置缩放（限制在合法范围内）。非有限值或非正值被忽略。
    pub fn set_zoom(&mut self, zoom: f64) {
        if !zoom.is_finite() || zoom <= 0.0 {
            return;
        }
        self.viewer.zoom = ViewerState::clamp_zoom(zoom);
        self.notify(StoreChange::Viewer);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.viewer.zoom + ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.viewer.zoom - ZOOM_STEP);
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.viewer.rotation = rotation;
        self.notify(StoreChange::Viewer);
    }

    pub fn rotate_clockwise(&mut self) {
        self.set_rotation(self.viewer.rotation.clockwise());
    }

    pub fn rotate_counterclockwise(&mut self) {
        self.set_rotation(self.viewer.rotation.counterclockwise());
    }

    pub fn set_fit_mode(&mut self, fit_mode: FitMode) {
        self.viewer.fit_mode = fit_mode;
        self.notify(StoreChange::Viewer);
    }

    pub fn set_view_mode(&mut self, view_mode: ViewMode) {
        self.viewer.view_mode = view_mode;
        self.notify(StoreChange::Viewer);
    }

    pub fn toggle_sidebar(&mut self) {
        self.viewer.sidebar_visible = !self.viewer.sidebar_visible;
        self.notify(StoreChange::Viewer);
    }

    pub fn toggle_toolbar(&mut self) {
        self.viewer.toolbar_visible = !self.viewer.toolbar_visible;
        self.notify(StoreChange::Viewer);
    }

    pub fn set_presenter(&mut self, active: bool) {
        if self.viewer.presenter_active != active {
            self.viewer.presenter_active = active;
            self.notify(StoreChange::Viewer);
        }
    }

    // ---- 内部 ----

    fn clamp_page(&self, page: u32) -> u32 {
        let page = page.max(1);
        match &self.document {
            Some(document) if document.loaded => page.min(document.page_count.max(1)),
            _ => page,
        }
    }

    fn page_of(&self, id: &AnnotationId) -> Option<u32> {
        self.pages
            .iter()
            .find(|(_, list)| list.iter().any(|annotation| &annotation.id == id))
            .map(|(page, _)| *page)
    }

    fn take_annotation(&mut self, id: &AnnotationId) -> Option<Annotation> {
        let page = self.page_of(id)?;
        let list = self.pages.get_mut(&page)?;
        let index = list.iter().position(|annotation| &annotation.id == id)?;
        let removed = Arc::make_mut(list).remove(index);
        if list.is_empty() {
            self.pages.remove(&page);
        }
        Some(removed)
    }

    /// 插入批注并返回其所在页；页码至少为 1。若同 ID 已存在（任意页）则先移除旧的。
    fn insert_annotation(&mut self, mut annotation: Annotation) -> u32 {
        if self.take_annotation(&annotation.id).is_some() {
            debug!(id = %annotation.id, "批注 ID 已存在，替换旧批注");
        }
        let page = annotation.page_number.max(1);
        annotation.page_number = page;
        let list = self.pages.entry(page).or_default();
        Arc::make_mut(list).push(annotation);
        self.revalidate_selection();
        page
    }

    fn drop_all_annotations(&mut self) {
        self.pages.clear();
        if self.selection.take().is_some() {
            self.notify(StoreChange::Selection);
        }
        self.notify(StoreChange::Annotations { page: None });
    }

    fn restore(&mut self, snapshot: AnnotationSnapshot) {
        self.pages = snapshot.pages;
        self.selection = snapshot.selection;
        self.revalidate_selection();
        self.notify(StoreChange::Annotations { page: None });
        self.notify(StoreChange::History);
    }

    fn revalidate_selection(&mut self) {
        let dangling = self
            .selection
            .as_ref()
            .is_some_and(|id| self.annotation(id).is_none());
        if dangling {
            self.selection = None;
            self.notify(StoreChange::Selection);
        }
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("document", &self.document)
            .field("pages", &self.pages)
            .field("selection", &self.selection)
            .field("viewer", &self.viewer)
            .field("history", &self.history)
            .field("observers", &self.observers.len())
            .finish()
    }
}
