pub mod geometry {
    use serde::{Deserialize, Serialize};

    /// 页面坐标中的点，单位与 PDF 用户空间一致。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point {
        pub x: f64,
        pub y: f64,
    }

    impl Point {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self { x, y }
        }

        #[inline]
        pub fn translate(self, dx: f64, dy: f64) -> Self {
            Self::new(self.x + dx, self.y + dy)
        }
    }

    /// 轴对齐矩形，描述批注在页面上的位置与尺寸。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Rect {
        pub x: f64,
        pub y: f64,
        pub width: f64,
        pub height: f64,
    }

    impl Rect {
        #[inline]
        pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
            Self {
                x,
                y,
                width,
                height,
            }
        }

        #[inline]
        pub fn translate(self, dx: f64, dy: f64) -> Self {
            Self::new(self.x + dx, self.y + dy, self.width, self.height)
        }

        #[inline]
        pub fn contains(&self, point: Point) -> bool {
            point.x >= self.x
                && point.y >= self.y
                && point.x <= self.x + self.width
                && point.y <= self.y + self.height
        }
    }
}

pub mod document {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// 当前打开的文档元信息。`id` 在每次创建时重新生成，用于判定文档是否被替换。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Document {
        pub id: Uuid,
        pub path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub author: Option<String>,
        pub page_count: u32,
        #[serde(default)]
        pub file_size: u64,
        pub loaded: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub created: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub modified: Option<DateTime<Utc>>,
    }

    impl Document {
        pub fn new(path: impl Into<String>, page_count: u32) -> Self {
            Self {
                id: Uuid::new_v4(),
                path: path.into(),
                title: None,
                author: None,
                page_count,
                file_size: 0,
                loaded: true,
                created: None,
                modified: None,
            }
        }

        pub fn with_title(mut self, title: impl Into<String>) -> Self {
            self.title = Some(title.into());
            self
        }

        pub fn with_author(mut self, author: impl Into<String>) -> Self {
            self.author = Some(author.into());
            self
        }

        pub fn with_file_size(mut self, bytes: u64) -> Self {
            self.file_size = bytes;
            self
        }

        /// 远端状态是否描述的是同一份文档。标题与作者不参与比较。
        #[inline]
        pub fn matches(&self, path: &str, page_count: u32) -> bool {
            self.path == path && self.page_count == page_count
        }
    }
}

pub mod annotation {
    use std::fmt;

    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use tracing::trace;

    use crate::geometry::{Point, Rect};
    use crate::payload;

    pub const DEFAULT_COLOR: &str = "#ffeb3b";

    /// 批注 ID，跨页面唯一。
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AnnotationId(String);

    impl AnnotationId {
        #[inline]
        pub fn new(raw: impl Into<String>) -> Self {
            Self(raw.into())
        }

        #[inline]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for AnnotationId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl From<&str> for AnnotationId {
        fn from(value: &str) -> Self {
            Self::new(value)
        }
    }

    impl From<String> for AnnotationId {
        fn from(value: String) -> Self {
            Self(value)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum AnnotationKind {
        Highlight,
        Underline,
        Strikethrough,
        Rectangle,
        Circle,
        Arrow,
        Line,
        FreeHand,
        Text,
        Note,
    }

    impl AnnotationKind {
        /// 解析线上类型名，兼容几种常见写法。未知类型返回 `None`。
        pub fn parse(raw: &str) -> Option<Self> {
            let kind = match raw.trim().to_ascii_lowercase().as_str() {
                "highlight" => Self::Highlight,
                "underline" => Self::Underline,
                "strikethrough" | "strike" => Self::Strikethrough,
                "rectangle" | "rect" => Self::Rectangle,
                "circle" | "ellipse" => Self::Circle,
                "arrow" => Self::Arrow,
                "line" => Self::Line,
                "freehand" | "free-draw" | "free_draw" | "freedraw" | "ink" | "pen" => {
                    Self::FreeHand
                }
                "text" => Self::Text,
                "note" | "comment" => Self::Note,
                _ => return None,
            };
            Some(kind)
        }

        pub fn as_str(self) -> &'static str {
            match self {
                Self::Highlight => "highlight",
                Self::Underline => "underline",
                Self::Strikethrough => "strikethrough",
                Self::Rectangle => "rectangle",
                Self::Circle => "circle",
                Self::Arrow => "arrow",
                Self::Line => "line",
                Self::FreeHand => "freehand",
                Self::Text => "text",
                Self::Note => "note",
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Style {
        pub color: String,
        pub opacity: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub stroke_width: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub font_size: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub background_color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub background_opacity: Option<f64>,
    }

    impl Default for Style {
        fn default() -> Self {
            Self {
                color: DEFAULT_COLOR.to_string(),
                opacity: 1.0,
                stroke_width: None,
                font_size: None,
                background_color: None,
                background_opacity: None,
            }
        }
    }

    /// 单条批注。序列化格式与控制通道上的 `annotations` 负载一致（camelCase 字段）。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Annotation {
        pub id: AnnotationId,
        #[serde(rename = "type")]
        pub kind: AnnotationKind,
        pub page_number: u32,
        #[serde(flatten)]
        pub bounds: Rect,
        #[serde(default)]
        pub content: String,
        #[serde(flatten)]
        pub style: Style,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub points: Option<Vec<Point>>,
        pub created: DateTime<Utc>,
        pub modified: DateTime<Utc>,
        pub visible: bool,
    }

    impl Annotation {
        pub fn new(
            id: impl Into<AnnotationId>,
            kind: AnnotationKind,
            page_number: u32,
            bounds: Rect,
        ) -> Self {
            let now = Utc::now();
            Self {
                id: id.into(),
                kind,
                page_number,
                bounds,
                content: String::new(),
                style: Style::default(),
                points: None,
                created: now,
                modified: now,
                visible: true,
            }
        }

        pub fn with_content(mut self, content: impl Into<String>) -> Self {
            self.content = content.into();
            self
        }

        pub fn with_style(mut self, style: Style) -> Self {
            self.style = style;
            self
        }

        pub fn with_points(mut self, points: Vec<Point>) -> Self {
            self.points = Some(points);
            self
        }

        /// 宽松地从未受信任的 JSON 中构造批注。
        ///
        /// 必填字段为 `id`、`type`（可识别的类型）以及 `x`/`y`/`width`/`height`，
        /// 任一缺失或类型不符即返回 `None`。其余字段缺失时取默认值，
        /// 时间戳缺失或无法解析时使用 `now`。
        pub fn from_payload(value: &Value, now: DateTime<Utc>) -> Option<Self> {
            payload::as_record(value)?;

            let Some(id) = payload::read_string(value, &["id"]) else {
                trace!("批注缺少 id，已丢弃");
                return None;
            };
            let Some(kind) = payload::read_string(value, &["type", "kind"]).and_then(AnnotationKind::parse)
            else {
                trace!(id, "批注类型缺失或无法识别，已丢弃");
                return None;
            };
            let bounds = Rect::new(
                payload::read_number(value, &["x"])?,
                payload::read_number(value, &["y"])?,
                payload::read_number(value, &["width"])?,
                payload::read_number(value, &["height"])?,
            );

            let page_number =
                payload::read_page(value, &["pageNumber", "page_number", "page"]).unwrap_or(1);

            let style = Style {
                color: payload::read_string(value, &["color"])
                    .unwrap_or(DEFAULT_COLOR)
                    .to_string(),
                opacity: payload::read_number(value, &["opacity"])
                    .map(|opacity| opacity.clamp(0.0, 1.0))
                    .unwrap_or(1.0),
                stroke_width: payload::read_number(value, &["strokeWidth", "stroke_width"]),
                font_size: payload::read_number(value, &["fontSize", "font_size"]),
                background_color: payload::read_string(
                    value,
                    &["backgroundColor", "background_color"],
                )
                .map(str::to_string),
                background_opacity: payload::read_number(
                    value,
                    &["backgroundOpacity", "background_opacity"],
                ),
            };

            let points = payload::read_array(value, &["points"])
                .map(|raw| raw.iter().filter_map(point_from_value).collect::<Vec<_>>());

            let created = read_timestamp(value, &["created", "createdAt", "created_at"]).unwrap_or(now);
            let modified =
                read_timestamp(value, &["modified", "modifiedAt", "modified_at"]).unwrap_or(created);

            Some(Self {
                id: AnnotationId::new(id),
                kind,
                page_number,
                bounds,
                content: payload::read_string(value, &["content", "text"])
                    .unwrap_or_default()
                    .to_string(),
                style,
                points,
                created,
                modified,
                visible: payload::read_bool(value, &["visible"]).unwrap_or(true),
            })
        }
    }

    /// 对单条批注的局部修改；`None` 字段保持原值。
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct AnnotationPatch {
        pub bounds: Option<Rect>,
        pub content: Option<String>,
        pub style: Option<Style>,
        pub points: Option<Vec<Point>>,
        pub visible: Option<bool>,
    }

    impl AnnotationPatch {
        pub fn is_empty(&self) -> bool {
            self.bounds.is_none()
                && self.content.is_none()
                && self.style.is_none()
                && self.points.is_none()
                && self.visible.is_none()
        }

        /// 应用修改并刷新 `modified`。空修改不会改动时间戳。
        pub fn apply(self, annotation: &mut Annotation, now: DateTime<Utc>) {
            if self.is_empty() {
                return;
            }
            if let Some(bounds) = self.bounds {
                annotation.bounds = bounds;
            }
            if let Some(content) = self.content {
                annotation.content = content;
            }
            if let Some(style) = self.style {
                annotation.style = style;
            }
            if let Some(points) = self.points {
                annotation.points = Some(points);
            }
            if let Some(visible) = self.visible {
                annotation.visible = visible;
            }
            annotation.modified = now;
        }
    }

    fn point_from_value(value: &Value) -> Option<Point> {
        match value {
            Value::Array(pair) if pair.len() == 2 => {
                let x = pair[0].as_f64().filter(|n| n.is_finite())?;
                let y = pair[1].as_f64().filter(|n| n.is_finite())?;
                Some(Point::new(x, y))
            }
            _ => Some(Point::new(
                payload::read_number(value, &["x"])?,
                payload::read_number(value, &["y"])?,
            )),
        }
    }

    fn read_timestamp(value: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
        let raw = payload::read_string(value, keys)?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc))
    }

}

pub mod viewer {
    use serde::{Deserialize, Serialize};

    pub const MIN_ZOOM: f64 = 0.1;
    pub const MAX_ZOOM: f64 = 5.0;
    pub const DEFAULT_ZOOM: f64 = 1.0;
    pub const ZOOM_STEP: f64 = 0.25;

    /// 页面旋转角，仅允许 90° 的整数倍。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub enum Rotation {
        #[default]
        Deg0,
        Deg90,
        Deg180,
        Deg270,
    }

    impl Rotation {
        pub fn degrees(self) -> u16 {
            match self {
                Self::Deg0 => 0,
                Self::Deg90 => 90,
                Self::Deg180 => 180,
                Self::Deg270 => 270,
            }
        }

        /// 按 360° 回绕后转换，非 90° 整数倍返回 `None`。
        pub fn from_degrees(degrees: i32) -> Option<Self> {
            match degrees.rem_euclid(360) {
                0 => Some(Self::Deg0),
                90 => Some(Self::Deg90),
                180 => Some(Self::Deg180),
                270 => Some(Self::Deg270),
                _ => None,
            }
        }

        pub fn clockwise(self) -> Self {
            match self {
                Self::Deg0 => Self::Deg90,
                Self::Deg90 => Self::Deg180,
                Self::Deg180 => Self::Deg270,
                Self::Deg270 => Self::Deg0,
            }
        }

        pub fn counterclockwise(self) -> Self {
            match self {
                Self::Deg0 => Self::Deg270,
                Self::Deg90 => Self::Deg0,
                Self::Deg180 => Self::Deg90,
                Self::Deg270 => Self::Deg180,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum FitMode {
        #[default]
        None,
        Page,
        Width,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum ViewMode {
        #[default]
        Single,
        Continuous,
        TwoPage,
    }

    /// 阅读器参数：当前页、缩放、旋转以及界面开关。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct ViewerState {
        pub current_page: u32,
        pub zoom: f64,
        pub rotation: Rotation,
        pub fit_mode: FitMode,
        pub view_mode: ViewMode,
        pub sidebar_visible: bool,
        pub toolbar_visible: bool,
        pub presenter_active: bool,
    }

    impl ViewerState {
        #[inline]
        pub fn clamp_zoom(value: f64) -> f64 {
            value.clamp(MIN_ZOOM, MAX_ZOOM)
        }
    }

    impl Default for ViewerState {
        fn default() -> Self {
            Self {
                current_page: 1,
                zoom: DEFAULT_ZOOM,
                rotation: Rotation::default(),
                fit_mode: FitMode::default(),
                view_mode: ViewMode::default(),
                sidebar_visible: true,
                toolbar_visible: true,
                presenter_active: false,
            }
        }
    }

}

pub mod event {
    use std::fmt;

    use chrono::{DateTime, Utc};
    use serde_json::Value;
    use uuid::Uuid;

    /// 规范化后的语义事件类型，与线上消息类型解耦。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum EventKind {
        Connected,
        StatusSync,
        PageChanged,
        ZoomChanged,
        PresenterToggled,
        DocumentOpened,
        DocumentClosed,
        AnnotationsUpdated,
        AnnotationsCleared,
        AnnotationAdded,
        Pong,
        Error,
    }

    impl EventKind {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Connected => "connected",
                Self::StatusSync => "status_sync",
                Self::PageChanged => "page_changed",
                Self::ZoomChanged => "zoom_changed",
                Self::PresenterToggled => "presenter_toggled",
                Self::DocumentOpened => "document_opened",
                Self::DocumentClosed => "document_closed",
                Self::AnnotationsUpdated => "annotations_updated",
                Self::AnnotationsCleared => "annotations_cleared",
                Self::AnnotationAdded => "annotation_added",
                Self::Pong => "pong",
                Self::Error => "error",
            }
        }
    }

    impl fmt::Display for EventKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EventSource {
        /// 控制通道（WebSocket）。
        Wire,
        /// 进程内的远程控制事件总线。
        RemoteChannel,
        Local,
    }

    /// 排队等待分发的事件。`handled` 只能从 `false` 变为 `true`。
    #[derive(Debug, Clone, PartialEq)]
    pub struct IntegrationEvent {
        pub id: Uuid,
        pub kind: EventKind,
        pub source: EventSource,
        pub timestamp: DateTime<Utc>,
        pub payload: Value,
        handled: bool,
    }

    impl IntegrationEvent {
        pub fn new(kind: EventKind, source: EventSource, payload: Value) -> Self {
            Self {
                id: Uuid::new_v4(),
                kind,
                source,
                timestamp: Utc::now(),
                payload,
                handled: false,
            }
        }

        #[inline]
        pub fn is_handled(&self) -> bool {
            self.handled
        }

        /// 标记为已处理，返回本次调用是否发生了状态迁移。
        #[inline]
        pub fn mark_handled(&mut self) -> bool {
            !std::mem::replace(&mut self.handled, true)
        }
    }

}

pub mod connection {
    use chrono::{DateTime, Utc};
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct ConnectionState {
        pub connected: bool,
        pub port: u16,
        pub last_error: Option<String>,
        pub connected_at: Option<DateTime<Utc>>,
    }

    impl ConnectionState {
        pub fn disconnected(port: u16) -> Self {
            Self {
                connected: false,
                port,
                last_error: None,
                connected_at: None,
            }
        }
    }
}

/// 面向未受信任 JSON 负载的防御式取值函数。
///
/// 每个函数接受按优先级排列的候选键（例如 `pageNumber` 与 `page_number`），
/// 返回第一个类型合法的值；找不到时返回 `None`，不会猜测默认值，也不会 panic。
pub mod payload {
    use serde_json::{Map, Value};

    pub type Record = Map<String, Value>;

    /// 仅当值为 JSON 对象时返回其映射。
    #[inline]
    pub fn as_record(value: &Value) -> Option<&Record> {
        value.as_object()
    }

    pub fn read_number(value: &Value, keys: &[&str]) -> Option<f64> {
        let record = as_record(value)?;
        keys.iter().find_map(|key| {
            record
                .get(*key)
                .and_then(Value::as_f64)
                .filter(|number| number.is_finite())
        })
    }

    pub fn read_bool(value: &Value, keys: &[&str]) -> Option<bool> {
        let record = as_record(value)?;
        keys.iter()
            .find_map(|key| record.get(*key).and_then(Value::as_bool))
    }

    pub fn read_string<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
        let record = as_record(value)?;
        keys.iter().find_map(|key| {
            record
                .get(*key)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
        })
    }

    pub fn read_array<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
        let record = as_record(value)?;
        keys.iter()
            .find_map(|key| record.get(*key).and_then(Value::as_array))
    }

    pub fn read_record<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Record> {
        let record = as_record(value)?;
        keys.iter()
            .find_map(|key| record.get(*key).and_then(Value::as_object))
    }

    /// 读取页码：有限数值且 ≥ 1，向下取整。
    pub fn read_page(value: &Value, keys: &[&str]) -> Option<u32> {
        read_number(value, keys)
            .filter(|number| *number >= 1.0 && *number <= f64::from(u32::MAX))
            .map(|number| number.floor() as u32)
    }

    #[cfg(test)]
    mod tests {
        use serde_json::json;

        use super::*;

        #[test]
        fn record_requires_object() {
            assert!(as_record(&json!({"a": 1})).is_some());
            assert!(as_record(&Value::Null).is_none());
            assert!(as_record(&json!([1, 2])).is_none());
            assert!(as_record(&json!("page")).is_none());
        }

        #[test]
        fn number_falls_back_across_keys() {
            let value = json!({"pageNumber": "7", "page_number": 7});
            assert_eq!(read_number(&value, &["pageNumber", "page_number"]), Some(7.0));
            assert_eq!(read_number(&value, &["missing"]), None);
            assert_eq!(read_number(&json!(3), &["page"]), None);
        }

        #[test]
        fn bool_must_be_strict() {
            let value = json!({"active": "true", "presenter_active": false});
            assert_eq!(read_bool(&value, &["active", "presenter_active"]), Some(false));
            assert_eq!(read_bool(&json!({"active": 1}), &["active"]), None);
        }

        #[test]
        fn string_skips_empty_values() {
            let value = json!({"path": "", "pdf_path": "/a.pdf"});
            assert_eq!(read_string(&value, &["path", "pdf_path"]), Some("/a.pdf"));
            assert_eq!(read_string(&json!({"path": 5}), &["path"]), None);
        }

        #[test]
        fn page_is_floored_and_bounded() {
            assert_eq!(read_page(&json!({"page": 4.9}), &["page"]), Some(4));
            assert_eq!(read_page(&json!({"page": 1}), &["page"]), Some(1));
            assert_eq!(read_page(&json!({"page": 0.99}), &["page"]), None);
            assert_eq!(read_page(&json!({"page": -3}), &["page"]), None);
            assert_eq!(read_page(&json!({"page": 1e12}), &["page"]), None);
        }
    }
}
