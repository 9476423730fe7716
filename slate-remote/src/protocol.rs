use serde::{Deserialize, Serialize};
use serde_json::Value;
use slate_core::annotation::Annotation;

/// 发往远程控制服务的命令。`type` 字段使用大写下划线命名。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    NextPage,
    PreviousPage,
    GoToPage { page: u32 },
    GetState,
    SetZoom { zoom: f64 },
    TogglePresenter,
    Ping,
    AddAnnotation { page: u32, annotation: Annotation },
    ClearAnnotations,
}

impl ClientCommand {
    pub fn wire_type(&self) -> &'static str {
        match self {
            Self::NextPage => "NEXT_PAGE",
            Self::PreviousPage => "PREVIOUS_PAGE",
            Self::GoToPage { .. } => "GO_TO_PAGE",
            Self::GetState => "GET_STATE",
            Self::SetZoom { .. } => "SET_ZOOM",
            Self::TogglePresenter => "TOGGLE_PRESENTER",
            Self::Ping => "PING",
            Self::AddAnnotation { .. } => "ADD_ANNOTATION",
            Self::ClearAnnotations => "CLEAR_ANNOTATIONS",
        }
    }
}

/// 读取消息的 `type` 字段，非对象或缺失时返回 `None`。
pub fn message_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use slate_core::annotation::AnnotationKind;
    use slate_core::geometry::Rect;

    use super::*;

    #[test]
    fn unit_commands_carry_only_type() {
        let value = serde_json::to_value(ClientCommand::GetState).unwrap();
        assert_eq!(value, json!({"type": "GET_STATE"}));
        let value = serde_json::to_value(ClientCommand::TogglePresenter).unwrap();
        assert_eq!(value, json!({"type": "TOGGLE_PRESENTER"}));
    }

    #[test]
    fn fields_sit_next_to_type() {
        let value = serde_json::to_value(ClientCommand::GoToPage { page: 7 }).unwrap();
        assert_eq!(value, json!({"type": "GO_TO_PAGE", "page": 7}));
        let value = serde_json::to_value(ClientCommand::SetZoom { zoom: 1.5 }).unwrap();
        assert_eq!(value, json!({"type": "SET_ZOOM", "zoom": 1.5}));
    }

    #[test]
    fn add_annotation_embeds_wire_shape() {
        let annotation = Annotation::new(
            "n1",
            AnnotationKind::Highlight,
            2,
            Rect::new(1.0, 2.0, 3.0, 4.0),
        );
        let command = ClientCommand::AddAnnotation {
            page: 2,
            annotation,
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(message_type(&value), Some(command.wire_type()));
        assert_eq!(value["page"], json!(2));
        assert_eq!(value["annotation"]["id"], json!("n1"));
        assert_eq!(value["annotation"]["type"], json!("highlight"));
        assert_eq!(value["annotation"]["pageNumber"], json!(2));
    }
}
