use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("连接 {url} 失败: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },
    #[error("连接未建立，消息 {message_type} 已丢弃")]
    NotConnected { message_type: String },
    #[error("序列化消息失败: {0}")]
    Encode(#[from] serde_json::Error),
}
