//! 远程控制通道：线上协议、WebSocket 客户端、消息映射与进程内事件总线。

pub mod channel;
pub mod client;
pub mod error;
pub mod message_map;
pub mod protocol;

pub use channel::{RemoteControlEvent, RemoteEventBus};
pub use client::{
    ConnectionEvent, MessageHandler, MessageRouter, ReconnectPolicy, TransportClient,
    TransportOptions,
};
pub use error::TransportError;
pub use message_map::{ErrorSink, EventSink, register_handlers};
pub use protocol::ClientCommand;
