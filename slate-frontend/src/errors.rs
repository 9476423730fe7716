use slate_remote::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("创建 tokio 运行时失败: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("远程控制连接失败: {0}")]
    Transport(#[from] TransportError),
}
