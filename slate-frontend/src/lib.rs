pub mod cli;
pub mod errors;
pub mod runner;
pub mod session;

use errors::FrontendError;
use slate_config::AppConfig;
use tracing::info;

pub use runner::RemoteRunner;
pub use session::SyncSession;

/// 启动离线 CLI 演示。
pub fn run_cli_demo(config: &AppConfig) -> Result<(), FrontendError> {
    info!("启动 CLI 演示前端");
    cli::run_demo(config);
    Ok(())
}

/// 连接远程控制服务并运行会话循环，直到 Ctrl-C。
pub fn run_remote(config: &AppConfig) -> Result<(), FrontendError> {
    info!(url = %config.remote.url(), "启动远程同步前端");
    let session = RemoteRunner::from_config(config).run()?;
    info!(status = %session.status_message(), "远程同步前端已退出");
    Ok(())
}
