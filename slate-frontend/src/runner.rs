use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use slate_config::AppConfig;
use slate_core::event::IntegrationEvent;
use slate_remote::{
    ClientCommand, ConnectionEvent, ReconnectPolicy, RemoteEventBus, TransportClient,
    TransportOptions, register_handlers,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::FrontendError;
use crate::session::SyncSession;

/// 在线模式：连接远程控制服务，把线上消息与进程内事件汇入同一个会话循环。
pub struct RemoteRunner {
    session: SyncSession,
    options: TransportOptions,
    status_poll: Duration,
    ping_interval: Duration,
    bus: RemoteEventBus,
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    command_rx: mpsc::UnboundedReceiver<ClientCommand>,
}

impl RemoteRunner {
    pub fn from_config(config: &AppConfig) -> Self {
        let remote = &config.remote;
        let options = TransportOptions {
            host: remote.host.clone(),
            port: remote.port,
            auto_reconnect: remote.auto_reconnect,
            policy: ReconnectPolicy::new(
                remote.reconnect_base_delay(),
                remote.max_reconnect_attempts,
            ),
        };
        Self::new(
            SyncSession::from_config(config),
            options,
            remote.status_poll_interval(),
            remote.ping_interval(),
        )
    }

    pub fn new(
        session: SyncSession,
        options: TransportOptions,
        status_poll: Duration,
        ping_interval: Duration,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            session,
            options,
            status_poll,
            ping_interval,
            bus: RemoteEventBus::default(),
            command_tx,
            command_rx,
        }
    }

    /// 进程内远程控制事件总线，发布的事件与线上消息走同一条分发路径。
    pub fn bus(&self) -> RemoteEventBus {
        self.bus.clone()
    }

    /// 向远端发送命令的入口。
    pub fn command_sender(&self) -> mpsc::UnboundedSender<ClientCommand> {
        self.command_tx.clone()
    }

    /// 在当前线程上运行，直到收到 Ctrl-C。
    pub fn run(self) -> Result<SyncSession, FrontendError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(FrontendError::Runtime)?;
        runtime.block_on(self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "无法监听 Ctrl-C，将持续运行");
                std::future::pending::<()>().await;
            }
        }))
    }

    /// 运行会话循环，`shutdown` 完成后断开连接并返回会话。
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<SyncSession, FrontendError> {
        let Self {
            mut session,
            options,
            status_poll,
            ping_interval,
            bus,
            command_tx,
            mut command_rx,
        } = self;
        drop(command_tx);

        let mut bus_rx = bus.subscribe();
        let client = TransportClient::new(options.clone());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<IntegrationEvent>();
        register_handlers(
            &client,
            Arc::new(move |event: IntegrationEvent| {
                let _ = event_tx.send(event);
            }),
            Arc::new(|message: String| warn!(%message, "远程控制报告错误")),
        );
        client.observe(Arc::new(|event: &ConnectionEvent| match event {
            ConnectionEvent::Opened => info!("远程控制已连接"),
            ConnectionEvent::Closed { clean } => info!(clean = *clean, "远程控制已断开"),
            ConnectionEvent::Error(message) => warn!(%message, "远程控制连接错误"),
        }));

        info!(url = client.url(), "连接远程控制服务");
        if let Err(err) = client.connect().await {
            if !options.auto_reconnect {
                return Err(err.into());
            }
            warn!(error = %err, "首次连接失败，等待后台重连");
        }

        let mut status_timer = tokio::time::interval(status_poll);
        let mut ping_timer = tokio::time::interval(ping_interval);
        // 跳过立即触发的第一次心跳
        ping_timer.tick().await;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = event_rx.recv() => {
                    session.ingest(event);
                    pump(&mut session);
                }
                received = bus_rx.recv() => match received {
                    Ok(event) => {
                        session.ingest(event.into_integration_event());
                        pump(&mut session);
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "事件总线积压，部分事件被跳过"),
                    Err(RecvError::Closed) => {}
                },
                Some(command) = command_rx.recv() => {
                    client.send(&command);
                }
                _ = status_timer.tick() => {
                    if client.is_connected() {
                        client.send(&ClientCommand::GetState);
                    }
                }
                _ = ping_timer.tick() => {
                    if client.is_connected() {
                        client.send(&ClientCommand::Ping);
                    }
                }
            }
        }

        client.disconnect().await;
        Ok(session)
    }
}

fn pump(session: &mut SyncSession) {
    let report = session.pump();
    if report.processed > 0 {
        debug!(applied = report.applied, status = %session.status_message(), "会话状态已更新");
    }
}
