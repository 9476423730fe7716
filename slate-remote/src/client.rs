use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use slate_core::connection::ConnectionState;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::protocol::message_type;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 11451;

pub type MessageHandler = Arc<dyn Fn(&Value) + Send + Sync>;
pub type ConnectionObserver = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 连接状态迁移，推送给观察者。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    /// `clean` 表示由 `disconnect` 主动关闭。
    Closed { clean: bool },
    Error(String),
}

/// 按消息类型注册处理器的路由接口。
pub trait MessageRouter {
    fn on(&self, message_type: &str, handler: MessageHandler);
    fn off(&self, message_type: &str);
}

/// 指数退避：第 n 次重连等待 `base × 2^(n−1)`，超过 `max_attempts` 后放弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// 第 `attempt` 次（从 1 开始）重连前的等待时间；超出上限返回 `None`。
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.base_delay.saturating_mul(factor))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1_000), 5)
    }
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub host: String,
    pub port: u16,
    pub auto_reconnect: bool,
    pub policy: ReconnectPolicy,
}

impl TransportOptions {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            auto_reconnect: true,
            policy: ReconnectPolicy::default(),
        }
    }
}

struct Shared {
    url: String,
    auto_reconnect: bool,
    policy: ReconnectPolicy,
    handlers: Mutex<HashMap<String, MessageHandler>>,
    observers: Mutex<Vec<ConnectionObserver>>,
    state: Mutex<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    attempts: AtomicU32,
    manual_close: AtomicBool,
    /// 建立连接的过程串行执行，持有期间跨越握手的 await。
    connect_gate: AsyncMutex<()>,
    /// 每条连接的代号；被替换的 I/O 任务退出时不再改动共享状态。
    generation: AtomicU64,
    io_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

/// 远程控制通道的 WebSocket 客户端。
///
/// 同一时刻至多一条连接。非主动断开时按 [`ReconnectPolicy`] 重连；
/// 发送为即发即弃，未连接时直接丢弃并记录警告。必须在 tokio 运行时内使用。
#[derive(Clone)]
pub struct TransportClient {
    shared: Arc<Shared>,
}

impl TransportClient {
    pub fn new(options: TransportOptions) -> Self {
        let url = options.url();
        Self {
            shared: Arc::new(Shared {
                url,
                auto_reconnect: options.auto_reconnect,
                policy: options.policy,
                handlers: Mutex::new(HashMap::new()),
                observers: Mutex::new(Vec::new()),
                state: Mutex::new(ConnectionState::disconnected(options.port)),
                outbound: Mutex::new(None),
                attempts: AtomicU32::new(0),
                manual_close: AtomicBool::new(false),
                connect_gate: AsyncMutex::new(()),
                generation: AtomicU64::new(0),
                io_task: Mutex::new(None),
                reconnect_task: Mutex::new(None),
            }),
        }
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.lock().clone()
    }

    /// 当前连续重连次数，连接成功后归零。
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn observe(&self, observer: ConnectionObserver) {
        self.shared.observers.lock().push(observer);
    }

    /// 建立连接。已连接时直接返回；失败时返回错误，并在允许时安排后台重连。
    ///
    /// 并发调用会在握手期间排队，后到的调用看到已建立的连接后直接返回。
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }
        let _gate = self.shared.connect_gate.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        self.shared.manual_close.store(false, Ordering::SeqCst);
        if let Some(pending) = self.shared.reconnect_task.lock().take() {
            pending.abort();
        }

        match open_connection(&self.shared).await {
            Ok(()) => Ok(()),
            Err(err) => {
                schedule_reconnect(&self.shared);
                Err(err)
            }
        }
    }

    /// 主动断开。不会触发重连，并取消尚未执行的重连。
    pub async fn disconnect(&self) {
        self.shared.manual_close.store(true, Ordering::SeqCst);
        if let Some(pending) = self.shared.reconnect_task.lock().take() {
            pending.abort();
        }
        // 丢弃发送端后 I/O 任务发送 Close 帧并退出
        self.shared.outbound.lock().take();
        let io_task = self.shared.io_task.lock().take();
        if let Some(task) = io_task {
            let _ = task.await;
        }
        info!(url = %self.shared.url, "已断开远程控制连接");
    }

    /// 即发即弃地发送一条消息，返回是否交给了发送队列。
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        match self.try_send(message) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "消息未发送");
                false
            }
        }
    }

    pub fn try_send<T: Serialize>(&self, message: &T) -> Result<(), TransportError> {
        let value = serde_json::to_value(message)?;
        let message_type = message_type(&value).unwrap_or("<untyped>").to_string();
        let text = serde_json::to_string(&value)?;

        let delivered = self
            .shared
            .outbound
            .lock()
            .as_ref()
            .is_some_and(|sender| sender.send(Message::Text(text)).is_ok());
        if delivered {
            debug!(message_type = %message_type, "消息已发送");
            Ok(())
        } else {
            Err(TransportError::NotConnected { message_type })
        }
    }
}

impl MessageRouter for TransportClient {
    fn on(&self, message_type: &str, handler: MessageHandler) {
        self.shared
            .handlers
            .lock()
            .insert(message_type.to_string(), handler);
    }

    fn off(&self, message_type: &str) {
        self.shared.handlers.lock().remove(message_type);
    }
}

fn notify(shared: &Shared, event: ConnectionEvent) {
    let observers = shared.observers.lock().clone();
    for observer in observers {
        observer(&event);
    }
}

async fn open_connection(shared: &Arc<Shared>) -> Result<(), TransportError> {
    let socket = match connect_async(shared.url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(source) => {
            let message = source.to_string();
            shared.state.lock().last_error = Some(message.clone());
            notify(shared, ConnectionEvent::Error(message));
            return Err(TransportError::Connect {
                url: shared.url.clone(),
                source: Box::new(source),
            });
        }
    };

    let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let (sender, receiver) = mpsc::unbounded_channel();
    *shared.outbound.lock() = Some(sender);
    shared.attempts.store(0, Ordering::SeqCst);
    {
        let mut state = shared.state.lock();
        state.connected = true;
        state.last_error = None;
        state.connected_at = Some(Utc::now());
    }
    info!(url = %shared.url, generation, "远程控制连接已建立");
    notify(shared, ConnectionEvent::Opened);

    let task = tokio::spawn(run_io(Arc::clone(shared), socket, receiver, generation));
    *shared.io_task.lock() = Some(task);
    Ok(())
}

async fn run_io(
    shared: Arc<Shared>,
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    generation: u64,
) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => route(&shared, &text),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "服务端关闭连接");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let message = err.to_string();
                    warn!(error = %message, "远程控制连接出错");
                    shared.state.lock().last_error = Some(message.clone());
                    notify(&shared, ConnectionEvent::Error(message));
                    break;
                }
                None => break,
            },
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(err) = write.send(message).await {
                        warn!(error = %err, "发送消息失败");
                        break;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    if shared.generation.load(Ordering::SeqCst) != generation {
        debug!(generation, "连接已被新连接替换，忽略旧连接的关闭");
        return;
    }
    shared.outbound.lock().take();
    shared.state.lock().connected = false;
    let clean = shared.manual_close.load(Ordering::SeqCst);
    info!(url = %shared.url, clean, "远程控制连接已关闭");
    notify(&shared, ConnectionEvent::Closed { clean });
    if !clean {
        schedule_reconnect(&shared);
    }
}

fn route(shared: &Shared, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "收到无法解析的消息，已丢弃");
            return;
        }
    };
    let Some(kind) = message_type(&value) else {
        warn!("消息缺少 type 字段，已丢弃");
        return;
    };
    // 先取出处理器再调用，处理器内部可以安全地注册或注销
    let handler = shared.handlers.lock().get(kind).cloned();
    match handler {
        Some(handler) => handler(&value),
        None => debug!(message_type = kind, "没有对应的处理器，消息已丢弃"),
    }
}

fn schedule_reconnect(shared: &Arc<Shared>) {
    if !shared.auto_reconnect || shared.manual_close.load(Ordering::SeqCst) {
        return;
    }
    let task = tokio::spawn(reconnect_loop(Arc::clone(shared)));
    if let Some(previous) = shared.reconnect_task.lock().replace(task) {
        previous.abort();
    }
}

async fn reconnect_loop(shared: Arc<Shared>) {
    loop {
        if shared.manual_close.load(Ordering::SeqCst) {
            return;
        }
        let attempt = shared.attempts.load(Ordering::SeqCst) + 1;
        let Some(delay) = shared.policy.delay_for(attempt) else {
            warn!(
                url = %shared.url,
                attempts = attempt - 1,
                "重连次数已达上限，放弃重连"
            );
            return;
        };
        shared.attempts.store(attempt, Ordering::SeqCst);
        debug!(attempt, ?delay, "准备重连");
        tokio::time::sleep(delay).await;

        let _gate = shared.connect_gate.lock().await;
        if shared.manual_close.load(Ordering::SeqCst) {
            return;
        }
        if shared.state.lock().connected {
            debug!(attempt, "连接已由其他调用建立，停止重连");
            return;
        }
        match open_connection(&shared).await {
            Ok(()) => return,
            Err(err) => debug!(attempt, error = %err, "重连失败"),
        }
    }
}
