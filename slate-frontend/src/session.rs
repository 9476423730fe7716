use slate_config::AppConfig;
use slate_core::event::IntegrationEvent;
use slate_engine::command::{CommandBus, CommandContext, CommandRequest, CommandResponse};
use slate_engine::{DispatchReport, DocumentStore, EventQueue, HandlerRegistry, dispatch_pending};
use tracing::debug;

/// 同步会话：唯一持有 store、事件队列与处理器表的写入方。
///
/// 远端事件经 [`SyncSession::ingest`] 入队，再由 [`SyncSession::pump`] 统一分发；
/// 本地输入走命令总线直接作用于 store。
pub struct SyncSession {
    store: DocumentStore,
    queue: EventQueue,
    registry: HandlerRegistry,
    commands: CommandBus,
}

impl SyncSession {
    pub fn new(history_limit: usize, queue_capacity: usize) -> Self {
        Self {
            store: DocumentStore::with_history_limit(history_limit),
            queue: EventQueue::with_capacity(queue_capacity),
            registry: HandlerRegistry::new(),
            commands: CommandBus::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.history.limit, config.events.queue_capacity)
    }

    pub fn ingest(&mut self, event: IntegrationEvent) {
        debug!(id = %event.id, kind = %event.kind, "事件入队");
        self.queue.push(event);
    }

    /// 分发所有未处理事件。
    pub fn pump(&mut self) -> DispatchReport {
        dispatch_pending(&mut self.queue, &self.registry, &mut self.store)
    }

    pub fn execute(&mut self, request: &CommandRequest) -> CommandResponse {
        let mut context = CommandContext {
            store: &mut self.store,
        };
        self.commands.dispatch(request, &mut context)
    }

    pub fn status_message(&self) -> String {
        slate_engine::status_message(self.queue.recent())
    }

    #[inline]
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut DocumentStore {
        &mut self.store
    }

    #[inline]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    #[inline]
    pub fn commands(&self) -> &CommandBus {
        &self.commands
    }
}

impl Default for SyncSession {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}
