use std::collections::VecDeque;

use slate_core::event::IntegrationEvent;
use tracing::debug;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// 有界事件队列，超出容量时丢弃最早的事件。
#[derive(Debug, Clone)]
pub struct EventQueue {
    events: VecDeque<IntegrationEvent>,
    capacity: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: IntegrationEvent) {
        while self.events.len() >= self.capacity {
            if let Some(evicted) = self.events.pop_front() {
                if !evicted.is_handled() {
                    debug!(id = %evicted.id, kind = %evicted.kind, "队列已满，丢弃未处理的事件");
                }
            }
        }
        self.events.push_back(event);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pending(&self) -> usize {
        self.events.iter().filter(|event| !event.is_handled()).count()
    }

    /// 按到达顺序遍历。
    pub fn iter(&self) -> impl Iterator<Item = &IntegrationEvent> + '_ {
        self.events.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut IntegrationEvent> + '_ {
        self.events.iter_mut()
    }

    /// 从最新到最旧遍历。
    pub fn recent(&self) -> impl Iterator<Item = &IntegrationEvent> + '_ {
        self.events.iter().rev()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
