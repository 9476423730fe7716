use std::collections::VecDeque;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMode {
    Idle,
    /// 分组期间只记录第一次快照，使一次手势只产生一条撤销记录。
    Grouping { snapshot_taken: bool },
}

/// 有界的线性撤销/重做栈。新的编辑会清空重做栈，不保留分支。
#[derive(Debug, Clone)]
pub struct History<S> {
    undo: VecDeque<S>,
    redo: VecDeque<S>,
    limit: usize,
    mode: HistoryMode,
}

impl<S> History<S> {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            limit: limit.max(1),
            mode: HistoryMode::Idle,
        }
    }

    #[inline]
    pub fn mode(&self) -> HistoryMode {
        self.mode
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn begin_group(&mut self) {
        self.mode = HistoryMode::Grouping {
            snapshot_taken: false,
        };
    }

    pub fn end_group(&mut self) {
        self.mode = HistoryMode::Idle;
    }

    /// 记录一次快照，返回是否真正入栈。快照通过闭包延迟生成，分组内的重复调用不会产生拷贝。
    pub fn record(&mut self, snapshot: impl FnOnce() -> S) -> bool {
        match self.mode {
            HistoryMode::Grouping {
                snapshot_taken: true,
            } => return false,
            HistoryMode::Grouping {
                snapshot_taken: false,
            } => {
                self.mode = HistoryMode::Grouping {
                    snapshot_taken: true,
                };
            }
            HistoryMode::Idle => {}
        }
        push_bounded(&mut self.undo, snapshot(), self.limit);
        self.redo.clear();
        true
    }

    /// 弹出撤销栈顶，并把 `current` 推入重做栈。栈为空时不调用 `current`。
    pub fn undo(&mut self, current: impl FnOnce() -> S) -> Option<S> {
        let previous = self.undo.pop_back()?;
        push_bounded(&mut self.redo, current(), self.limit);
        Some(previous)
    }

    pub fn redo(&mut self, current: impl FnOnce() -> S) -> Option<S> {
        let next = self.redo.pop_back()?;
        push_bounded(&mut self.undo, current(), self.limit);
        Some(next)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    #[inline]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[inline]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    #[inline]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    #[inline]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}

impl<S> Default for History<S> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

fn push_bounded<S>(stack: &mut VecDeque<S>, item: S, limit: usize) {
    while stack.len() >= limit {
        stack.pop_front();
    }
    stack.push_back(item);
}
