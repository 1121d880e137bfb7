//! 延迟投递队列
//!
//! 维护期间非特权操作产生的公共事件暂存于此，等待 flush。
//! 队列只在内存中，进程重启即丢失。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use shared::message::{BusMessage, EventType};
use uuid::Uuid;

/// 暂存的公共事件
#[derive(Debug, Clone)]
pub struct QueuedUpdate {
    pub id: Uuid,
    pub event_type: EventType,
    pub message: BusMessage,
    /// 入队时间 (Unix millis)
    pub enqueued_at: i64,
    pub origin_actor_id: Option<String>,
}

impl QueuedUpdate {
    pub fn new(message: BusMessage, origin_actor_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: message.event_type,
            message,
            enqueued_at: shared::util::now_millis(),
            origin_actor_id,
        }
    }

    pub fn summary(&self) -> QueuedSummary {
        QueuedSummary {
            id: self.id,
            event_type: self.event_type,
            drop_id: self.message.drop_id.clone(),
            enqueued_at: self.enqueued_at,
            origin_actor_id: self.origin_actor_id.clone(),
        }
    }
}

/// 队列条目摘要 (运营查看用，不含载荷)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedSummary {
    pub id: Uuid,
    pub event_type: EventType,
    pub drop_id: String,
    pub enqueued_at: i64,
    pub origin_actor_id: Option<String>,
}

/// 延迟投递队列
#[derive(Debug, Default)]
pub struct DeferredQueue {
    items: Mutex<VecDeque<QueuedUpdate>>,
    flushing: AtomicBool,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加到队尾
    pub fn enqueue(&self, update: QueuedUpdate) {
        self.items.lock().push_back(update);
    }

    /// 取出全部条目并清空队列 (原子)
    pub fn take_all(&self) -> Vec<QueuedUpdate> {
        let mut items = self.items.lock();
        std::mem::take(&mut *items).into()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// 按队列顺序列出所有条目摘要
    pub fn peek_summaries(&self) -> Vec<QueuedSummary> {
        self.items.lock().iter().map(QueuedUpdate::summary).collect()
    }

    /// 尝试开始 flush
    ///
    /// 已有 flush 在进行时返回 `None`。返回的 guard 释放时解除占用。
    pub fn begin_flush(&self) -> Option<FlushGuard<'_>> {
        self.flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlushGuard { queue: self })
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }
}

/// flush 占用标记
#[derive(Debug)]
pub struct FlushGuard<'a> {
    queue: &'a DeferredQueue,
}

impl std::ops::Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.queue.flushing.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::message::DropEvent;

    fn update(drop_id: &str) -> QueuedUpdate {
        let event = DropEvent::StatsReset {
            drop_id: drop_id.into(),
        };
        QueuedUpdate::new(BusMessage::from_event(&event, 1).unwrap(), Some("c1".into()))
    }

    #[test]
    fn test_take_all_preserves_order_and_clears() {
        let queue = DeferredQueue::new();
        queue.enqueue(update("a"));
        queue.enqueue(update("b"));
        queue.enqueue(update("c"));

        let summaries = queue.peek_summaries();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].drop_id, "a");
        assert_eq!(summaries[0].origin_actor_id.as_deref(), Some("c1"));

        let taken = queue.take_all();
        let ids: Vec<_> = taken.iter().map(|u| u.message.drop_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_guard_is_single_flight() {
        let queue = DeferredQueue::new();
        let guard = queue.begin_flush();
        assert!(guard.is_some());
        assert!(queue.is_flushing());
        assert!(queue.begin_flush().is_none());

        drop(guard);
        assert!(!queue.is_flushing());
        assert!(queue.begin_flush().is_some());
    }
}
