//! 事件广播器
//!
//! ```text
//! publish(event, actor)
//!   │ validate ──✗──▶ Err(InvalidEvent)
//!   ▼
//!   admin ◀── 总是立即投递
//!   │
//!   ├─ 非维护 / 特权操作者 ──▶ public 立即投递
//!   └─ 维护中 + 非特权 ──────▶ DeferredQueue (等待 flush)
//! ```
//!
//! 投递失败 (无订阅者、传输错误、超时) 只记录日志，不影响调用方。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared::message::{Audience, BusMessage, DropEvent};

use super::maintenance::MaintenanceProbe;
use super::queue::{DeferredQueue, QueuedSummary, QueuedUpdate};
use crate::auth::Actor;
use crate::core::ResourceVersions;
use crate::message::Transport;
use crate::utils::{AppError, AppResult};

/// 单次发布的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// 两个受众都已尝试立即投递
    Delivered,
    /// 公共受众被延迟 (已入队)
    Deferred,
}

/// flush 结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// 本次取出的条目数
    pub flushed: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// 事件广播器
///
/// 独占延迟队列；所有公共事件都经由这里发出。
pub struct Broadcaster {
    transport: Arc<dyn Transport>,
    probe: Arc<MaintenanceProbe>,
    queue: DeferredQueue,
    versions: Arc<ResourceVersions>,
    delivery_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        transport: Arc<dyn Transport>,
        probe: Arc<MaintenanceProbe>,
        versions: Arc<ResourceVersions>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            probe,
            queue: DeferredQueue::new(),
            versions,
            delivery_timeout,
        }
    }

    /// 发布领域事件
    ///
    /// 只有畸形事件会返回错误；投递问题一律记录日志后吞掉。
    pub async fn publish(&self, event: DropEvent, actor: &Actor) -> AppResult<PublishOutcome> {
        event.validate()?;

        let version = self.versions.increment(event.drop_id());
        let msg = BusMessage::from_event(&event, version).map_err(|e| {
            AppError::invalid_event(format!("Failed to serialize {} event: {}", event.event_type(), e))
        })?;

        self.deliver(Audience::Admin, &msg).await;

        let maintenance = self.probe.is_maintenance_active().await;
        if maintenance && !actor.is_privileged() {
            self.queue
                .enqueue(QueuedUpdate::new(msg.clone(), actor.id.clone()));
            tracing::debug!(
                event_type = %msg.event_type,
                drop_id = %msg.drop_id,
                actor_role = %actor.role,
                queue_len = self.queue.len(),
                "Maintenance active, public delivery deferred"
            );
            return Ok(PublishOutcome::Deferred);
        }

        self.deliver(Audience::Public, &msg).await;
        Ok(PublishOutcome::Delivered)
    }

    /// 投递一条消息，返回是否成功
    async fn deliver(&self, audience: Audience, msg: &BusMessage) -> bool {
        match tokio::time::timeout(self.delivery_timeout, self.transport.deliver(audience, msg))
            .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(
                    audience = %audience,
                    event_type = %msg.event_type,
                    drop_id = %msg.drop_id,
                    error = %e,
                    "Event delivery failed"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    audience = %audience,
                    event_type = %msg.event_type,
                    drop_id = %msg.drop_id,
                    timeout_ms = self.delivery_timeout.as_millis() as u64,
                    "Event delivery timed out"
                );
                false
            }
        }
    }

    /// 推送延迟队列中的全部事件
    ///
    /// 先原子地取空队列，再按入队顺序逐条投递给公共受众，不再检查维护状态。
    /// flush 期间新入队的事件留给下一次 flush。同一时间只允许一个 flush。
    pub async fn flush_queue(&self) -> AppResult<FlushReport> {
        let Some(_guard) = self.queue.begin_flush() else {
            return Err(AppError::flush_in_progress());
        };

        let items = self.queue.take_all();
        let mut report = FlushReport {
            flushed: items.len(),
            ..Default::default()
        };

        for item in &items {
            if self.deliver(Audience::Public, &item.message).await {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.flushed > 0 {
            tracing::info!(
                flushed = report.flushed,
                delivered = report.delivered,
                failed = report.failed,
                "Deferred queue flushed"
            );
        }
        Ok(report)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_summaries(&self) -> Vec<QueuedSummary> {
        self.queue.peek_summaries()
    }

    pub fn is_flushing(&self) -> bool {
        self.queue.is_flushing()
    }

    pub fn probe(&self) -> &Arc<MaintenanceProbe> {
        &self.probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{BroadcastHarness, sample_drop};
    use async_trait::async_trait;
    use shared::ErrorCode;
    use shared::message::EventType;

    fn stock_event(drop_id: &str, new_stock: u32) -> DropEvent {
        DropEvent::StockChanged {
            drop_id: drop_id.into(),
            variant_id: "v1".into(),
            old_stock: 10,
            new_stock,
        }
    }

    #[tokio::test]
    async fn test_publish_without_maintenance_reaches_both_audiences() {
        let h = BroadcastHarness::new();
        let outcome = h
            .broadcaster
            .publish(stock_event("drop_1", 8), &Actor::customer("c1"))
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Delivered);
        assert_eq!(h.transport.count(Audience::Admin), 1);
        assert_eq!(h.transport.count(Audience::Public), 1);
        assert_eq!(h.broadcaster.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_maintenance_defers_public_for_non_privileged() {
        let h = BroadcastHarness::new();
        h.maintenance.set(true);

        for actor in [Actor::customer("c1"), Actor::anonymous(), Actor::system("scheduler")] {
            let before = h.broadcaster.queue_len();
            let outcome = h
                .broadcaster
                .publish(stock_event("drop_1", 8), &actor)
                .await
                .unwrap();
            assert_eq!(outcome, PublishOutcome::Deferred);
            assert_eq!(h.broadcaster.queue_len(), before + 1);
        }

        assert_eq!(h.transport.count(Audience::Admin), 3);
        assert_eq!(h.transport.count(Audience::Public), 0);
    }

    #[tokio::test]
    async fn test_privileged_actor_bypasses_maintenance() {
        let h = BroadcastHarness::new();
        h.maintenance.set(true);

        let outcome = h
            .broadcaster
            .publish(stock_event("drop_1", 8), &Actor::admin("ops"))
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Delivered);
        assert_eq!(h.transport.count(Audience::Admin), 1);
        assert_eq!(h.transport.count(Audience::Public), 1);
        assert_eq!(h.broadcaster.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_flush_delivers_in_order_and_empties_queue() {
        let h = BroadcastHarness::new();
        h.maintenance.set(true);

        let actor = Actor::customer("c1");
        for stock in [9, 8, 7] {
            h.broadcaster
                .publish(stock_event("drop_1", stock), &actor)
                .await
                .unwrap();
        }
        h.broadcaster
            .publish(DropEvent::progress(&sample_drop("drop_2", 10, 5)), &actor)
            .await
            .unwrap();

        let report = h.broadcaster.flush_queue().await.unwrap();
        assert_eq!(
            report,
            FlushReport {
                flushed: 4,
                delivered: 4,
                failed: 0
            }
        );
        assert_eq!(h.broadcaster.queue_len(), 0);

        let public = h.transport.messages(Audience::Public);
        let stocks: Vec<_> = public
            .iter()
            .filter_map(|m| match m.parse_event().ok()? {
                DropEvent::StockChanged { new_stock, .. } => Some(new_stock),
                _ => None,
            })
            .collect();
        assert_eq!(stocks, vec![9, 8, 7]);
        assert_eq!(public[3].event_type, EventType::ProgressUpdated);

        // 第二次 flush 无事可做
        let report = h.broadcaster.flush_queue().await.unwrap();
        assert_eq!(report.flushed, 0);
    }

    #[tokio::test]
    async fn test_delivery_failures_are_swallowed() {
        let h = BroadcastHarness::new();
        h.transport.set_failing(true);

        let outcome = h
            .broadcaster
            .publish(stock_event("drop_1", 8), &Actor::customer("c1"))
            .await;
        assert_eq!(outcome.unwrap(), PublishOutcome::Delivered);

        h.maintenance.set(true);
        h.broadcaster
            .publish(stock_event("drop_1", 7), &Actor::customer("c1"))
            .await
            .unwrap();
        let report = h.broadcaster.flush_queue().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(h.broadcaster.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_malformed_event_is_rejected() {
        let h = BroadcastHarness::new();
        let err = h
            .broadcaster
            .publish(
                DropEvent::DropUpdated {
                    drop_id: "drop_1".into(),
                    changes: vec![],
                },
                &Actor::admin("ops"),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidEvent);
        assert_eq!(h.transport.count(Audience::Admin), 0);
    }

    #[tokio::test]
    async fn test_versions_increase_per_drop() {
        let h = BroadcastHarness::new();
        let actor = Actor::admin("ops");
        h.broadcaster.publish(stock_event("a", 1), &actor).await.unwrap();
        h.broadcaster.publish(stock_event("a", 2), &actor).await.unwrap();
        h.broadcaster.publish(stock_event("b", 1), &actor).await.unwrap();

        let versions: Vec<_> = h
            .transport
            .messages(Audience::Admin)
            .iter()
            .map(|m| (m.drop_id.clone(), m.version))
            .collect();
        assert_eq!(
            versions,
            vec![("a".into(), 1), ("a".into(), 2), ("b".into(), 1)]
        );
    }

    /// 投递永不返回的 Transport
    struct StuckTransport;

    #[async_trait]
    impl Transport for StuckTransport {
        async fn deliver(&self, _audience: Audience, _msg: &BusMessage) -> AppResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_timeout_does_not_block_publish() {
        let source = Arc::new(crate::broadcast::LocalMaintenanceSource::new(false));
        let probe = Arc::new(MaintenanceProbe::new(
            source,
            Duration::from_secs(5),
            Duration::from_secs(1),
        ));
        let broadcaster = Broadcaster::new(
            Arc::new(StuckTransport),
            probe,
            Arc::new(ResourceVersions::new()),
            Duration::from_millis(500),
        );

        let outcome = broadcaster
            .publish(stock_event("drop_1", 3), &Actor::customer("c1"))
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_concurrent_flush_is_rejected() {
        let h = BroadcastHarness::new();
        let _guard = h.broadcaster.queue.begin_flush();
        let err = h.broadcaster.flush_queue().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::FlushInProgress);
    }
}
