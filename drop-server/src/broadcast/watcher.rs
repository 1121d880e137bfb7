//! 维护状态监视器
//!
//! 注册为 `TaskKind::Periodic`。按探测 TTL 周期读取维护状态，
//! 只要不在维护中且队列非空就自动 flush。按状态而不是按状态变化触发：
//! 与其他 flush 撞车时遗留的事件会在下一个周期被推送。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::broadcaster::{Broadcaster, FlushReport};
use crate::utils::ErrorCode;

pub struct MaintenanceWatcher {
    broadcaster: Arc<Broadcaster>,
    interval: Duration,
    auto_flush: bool,
    last_active: Option<bool>,
}

impl MaintenanceWatcher {
    pub fn new(broadcaster: Arc<Broadcaster>, interval: Duration, auto_flush: bool) -> Self {
        Self {
            broadcaster,
            interval: interval.max(Duration::from_secs(1)),
            auto_flush,
            last_active: None,
        }
    }

    /// 检查一次维护状态，不在维护中且有积压时 flush
    pub async fn check(&mut self) -> Option<FlushReport> {
        let active = self.broadcaster.probe().is_maintenance_active().await;
        let previous = self.last_active.replace(active);

        if previous != Some(active) {
            tracing::info!(
                maintenance = active,
                queue_len = self.broadcaster.queue_len(),
                "Maintenance state changed"
            );
        }

        if active || !self.auto_flush || self.broadcaster.queue_len() == 0 {
            return None;
        }

        match self.broadcaster.flush_queue().await {
            Ok(report) => Some(report),
            Err(e) if e.code == ErrorCode::FlushInProgress => {
                tracing::debug!("Flush already running, skipping automatic flush");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Automatic flush failed");
                None
            }
        }
    }

    /// 主循环
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            auto_flush = self.auto_flush,
            "Maintenance watcher started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.check().await;
                }
            }
        }

        tracing::info!("Maintenance watcher stopped");
    }
}
