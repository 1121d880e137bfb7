//! 开售倒计时调度器
//!
//! 每个 tick 读取所有已排期的 drop，计算距离开售的分钟数
//! `diff = round((starts_at - now) / 60s)`，与阈值 (默认 60、10 分钟) 比较后
//! 发出 `starting_soon` / `drop_live`。
//!
//! # 判定方式
//!
//! - [`ThresholdMode::Ratchet`] (默认)：记录每个 drop 最近通知过的阈值。
//!   tick 延迟或丢失时仍会补发 (例如从 65 分钟直接跳到 9 分钟，发出一次
//!   `starting_soon{9}`)，同一阈值不会重复通知。开售时间变更后状态重置。
//! - [`ThresholdMode::Exact`]：只在 `diff` 恰好等于阈值时触发，无状态。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use shared::message::DropEvent;
use shared::models::Drop;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::Actor;
use crate::broadcast::Broadcaster;
use crate::core::Config;
use crate::core::config::ThresholdMode;
use crate::store::DropStore;

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// 阈值 (分钟)，降序
    pub thresholds: Vec<i64>,
    pub mode: ThresholdMode,
    pub fetch_timeout: Duration,
    /// 开售后多少分钟内仍补发 `drop_live`
    pub live_grace_minutes: i64,
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.scheduler_interval(),
            thresholds: config.scheduler_thresholds.clone(),
            mode: config.scheduler_mode,
            fetch_timeout: config.scheduler_fetch_timeout(),
            live_grace_minutes: config.scheduler_live_grace_minutes,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            thresholds: vec![60, 10],
            mode: ThresholdMode::Ratchet,
            fetch_timeout: Duration::from_secs(5),
            live_grace_minutes: 5,
        }
    }
}

/// 单个 drop 的通知进度 (Ratchet 模式)
#[derive(Debug, Clone, Copy)]
struct NotifyState {
    target: i64,
    last_threshold: Option<i64>,
    live_sent: bool,
}

impl NotifyState {
    fn new(target: i64) -> Self {
        Self {
            target,
            last_threshold: None,
            live_sent: false,
        }
    }
}

/// 距离目标时间的分钟数 (四舍五入)
///
/// 极端时间戳按饱和减法处理，不会溢出。
pub fn minutes_until(target: i64, now: i64) -> i64 {
    (target.saturating_sub(now) as f64 / MILLIS_PER_MINUTE).round() as i64
}

pub struct CountdownScheduler {
    store: Arc<dyn DropStore>,
    broadcaster: Arc<Broadcaster>,
    config: SchedulerConfig,
    actor: Actor,
    states: DashMap<String, NotifyState>,
}

impl CountdownScheduler {
    pub fn new(
        store: Arc<dyn DropStore>,
        broadcaster: Arc<Broadcaster>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            config,
            actor: Actor::system("countdown_scheduler"),
            states: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 以当前时间执行一次 tick
    pub async fn tick(&self) -> Vec<DropEvent> {
        self.tick_at(shared::util::now_millis()).await
    }

    /// 以指定时间执行一次 tick，返回本次发出的事件
    ///
    /// 读取 drop 失败或超时时跳过本次 tick。
    pub async fn tick_at(&self, now: i64) -> Vec<DropEvent> {
        let drops =
            match tokio::time::timeout(self.config.fetch_timeout, self.store.schedulable_drops())
                .await
            {
                Ok(Ok(drops)) => drops,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Failed to load schedulable drops, skipping tick");
                    return Vec::new();
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.config.fetch_timeout.as_millis() as u64,
                        "Loading schedulable drops timed out, skipping tick"
                    );
                    return Vec::new();
                }
            };

        let events = self.evaluate(&drops, now);
        for event in &events {
            tracing::info!(
                drop_id = %event.drop_id(),
                event_type = %event.event_type(),
                "Countdown notification"
            );
            if let Err(e) = self.broadcaster.publish(event.clone(), &self.actor).await {
                tracing::error!(
                    drop_id = %event.drop_id(),
                    error = %e,
                    "Failed to publish countdown event"
                );
            }
        }
        events
    }

    fn evaluate(&self, drops: &[Drop], now: i64) -> Vec<DropEvent> {
        // 不再排期的 drop 清除状态
        let current: HashSet<&str> = drops.iter().map(|d| d.id.as_str()).collect();
        self.states.retain(|id, _| current.contains(id.as_str()));

        let mut events = Vec::new();
        for drop in drops {
            let Some(target) = drop.starts_at else {
                continue;
            };
            let diff = minutes_until(target, now);
            let event = match self.config.mode {
                ThresholdMode::Ratchet => self.evaluate_ratchet(&drop.id, target, diff),
                ThresholdMode::Exact => self.evaluate_exact(&drop.id, diff),
            };
            events.extend(event);
        }
        events
    }

    fn evaluate_ratchet(&self, drop_id: &str, target: i64, diff: i64) -> Option<DropEvent> {
        let mut state = self
            .states
            .entry(drop_id.to_string())
            .or_insert_with(|| NotifyState::new(target));
        if state.target != target {
            *state = NotifyState::new(target);
        }

        if diff <= 0 {
            if state.live_sent {
                return None;
            }
            state.live_sent = true;
            if -diff > self.config.live_grace_minutes {
                tracing::debug!(drop_id = %drop_id, minutes_late = -diff, "Live notification window missed");
                return None;
            }
            return Some(DropEvent::DropLive {
                drop_id: drop_id.to_string(),
            });
        }

        let threshold = self
            .config
            .thresholds
            .iter()
            .copied()
            .filter(|t| diff <= *t)
            .min()?;
        if state.last_threshold.is_some_and(|last| last <= threshold) {
            return None;
        }
        state.last_threshold = Some(threshold);
        Some(DropEvent::StartingSoon {
            drop_id: drop_id.to_string(),
            in_minutes: diff,
        })
    }

    fn evaluate_exact(&self, drop_id: &str, diff: i64) -> Option<DropEvent> {
        if diff == 0 {
            return Some(DropEvent::DropLive {
                drop_id: drop_id.to_string(),
            });
        }
        self.config
            .thresholds
            .contains(&diff)
            .then(|| DropEvent::StartingSoon {
                drop_id: drop_id.to_string(),
                in_minutes: diff,
            })
    }

    /// 主循环，直到 `shutdown` 被取消
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            thresholds = ?self.config.thresholds,
            mode = ?self.config.mode,
            "Countdown scheduler started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Countdown scheduler stopped");
    }

    /// 独立启动 (不经由 BackgroundTasks)
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let token = CancellationToken::new();
        let join = tokio::spawn(self.run(token.clone()));
        SchedulerHandle { token, join }
    }
}

/// 已启动调度器的句柄
pub struct SchedulerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// 停止调度器并等待当前 tick 结束
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(error = ?e, "Countdown scheduler task failed");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }
}
