//! 维护模式探测
//!
//! [`MaintenanceProbe`] 缓存维护状态 `probe_ttl` 时长；过期后向
//! [`MaintenanceSource`] 重新查询。查询失败或超时时沿用上一次的值，
//! 从未成功过则视为未维护 (fail-open)，永远不向调用方抛错。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared::util::now_millis;
use tokio::time::Instant;

use crate::utils::{AppError, AppResult, ErrorCode};

/// 维护状态来源
#[async_trait]
pub trait MaintenanceSource: Send + Sync {
    async fn fetch(&self) -> AppResult<bool>;

    /// 来源名称 (日志用)
    fn name(&self) -> &'static str;
}

/// 进程内维护开关，由运营 API 切换
#[derive(Debug, Default)]
pub struct LocalMaintenanceSource {
    active: AtomicBool,
}

impl LocalMaintenanceSource {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
        }
    }

    /// 设置开关，返回之前的值
    pub fn set(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::SeqCst)
    }

    pub fn get(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MaintenanceSource for LocalMaintenanceSource {
    async fn fetch(&self) -> AppResult<bool> {
        Ok(self.get())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteStatus {
    is_active: bool,
}

/// 远程维护状态：`GET <url>` → `{"isActive": bool}`
#[derive(Debug, Clone)]
pub struct HttpMaintenanceSource {
    client: reqwest::Client,
    url: String,
}

impl HttpMaintenanceSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MaintenanceSource for HttpMaintenanceSource {
    async fn fetch(&self) -> AppResult<bool> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::network(format!("Maintenance status request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::with_message(
                ErrorCode::MaintenanceProbeFailed,
                format!("Maintenance status endpoint returned {}", response.status()),
            )
            .with_detail("url", self.url.clone()));
        }

        let status: RemoteStatus = response.json().await.map_err(|e| {
            AppError::with_message(
                ErrorCode::MaintenanceProbeFailed,
                format!("Invalid maintenance status body: {}", e),
            )
            .with_detail("url", self.url.clone())
        })?;
        Ok(status.is_active)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// 维护状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaintenanceStatus {
    pub is_active: bool,
    /// 最近一次探测时间 (Unix millis)
    pub last_checked: i64,
}

#[derive(Debug, Clone, Copy)]
struct CachedStatus {
    is_active: bool,
    /// 最近一次成功获取的值是否存在
    known: bool,
    checked_at: Instant,
    checked_at_millis: i64,
}

/// 维护状态探测器
pub struct MaintenanceProbe {
    source: Arc<dyn MaintenanceSource>,
    ttl: Duration,
    timeout: Duration,
    cached: Mutex<Option<CachedStatus>>,
    /// 串行化对来源的查询，每个 TTL 窗口最多一次
    refresh: tokio::sync::Mutex<()>,
    /// 每次 invalidate 递增；查询期间被 invalidate 的结果不写入缓存
    epoch: AtomicU64,
}

impl MaintenanceProbe {
    pub fn new(source: Arc<dyn MaintenanceSource>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            source,
            ttl,
            timeout,
            cached: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    /// 当前是否处于维护模式
    ///
    /// TTL 窗口内直接返回缓存值；失败的探测同样占用一个窗口，
    /// 来源不可用时每个窗口最多查询一次。
    pub async fn is_maintenance_active(&self) -> bool {
        if let Some(active) = self.fresh_value() {
            return active;
        }

        let _refresh = self.refresh.lock().await;
        // 等锁期间其他调用可能已经刷新
        if let Some(active) = self.fresh_value() {
            return active;
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let fetched = match tokio::time::timeout(self.timeout, self.source.fetch()).await {
            Ok(Ok(active)) => Some(active),
            Ok(Err(e)) => {
                tracing::warn!(
                    source = self.source.name(),
                    error = %e,
                    "Maintenance status probe failed, keeping last known value"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    source = self.source.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Maintenance status probe timed out, keeping last known value"
                );
                None
            }
        };

        let mut cached = self.cached.lock();
        let previous = *cached;
        let (is_active, known) = match (fetched, previous) {
            (Some(active), _) => (active, true),
            (None, Some(prev)) => (prev.is_active, prev.known),
            (None, None) => (false, false),
        };

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(
                source = self.source.name(),
                "Maintenance status invalidated during probe, result not cached"
            );
            return is_active;
        }

        *cached = Some(CachedStatus {
            is_active,
            known,
            checked_at: Instant::now(),
            checked_at_millis: now_millis(),
        });
        is_active
    }

    fn fresh_value(&self) -> Option<bool> {
        let snapshot = *self.cached.lock();
        snapshot
            .filter(|c| c.checked_at.elapsed() < self.ttl)
            .map(|c| c.is_active)
    }

    /// 清除缓存，下一次调用必定重新探测
    pub fn invalidate(&self) {
        let mut cached = self.cached.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *cached = None;
    }

    /// 最近一次探测的结果 (不触发探测)
    pub fn last_known(&self) -> Option<MaintenanceStatus> {
        self.cached.lock().map(|c| MaintenanceStatus {
            is_active: c.is_active,
            last_checked: c.checked_at_millis,
        })
    }

    /// 来源是否至少成功应答过一次
    pub fn has_known_value(&self) -> bool {
        self.cached.lock().map(|c| c.known).unwrap_or(false)
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }
}
