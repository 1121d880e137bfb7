use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::broadcast::{
    Broadcaster, FlushReport, HttpMaintenanceSource, LocalMaintenanceSource, MaintenanceProbe,
    MaintenanceSource, MaintenanceWatcher,
};
use crate::bulk::BulkCoordinator;
use crate::core::Config;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::message::MessageBus;
use crate::scheduler::{CountdownScheduler, SchedulerConfig};
use crate::services::DropService;
use crate::stats::StatsService;
use crate::store::{DropStore, MemoryDropStore};
use crate::utils::{AppError, AppResult, ErrorCode};

/// 资源版本管理器
///
/// 使用 DashMap 实现无锁并发的版本号管理。
/// 每个 drop 维护独立的版本号，随每条广播消息递增，
/// 客户端据此判断是否漏收了消息。
#[derive(Debug)]
pub struct ResourceVersions {
    versions: DashMap<String, u64>,
}

impl ResourceVersions {
    pub fn new() -> Self {
        Self {
            versions: DashMap::new(),
        }
    }

    /// 递增指定资源的版本号并返回新值
    ///
    /// 如果资源不存在，从 0 开始递增（返回 1）
    pub fn increment(&self, resource: &str) -> u64 {
        let mut entry = self.versions.entry(resource.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// 获取指定资源的当前版本号，不存在返回 0
    pub fn get(&self, resource: &str) -> u64 {
        self.versions.get(resource).map(|v| *v).unwrap_or(0)
    }
}

impl Default for ResourceVersions {
    fn default() -> Self {
        Self::new()
    }
}

/// 切换维护模式的结果
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceToggle {
    pub is_active: bool,
    pub was_active: bool,
    /// 关闭维护时自动 flush 的结果
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush: Option<FlushReport>,
}

/// 服务器状态 - 持有所有服务的共享引用
///
/// 组合根：所有组件在这里构造一次，通过 `Arc` 交给处理器和后台任务。
/// Clone 只复制引用。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | store | Drop 存储 |
/// | stats | 统计服务 (TTL 缓存) |
/// | message_bus | admin/public 广播通道 |
/// | broadcaster | 事件广播器 (持有延迟队列) |
/// | drops | Drop 业务服务 |
/// | bulk | 批量操作协调器 |
/// | scheduler | 倒计时调度器 |
/// | local_maintenance | 本地维护开关 (使用远程来源时为 None) |
/// | resource_versions | 资源版本 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub store: Arc<dyn DropStore>,
    pub stats: Arc<StatsService>,
    pub message_bus: MessageBus,
    pub broadcaster: Arc<Broadcaster>,
    pub drops: DropService,
    pub bulk: Arc<BulkCoordinator>,
    pub scheduler: Arc<CountdownScheduler>,
    pub local_maintenance: Option<Arc<LocalMaintenanceSource>>,
    pub resource_versions: Arc<ResourceVersions>,
}

impl ServerState {
    /// 使用内存存储初始化
    pub fn initialize(config: &Config) -> AppResult<Self> {
        Self::with_store(config, Arc::new(MemoryDropStore::new()))
    }

    /// 使用指定存储初始化
    pub fn with_store(config: &Config, store: Arc<dyn DropStore>) -> AppResult<Self> {
        let (source, local_maintenance): (Arc<dyn MaintenanceSource>, _) =
            match &config.maintenance_status_url {
                Some(url) => {
                    tracing::info!(url = %url, "Using remote maintenance status");
                    let source =
                        HttpMaintenanceSource::new(url.clone(), config.maintenance_probe_timeout())?;
                    (Arc::new(source), None)
                }
                None => {
                    let local = Arc::new(LocalMaintenanceSource::new(false));
                    (local.clone(), Some(local))
                }
            };

        let probe = Arc::new(MaintenanceProbe::new(
            source,
            config.maintenance_probe_ttl(),
            config.maintenance_probe_timeout(),
        ));

        let message_bus = MessageBus::with_capacity(config.channel_capacity);
        let resource_versions = Arc::new(ResourceVersions::new());
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::new(message_bus.clone()),
            probe,
            resource_versions.clone(),
            config.delivery_timeout(),
        ));

        let stats = Arc::new(StatsService::new(store.clone(), config.stats_ttl()));
        let drops = DropService::new(store.clone(), stats.clone(), broadcaster.clone());
        let bulk = Arc::new(BulkCoordinator::new(drops.clone()));
        let scheduler = Arc::new(CountdownScheduler::new(
            store.clone(),
            broadcaster.clone(),
            SchedulerConfig::from_config(config),
        ));

        Ok(Self {
            config: config.clone(),
            store,
            stats,
            message_bus,
            broadcaster,
            drops,
            bulk,
            scheduler,
            local_maintenance,
            resource_versions,
        })
    }

    /// 注册并启动后台任务
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let scheduler = self.scheduler.clone();
        tasks.spawn("countdown_scheduler", TaskKind::Periodic, move |token| {
            scheduler.run(token)
        });

        let watcher = MaintenanceWatcher::new(
            self.broadcaster.clone(),
            self.config.maintenance_probe_ttl(),
            self.config.auto_flush_on_maintenance_end,
        );
        tasks.spawn("maintenance_watcher", TaskKind::Periodic, move |token| {
            watcher.run(token)
        });

        tasks.log_summary();
        tasks
    }

    /// 切换本地维护开关
    ///
    /// 关闭维护且开启了自动 flush 时立即推送积压消息。
    /// 使用远程维护来源时返回错误。
    pub async fn set_maintenance(&self, active: bool) -> AppResult<MaintenanceToggle> {
        let local = self.local_maintenance.as_ref().ok_or_else(|| {
            AppError::invalid_request("Maintenance state is managed by a remote status endpoint")
        })?;

        let was_active = local.set(active);
        self.broadcaster.probe().invalidate();
        let is_active = self.broadcaster.probe().is_maintenance_active().await;

        tracing::info!(
            was_active,
            is_active,
            queue_len = self.broadcaster.queue_len(),
            "Maintenance mode toggled"
        );

        let flush = if was_active
            && !is_active
            && self.config.auto_flush_on_maintenance_end
            && self.broadcaster.queue_len() > 0
        {
            match self.broadcaster.flush_queue().await {
                Ok(report) => Some(report),
                // 撞车时遗留的事件由 MaintenanceWatcher 下一个周期推送
                Err(e) if e.code == ErrorCode::FlushInProgress => None,
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        Ok(MaintenanceToggle {
            is_active,
            was_active,
            flush,
        })
    }
}
