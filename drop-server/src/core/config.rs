use std::time::Duration;

/// 倒计时阈值判定方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// 记录每个 drop 最近通知的阈值，延迟/丢失的 tick 不会漏发
    Ratchet,
    /// 仅当剩余分钟数恰好等于阈值时触发 (兼容旧行为)
    Exact,
}

impl ThresholdMode {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "exact" => ThresholdMode::Exact,
            _ => ThresholdMode::Ratchet,
        }
    }
}

/// 服务器配置
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 格式日志 |
/// | LOG_DIR | - | 日志目录 (不设置则只输出到控制台) |
/// | STATS_TTL_SECS | 30 | 统计缓存有效期 |
/// | MAINTENANCE_STATUS_URL | - | 远程维护状态地址 (不设置则使用本地开关) |
/// | MAINTENANCE_PROBE_TTL_SECS | 5 | 维护状态缓存有效期 |
/// | MAINTENANCE_PROBE_TIMEOUT_MS | 2000 | 维护状态探测超时 |
/// | AUTO_FLUSH_ON_MAINTENANCE_END | true | 维护结束时自动推送积压消息 |
/// | CHANNEL_CAPACITY | 1024 | 每个受众广播通道容量 |
/// | DELIVERY_TIMEOUT_MS | 500 | 单次投递超时 |
/// | SCHEDULER_INTERVAL_SECS | 60 | 倒计时调度间隔 |
/// | SCHEDULER_THRESHOLDS | 60,10 | 开售提醒阈值 (分钟) |
/// | SCHEDULER_MODE | ratchet | ratchet / exact |
/// | SCHEDULER_FETCH_TIMEOUT_MS | 5000 | 读取待调度 drop 的超时 |
/// | SCHEDULER_LIVE_GRACE_MINUTES | 5 | 开售通知补发窗口 |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | 关闭超时 |
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,

    /// 统计缓存有效期 (秒)
    pub stats_ttl_secs: u64,

    // === 维护模式 ===
    pub maintenance_status_url: Option<String>,
    pub maintenance_probe_ttl_secs: u64,
    pub maintenance_probe_timeout_ms: u64,
    pub auto_flush_on_maintenance_end: bool,

    // === 广播 ===
    pub channel_capacity: usize,
    pub delivery_timeout_ms: u64,

    // === 倒计时调度 ===
    pub scheduler_interval_secs: u64,
    pub scheduler_thresholds: Vec<i64>,
    pub scheduler_mode: ThresholdMode,
    pub scheduler_fetch_timeout_ms: u64,
    pub scheduler_live_grace_minutes: i64,

    /// 关闭超时时间 (毫秒)
    pub shutdown_timeout_ms: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 解析阈值列表 "60,10" → [60, 10]，忽略非法项和非正数，降序去重
pub fn parse_thresholds(raw: &str) -> Vec<i64> {
    let mut thresholds: Vec<i64> = raw
        .split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .filter(|t| *t > 0)
        .collect();
    thresholds.sort_unstable_by(|a, b| b.cmp(a));
    thresholds.dedup();
    thresholds
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let thresholds = std::env::var("SCHEDULER_THRESHOLDS")
            .map(|raw| parse_thresholds(&raw))
            .ok()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| vec![60, 10]);

        Self {
            http_port: env_or("HTTP_PORT", 3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_or("LOG_JSON", false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),

            stats_ttl_secs: env_or("STATS_TTL_SECS", 30),

            maintenance_status_url: std::env::var("MAINTENANCE_STATUS_URL")
                .ok()
                .filter(|u| !u.is_empty()),
            maintenance_probe_ttl_secs: env_or("MAINTENANCE_PROBE_TTL_SECS", 5),
            maintenance_probe_timeout_ms: env_or("MAINTENANCE_PROBE_TIMEOUT_MS", 2000),
            auto_flush_on_maintenance_end: env_or("AUTO_FLUSH_ON_MAINTENANCE_END", true),

            channel_capacity: env_or("CHANNEL_CAPACITY", 1024),
            delivery_timeout_ms: env_or("DELIVERY_TIMEOUT_MS", 500),

            scheduler_interval_secs: env_or("SCHEDULER_INTERVAL_SECS", 60),
            scheduler_thresholds: thresholds,
            scheduler_mode: ThresholdMode::parse(
                &std::env::var("SCHEDULER_MODE").unwrap_or_default(),
            ),
            scheduler_fetch_timeout_ms: env_or("SCHEDULER_FETCH_TIMEOUT_MS", 5000),
            scheduler_live_grace_minutes: env_or("SCHEDULER_LIVE_GRACE_MINUTES", 5),

            shutdown_timeout_ms: env_or("SHUTDOWN_TIMEOUT_MS", 10000),
        }
    }

    /// 固定默认值的配置，不读取环境变量
    ///
    /// 常用于测试场景
    pub fn defaults() -> Self {
        Self {
            http_port: 3000,
            environment: "development".into(),
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
            stats_ttl_secs: 30,
            maintenance_status_url: None,
            maintenance_probe_ttl_secs: 5,
            maintenance_probe_timeout_ms: 2000,
            auto_flush_on_maintenance_end: true,
            channel_capacity: 1024,
            delivery_timeout_ms: 500,
            scheduler_interval_secs: 60,
            scheduler_thresholds: vec![60, 10],
            scheduler_mode: ThresholdMode::Ratchet,
            scheduler_fetch_timeout_ms: 5000,
            scheduler_live_grace_minutes: 5,
            shutdown_timeout_ms: 10000,
        }
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs)
    }

    pub fn maintenance_probe_ttl(&self) -> Duration {
        Duration::from_secs(self.maintenance_probe_ttl_secs)
    }

    pub fn maintenance_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.maintenance_probe_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs.max(1))
    }

    pub fn scheduler_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduler_fetch_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
