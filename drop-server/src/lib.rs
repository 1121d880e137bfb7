//! Drop Server - 限时发售 (drop) 管理与实时推送服务
//!
//! # 架构概述
//!
//! - **存储** (`store`): drop 持久化抽象 + 内存实现
//! - **服务** (`services`): drop 增删改，每次变更发布领域事件
//! - **广播** (`broadcast`): 事件分发，维护模式下公共推送进入延迟队列
//! - **统计** (`stats`): 单飞 TTL 缓存的销售统计
//! - **批量** (`bulk`): 逐项执行、逐项报告的批量操作
//! - **调度** (`scheduler`): 开售倒计时阈值事件
//! - **HTTP API** (`api`): REST + WebSocket
//!
//! # 模块结构
//!
//! ```text
//! drop-server/src/
//! ├── core/          # 配置、状态、后台任务、服务器
//! ├── auth/          # 调用方身份 (Actor) 和 admin 中间件
//! ├── message/       # admin/public 广播通道
//! ├── broadcast/     # 维护探测、延迟队列、Broadcaster
//! ├── services/      # DropService
//! ├── stats/         # TtlCache + DropStats
//! ├── bulk/          # BulkCoordinator
//! ├── scheduler/     # CountdownScheduler
//! ├── store/         # DropStore trait + MemoryDropStore
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 日志、响应工具
//! ```

pub mod api;
pub mod auth;
pub mod broadcast;
pub mod bulk;
pub mod core;
pub mod message;
pub mod scheduler;
pub mod services;
pub mod stats;
pub mod store;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export 公共类型
pub use auth::{Actor, ActorRole};
pub use broadcast::{Broadcaster, MaintenanceProbe, PublishOutcome};
pub use bulk::{BulkAction, BulkCoordinator, BulkResult};
pub use core::{Config, Server, ServerState};
pub use message::MessageBus;
pub use scheduler::CountdownScheduler;
pub use services::DropService;
pub use stats::{DropStats, StatsService};
pub use store::{DropStore, MemoryDropStore};
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

// Security logging macro - 写入 "security" target，支持 tracing 字段语法 (`?` / `%`)
#[macro_export]
macro_rules! security_log {
    (WARN, $event:expr, $($fields:tt)*) => {
        tracing::warn!(target: "security", event = $event, $($fields)*)
    };
    (ERROR, $event:expr, $($fields:tt)*) => {
        tracing::error!(target: "security", event = $event, $($fields)*)
    };
    (INFO, $event:expr, $($fields:tt)*) => {
        tracing::info!(target: "security", event = $event, $($fields)*)
    };
}

/// 加载 .env、读取配置并初始化日志
///
/// 日志初始化失败时直接返回错误，进程不应在没有日志的情况下启动。
pub fn setup_environment() -> anyhow::Result<Config> {
    // .env 不存在时忽略
    let _ = dotenv::dotenv();

    let config = Config::from_env();
    // 生产环境总是输出 JSON 日志
    let json = config.log_json || config.is_production();
    init_logger_with_file(&config.log_level, json, config.log_dir.as_deref())?;
    Ok(config)
}

pub fn print_banner() {
    println!(
        r#"
    ____
   / __ \_________  ____
  / / / / ___/ __ \/ __ \
 / /_/ / /  / /_/ / /_/ /
/_____/_/   \____/ .___/
                /_/
    "#
    );
}
