//! 实时广播层
//!
//! - [`Broadcaster`] - 事件发布 (admin 立即 / public 视维护状态)
//! - [`DeferredQueue`] - 维护期间的延迟投递队列
//! - [`MaintenanceProbe`] - 带 TTL 缓存的维护状态探测 (fail-open)
//! - [`MaintenanceWatcher`] - 维护结束后自动 flush

pub mod broadcaster;
pub mod maintenance;
pub mod queue;
pub mod watcher;

pub use broadcaster::{Broadcaster, FlushReport, PublishOutcome};
pub use maintenance::{
    HttpMaintenanceSource, LocalMaintenanceSource, MaintenanceProbe, MaintenanceSource,
    MaintenanceStatus,
};
pub use queue::{DeferredQueue, QueuedSummary, QueuedUpdate};
pub use watcher::MaintenanceWatcher;
