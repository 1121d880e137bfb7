//! 派生统计与 TTL 缓存

pub mod cache;
pub mod drop_stats;

pub use cache::TtlCache;
pub use drop_stats::{DropStats, StatsService};
