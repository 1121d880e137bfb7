//! 批量操作

pub mod coordinator;

pub use coordinator::{BulkAction, BulkCoordinator, BulkFailure, BulkResult, MAX_BULK_IDS};
