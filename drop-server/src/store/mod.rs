//! Drop 存储抽象
//!
//! 服务只依赖 [`DropStore`] trait；[`MemoryDropStore`] 是进程内实现，
//! 用于开发、测试以及在接入真实数据库之前充当数据源。

mod memory;

pub use memory::MemoryDropStore;

use async_trait::async_trait;
use shared::models::Drop;

use crate::utils::AppResult;

/// 对单个 drop 的原地修改
///
/// 返回错误时修改不会被保存。
pub type DropPatch = Box<dyn FnOnce(&mut Drop) -> AppResult<()> + Send>;

/// Drop 存储 trait
#[async_trait]
pub trait DropStore: Send + Sync {
    /// 所有 drop (按创建顺序)
    async fn list(&self) -> AppResult<Vec<Drop>>;

    async fn get(&self, id: &str) -> AppResult<Option<Drop>>;

    /// 新增 drop，id 冲突时返回错误
    async fn insert(&self, drop: Drop) -> AppResult<Drop>;

    /// 修改 drop，返回 (修改前, 修改后)
    ///
    /// drop 不存在时返回 `DropNotFound`。
    async fn mutate(&self, id: &str, patch: DropPatch) -> AppResult<(Drop, Drop)>;

    /// 删除 drop，返回被删除的实体
    async fn delete(&self, id: &str) -> AppResult<Drop>;

    /// 参与倒计时调度的 drop (已排期且设置了开售时间)
    async fn schedulable_drops(&self) -> AppResult<Vec<Drop>>;
}
