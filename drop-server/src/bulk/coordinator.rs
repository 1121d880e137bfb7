//! 批量操作协调器
//!
//! 对一组 drop 依次执行同一个操作。每个 id 都走普通的单实体路径
//! (修改 + 缓存失效 + 广播)，单个失败只记入结果，不中断整个批次。

use serde::{Deserialize, Serialize};
use shared::models::{AccessTier, DropStatus};

use crate::auth::Actor;
use crate::services::DropService;
use crate::utils::{AppError, AppResult};

/// 单次批量请求允许的最大 id 数
pub const MAX_BULK_IDS: usize = 500;

/// 批量操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum BulkAction {
    ResetStats,
    ChangeStatus { status: DropStatus },
    ChangeAccessTier { access_tier: AccessTier },
    Delete,
}

impl BulkAction {
    pub fn name(&self) -> &'static str {
        match self {
            BulkAction::ResetStats => "reset_stats",
            BulkAction::ChangeStatus { .. } => "change_status",
            BulkAction::ChangeAccessTier { .. } => "change_access_tier",
            BulkAction::Delete => "delete",
        }
    }
}

/// 单个失败项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub id: String,
    pub reason: String,
}

/// 批量结果
///
/// `success_ids.len() + failed.len()` 等于去重后的请求 id 数。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResult {
    pub success_ids: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

impl BulkResult {
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed",
            self.success_ids.len(),
            self.failed.len()
        )
    }
}

pub struct BulkCoordinator {
    drops: DropService,
}

impl BulkCoordinator {
    pub fn new(drops: DropService) -> Self {
        Self { drops }
    }

    /// 执行批量操作
    ///
    /// 只有请求本身不合法 (空列表、超出上限) 时返回错误。
    /// 重复 id 只处理第一次出现，顺序保持不变。
    pub async fn apply_bulk(
        &self,
        action: &BulkAction,
        ids: &[String],
        actor: &Actor,
    ) -> AppResult<BulkResult> {
        if ids.is_empty() {
            return Err(AppError::required_field("ids"));
        }
        if ids.len() > MAX_BULK_IDS {
            return Err(AppError::with_message(
                shared::ErrorCode::ValueOutOfRange,
                format!("At most {} ids per bulk request", MAX_BULK_IDS),
            )
            .with_detail("count", ids.len()));
        }

        let mut seen = std::collections::HashSet::new();
        let mut result = BulkResult::default();

        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.apply_one(action, id, actor).await {
                Ok(()) => result.success_ids.push(id.clone()),
                Err(e) => {
                    tracing::warn!(
                        drop_id = %id,
                        action = action.name(),
                        error = %e,
                        "Bulk item failed"
                    );
                    result.failed.push(BulkFailure {
                        id: id.clone(),
                        reason: e.message,
                    });
                }
            }
        }

        tracing::info!(
            action = action.name(),
            actor_id = ?actor.id,
            succeeded = result.success_ids.len(),
            failed = result.failed.len(),
            "Bulk operation finished"
        );
        Ok(result)
    }

    async fn apply_one(&self, action: &BulkAction, id: &str, actor: &Actor) -> AppResult<()> {
        match action {
            BulkAction::ResetStats => self.drops.reset_stats(id, actor).await.map(|_| ()),
            BulkAction::ChangeStatus { status } => self
                .drops
                .change_status(id, *status, actor)
                .await
                .map(|_| ()),
            BulkAction::ChangeAccessTier { access_tier } => self
                .drops
                .change_access_tier(id, *access_tier, actor)
                .await
                .map(|_| ()),
            BulkAction::Delete => self.drops.delete(id, actor).await.map(|_| ()),
        }
    }
}
