use async_trait::async_trait;
use parking_lot::RwLock;
use shared::models::Drop;
use shared::util::now_millis;

use super::{DropPatch, DropStore};
use crate::utils::{AppError, AppResult};

/// 内存 Drop 存储
#[derive(Debug, Default)]
pub struct MemoryDropStore {
    drops: RwLock<Vec<Drop>>,
}

impl MemoryDropStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用初始数据创建
    pub fn with_drops(drops: Vec<Drop>) -> Self {
        Self {
            drops: RwLock::new(drops),
        }
    }

    pub fn len(&self) -> usize {
        self.drops.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.drops.read().is_empty()
    }
}

#[async_trait]
impl DropStore for MemoryDropStore {
    async fn list(&self) -> AppResult<Vec<Drop>> {
        Ok(self.drops.read().clone())
    }

    async fn get(&self, id: &str) -> AppResult<Option<Drop>> {
        Ok(self.drops.read().iter().find(|d| d.id == id).cloned())
    }

    async fn insert(&self, drop: Drop) -> AppResult<Drop> {
        let mut drops = self.drops.write();
        if drops.iter().any(|d| d.id == drop.id) {
            return Err(AppError::conflict(format!("Drop {} already exists", drop.id)));
        }
        drops.push(drop.clone());
        Ok(drop)
    }

    async fn mutate(&self, id: &str, patch: DropPatch) -> AppResult<(Drop, Drop)> {
        let mut drops = self.drops.write();
        let slot = drops
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::drop_not_found(id))?;

        let before = slot.clone();
        let mut after = slot.clone();
        patch(&mut after)?;
        after.id = before.id.clone();
        after.updated_at = now_millis().max(before.updated_at);
        *slot = after.clone();

        Ok((before, after))
    }

    async fn delete(&self, id: &str) -> AppResult<Drop> {
        let mut drops = self.drops.write();
        let index = drops
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| AppError::drop_not_found(id))?;
        Ok(drops.remove(index))
    }

    async fn schedulable_drops(&self) -> AppResult<Vec<Drop>> {
        Ok(self
            .drops
            .read()
            .iter()
            .filter(|d| d.is_schedulable())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_drop;
    use shared::ErrorCode;
    use shared::models::DropStatus;

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryDropStore::new();
        store.insert(sample_drop("drop_1", 10, 0)).await.unwrap();

        assert!(store.get("drop_1").await.unwrap().is_some());
        assert!(store.get("drop_2").await.unwrap().is_none());

        let err = store.insert(sample_drop("drop_1", 5, 0)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyExists);
    }

    #[tokio::test]
    async fn test_failed_patch_is_not_saved() {
        let store = MemoryDropStore::with_drops(vec![sample_drop("drop_1", 10, 0)]);

        let result = store
            .mutate(
                "drop_1",
                Box::new(|d| {
                    d.name = "changed".into();
                    Err(AppError::validation("rejected"))
                }),
            )
            .await;
        assert!(result.is_err());

        let drop = store.get("drop_1").await.unwrap().unwrap();
        assert_ne!(drop.name, "changed");
    }

    #[tokio::test]
    async fn test_mutate_returns_before_and_after() {
        let store = MemoryDropStore::with_drops(vec![sample_drop("drop_1", 10, 0)]);
        let (before, after) = store
            .mutate(
                "drop_1",
                Box::new(|d| {
                    d.status = DropStatus::Live;
                    Ok(())
                }),
            )
            .await
            .unwrap();

        assert_eq!(before.status, DropStatus::Scheduled);
        assert_eq!(after.status, DropStatus::Live);

        let err = store
            .mutate("missing", Box::new(|_| Ok(())))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DropNotFound);
    }

    #[tokio::test]
    async fn test_schedulable_filter_and_delete() {
        let mut draft = sample_drop("drop_2", 5, 0);
        draft.status = DropStatus::Draft;
        let store = MemoryDropStore::with_drops(vec![sample_drop("drop_1", 10, 0), draft]);

        let schedulable = store.schedulable_drops().await.unwrap();
        assert_eq!(schedulable.len(), 1);
        assert_eq!(schedulable[0].id, "drop_1");

        store.delete("drop_1").await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.delete("drop_1").await.is_err());
    }
}
