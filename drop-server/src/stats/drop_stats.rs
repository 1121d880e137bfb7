use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared::models::Drop;

use super::cache::TtlCache;
use crate::store::DropStore;
use crate::utils::{AppError, AppResult};

/// Drop 统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropStats {
    pub drop_id: String,
    pub total_stock: u64,
    pub total_sold: u64,
    /// 剩余库存 (不小于 0)
    pub remaining: u64,
    /// 售出百分比 (0 ~ 100)
    pub sold_percent: f64,
    pub variant_count: usize,
    /// 销量超过库存
    pub oversold: bool,
}

impl DropStats {
    pub fn compute(drop: &Drop) -> Self {
        let total_stock = drop.total_stock();
        let total_sold = drop.total_sold();
        let sold_percent = if total_stock == 0 {
            0.0
        } else {
            (total_sold as f64 / total_stock as f64 * 100.0).min(100.0)
        };

        Self {
            drop_id: drop.id.clone(),
            total_stock,
            total_sold,
            remaining: total_stock.saturating_sub(total_sold),
            sold_percent,
            variant_count: drop.variants.len(),
            oversold: drop.variants.iter().any(|v| v.sold > v.stock),
        }
    }
}

/// 统计服务
///
/// 结果按 drop 缓存 `ttl` 时长；drop 发生修改时由 `DropService` 调用
/// [`invalidate`](Self::invalidate)。
pub struct StatsService {
    store: Arc<dyn DropStore>,
    cache: TtlCache<String, DropStats>,
    ttl: Duration,
}

impl StatsService {
    pub fn new(store: Arc<dyn DropStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(),
            ttl,
        }
    }

    pub async fn get(&self, drop_id: &str) -> AppResult<DropStats> {
        let store = self.store.clone();
        let id = drop_id.to_string();
        self.cache
            .try_get_or_compute(drop_id.to_string(), self.ttl, || async move {
                let drop = store
                    .get(&id)
                    .await?
                    .ok_or_else(|| AppError::drop_not_found(&id))?;
                tracing::debug!(drop_id = %id, "Drop stats recomputed");
                Ok(DropStats::compute(&drop))
            })
            .await
    }

    pub fn invalidate(&self, drop_id: &str) {
        self.cache.invalidate(&drop_id.to_string());
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDropStore;
    use crate::test_support::sample_drop;
    use shared::ErrorCode;

    #[test]
    fn test_compute_clamps_oversold() {
        let drop = sample_drop("drop_1", 10, 12);
        let stats = DropStats::compute(&drop);
        assert_eq!(stats.remaining, 0);
        assert_eq!(stats.total_sold, 12);
        assert_eq!(stats.sold_percent, 100.0);
        assert!(stats.oversold);

        let empty = sample_drop("drop_2", 0, 0);
        assert_eq!(DropStats::compute(&empty).sold_percent, 0.0);
    }

    async fn record_sales(store: &MemoryDropStore, quantity: u32) {
        store
            .mutate(
                "drop_1",
                Box::new(move |d| {
                    d.variants[0].sold += quantity;
                    Ok(())
                }),
            )
            .await
            .unwrap();
    }

    /// t=0 → 40，t=10s (期间售出 5) → 仍为 40，t=31s → 45
    #[tokio::test(start_paused = true)]
    async fn test_cached_stats_timeline() {
        let store = Arc::new(MemoryDropStore::with_drops(vec![sample_drop("drop_1", 100, 40)]));
        let stats = StatsService::new(store.clone(), Duration::from_secs(30));

        assert_eq!(stats.get("drop_1").await.unwrap().total_sold, 40);

        record_sales(&store, 5).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(stats.get("drop_1").await.unwrap().total_sold, 40);

        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(stats.get("drop_1").await.unwrap().total_sold, 45);
    }

    #[tokio::test]
    async fn test_invalidate_recomputes() {
        let store = Arc::new(MemoryDropStore::with_drops(vec![sample_drop("drop_1", 100, 40)]));
        let stats = StatsService::new(store.clone(), Duration::from_secs(30));
        stats.get("drop_1").await.unwrap();

        record_sales(&store, 5).await;
        stats.invalidate("drop_1");
        assert_eq!(stats.get("drop_1").await.unwrap().total_sold, 45);
    }

    #[tokio::test]
    async fn test_missing_drop_is_not_cached() {
        let store = Arc::new(MemoryDropStore::new());
        let stats = StatsService::new(store.clone(), Duration::from_secs(30));

        let err = stats.get("drop_1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DropNotFound);

        store.insert(sample_drop("drop_1", 10, 1)).await.unwrap();
        assert_eq!(stats.get("drop_1").await.unwrap().total_sold, 1);
    }
}
