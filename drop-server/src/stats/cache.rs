//! 按 key 缓存的 TTL 缓存
//!
//! 每个 key 对应一个独立的异步锁槽位，同一 key 的 "读取 → 计算 → 写回"
//! 是原子的 (并发读者只会触发一次计算)，不同 key 之间互不阻塞。
//!
//! 没有后台淘汰线程：过期条目只在下一次读取时被整体替换。

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// 缓存条目
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    computed_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.computed_at.elapsed() < ttl
    }
}

type Slot<V> = Arc<Mutex<Option<CacheEntry<V>>>>;

/// TTL 缓存
pub struct TtlCache<K, V> {
    slots: DashMap<K, Slot<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    fn slot(&self, key: K) -> Slot<V> {
        // DashMap 的 entry guard 在语句结束时释放，不会跨 await 持有
        self.slots
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// 读取缓存，过期或不存在时调用 `compute` 重新计算
    pub async fn get_or_compute<F, Fut>(&self, key: K, ttl: Duration, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref()
            && entry.is_fresh(ttl)
        {
            return entry.value.clone();
        }

        let value = compute().await;
        *guard = Some(CacheEntry {
            value: value.clone(),
            computed_at: Instant::now(),
        });
        value
    }

    /// 同 [`get_or_compute`](Self::get_or_compute)，但计算可能失败
    ///
    /// 失败不会写入缓存，旧条目 (如果有) 保持不变。
    pub async fn try_get_or_compute<F, Fut, E>(
        &self,
        key: K,
        ttl: Duration,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref()
            && entry.is_fresh(ttl)
        {
            return Ok(entry.value.clone());
        }

        let value = compute().await?;
        *guard = Some(CacheEntry {
            value: value.clone(),
            computed_at: Instant::now(),
        });
        Ok(value)
    }

    /// 使单个 key 失效，下一次读取必定重新计算
    pub fn invalidate(&self, key: &K) {
        self.slots.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.slots.clear();
    }

    /// 槽位数量 (包括已过期但尚未替换的条目)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
