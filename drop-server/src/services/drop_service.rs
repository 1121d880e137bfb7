//! Drop 业务服务
//!
//! 所有单实体修改都走这里：存储修改 → 统计缓存失效 → 广播事件。
//! 修改一旦写入，广播阶段的任何错误只记录日志，不会让请求失败。

use std::sync::Arc;

use serde_json::Value;
use shared::message::{DropEvent, FieldChange};
use shared::models::{
    AccessTier, Drop, DropCreate, DropStatus, DropUpdate, Variant, VariantCreate,
};
use shared::util::{now_millis, prefixed_id};

use crate::auth::Actor;
use crate::broadcast::Broadcaster;
use crate::stats::StatsService;
use crate::store::DropStore;
use crate::utils::{AppError, AppResult};

#[derive(Clone)]
pub struct DropService {
    store: Arc<dyn DropStore>,
    stats: Arc<StatsService>,
    broadcaster: Arc<Broadcaster>,
}

impl DropService {
    pub fn new(
        store: Arc<dyn DropStore>,
        stats: Arc<StatsService>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            store,
            stats,
            broadcaster,
        }
    }

    pub async fn list(&self) -> AppResult<Vec<Drop>> {
        self.store.list().await
    }

    pub async fn get(&self, id: &str) -> AppResult<Drop> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::drop_not_found(id))
    }

    pub async fn create(&self, payload: DropCreate, actor: &Actor) -> AppResult<Drop> {
        let name = payload.name.trim();
        if name.is_empty() {
            return Err(AppError::required_field("name"));
        }
        validate_starts_at(payload.starts_at)?;
        let status = payload.status.unwrap_or_default();
        if status == DropStatus::Scheduled && payload.starts_at.is_none() {
            return Err(AppError::required_field("starts_at"));
        }

        let variants = payload
            .variants
            .into_iter()
            .map(build_variant)
            .collect::<AppResult<Vec<_>>>()?;

        let now = now_millis();
        let drop = Drop {
            id: prefixed_id("drop"),
            name: name.to_string(),
            description: payload.description,
            status,
            access_tier: payload.access_tier.unwrap_or_default(),
            starts_at: payload.starts_at,
            variants,
            created_at: now,
            updated_at: now,
        };

        let drop = self.store.insert(drop).await?;
        tracing::info!(drop_id = %drop.id, name = %drop.name, "Drop created");

        self.announce(
            &drop.id,
            vec![DropEvent::DropCreated { drop: drop.clone() }],
            actor,
        )
        .await;
        Ok(drop)
    }

    /// 部分更新；没有实际变化时不广播
    pub async fn update(&self, id: &str, payload: DropUpdate, actor: &Actor) -> AppResult<Drop> {
        if payload.is_empty() {
            return Err(AppError::validation("Update payload contains no fields"));
        }
        if let Some(name) = &payload.name
            && name.trim().is_empty()
        {
            return Err(AppError::required_field("name"));
        }
        validate_starts_at(payload.starts_at)?;

        let (before, after) = self
            .store
            .mutate(
                id,
                Box::new(move |drop| {
                    apply_update(drop, payload);
                    if drop.status == DropStatus::Scheduled && drop.starts_at.is_none() {
                        return Err(AppError::required_field("starts_at"));
                    }
                    Ok(())
                }),
            )
            .await?;

        let changes = diff_fields(&before, &after);
        if changes.is_empty() {
            return Ok(after);
        }

        let mut events = vec![DropEvent::DropUpdated {
            drop_id: after.id.clone(),
            changes,
        }];
        if before.status != after.status {
            tracing::info!(
                drop_id = %after.id,
                from = %before.status,
                to = %after.status,
                "Drop status changed"
            );
            events.push(DropEvent::StatusChanged {
                drop_id: after.id.clone(),
                old_status: before.status,
                new_status: after.status,
            });
        }

        self.announce(&after.id, events, actor).await;
        Ok(after)
    }

    pub async fn change_status(
        &self,
        id: &str,
        status: DropStatus,
        actor: &Actor,
    ) -> AppResult<Drop> {
        let payload = DropUpdate {
            status: Some(status),
            ..Default::default()
        };
        self.update(id, payload, actor).await
    }

    pub async fn change_access_tier(
        &self,
        id: &str,
        access_tier: AccessTier,
        actor: &Actor,
    ) -> AppResult<Drop> {
        let payload = DropUpdate {
            access_tier: Some(access_tier),
            ..Default::default()
        };
        self.update(id, payload, actor).await
    }

    pub async fn delete(&self, id: &str, actor: &Actor) -> AppResult<Drop> {
        let drop = self.store.delete(id).await?;
        tracing::info!(drop_id = %drop.id, "Drop deleted");

        self.announce(
            &drop.id,
            vec![DropEvent::DropDeleted {
                drop_id: drop.id.clone(),
            }],
            actor,
        )
        .await;
        Ok(drop)
    }

    /// 设置规格库存，广播 stock_changed + progress_updated
    pub async fn set_stock(
        &self,
        id: &str,
        variant_id: &str,
        stock: u32,
        actor: &Actor,
    ) -> AppResult<Drop> {
        let drop_id = id.to_string();
        let vid = variant_id.to_string();
        let (before, after) = self
            .store
            .mutate(
                id,
                Box::new(move |drop| {
                    let variant = drop
                        .variant_mut(&vid)
                        .ok_or_else(|| AppError::variant_not_found(&drop_id, &vid))?;
                    variant.stock = stock;
                    Ok(())
                }),
            )
            .await?;

        let old_stock = before.variant(variant_id).map(|v| v.stock).unwrap_or_default();
        if old_stock == stock {
            return Ok(after);
        }

        self.announce(
            &after.id,
            vec![
                DropEvent::StockChanged {
                    drop_id: after.id.clone(),
                    variant_id: variant_id.to_string(),
                    old_stock,
                    new_stock: stock,
                },
                DropEvent::progress(&after),
            ],
            actor,
        )
        .await;
        Ok(after)
    }

    /// 记录销量，广播 progress_updated
    ///
    /// 不校验 `sold <= stock`，超卖由统计中的 `oversold` 标记体现。
    pub async fn record_sale(
        &self,
        id: &str,
        variant_id: &str,
        quantity: u32,
        actor: &Actor,
    ) -> AppResult<Drop> {
        if quantity == 0 {
            return Err(AppError::with_message(
                shared::ErrorCode::ValueOutOfRange,
                "quantity must be greater than 0",
            ));
        }

        let drop_id = id.to_string();
        let vid = variant_id.to_string();
        let (_, after) = self
            .store
            .mutate(
                id,
                Box::new(move |drop| {
                    let variant = drop
                        .variant_mut(&vid)
                        .ok_or_else(|| AppError::variant_not_found(&drop_id, &vid))?;
                    variant.sold = variant.sold.saturating_add(quantity);
                    Ok(())
                }),
            )
            .await?;

        self.announce(&after.id, vec![DropEvent::progress(&after)], actor)
            .await;
        Ok(after)
    }

    /// 清零所有规格销量
    pub async fn reset_stats(&self, id: &str, actor: &Actor) -> AppResult<Drop> {
        let (_, after) = self
            .store
            .mutate(
                id,
                Box::new(|drop| {
                    for variant in &mut drop.variants {
                        variant.sold = 0;
                    }
                    Ok(())
                }),
            )
            .await?;
        tracing::info!(drop_id = %after.id, "Drop stats reset");

        self.announce(
            &after.id,
            vec![
                DropEvent::StatsReset {
                    drop_id: after.id.clone(),
                },
                DropEvent::progress(&after),
            ],
            actor,
        )
        .await;
        Ok(after)
    }

    /// 缓存失效 + 广播，错误只记录日志
    async fn announce(&self, drop_id: &str, events: Vec<DropEvent>, actor: &Actor) {
        self.stats.invalidate(drop_id);

        for event in events {
            let event_type = event.event_type();
            if let Err(e) = self.broadcaster.publish(event, actor).await {
                tracing::error!(
                    drop_id = %drop_id,
                    event_type = %event_type,
                    error = %e,
                    "Failed to publish drop event"
                );
            }
        }
    }
}

/// 开售时间上限: 9999-12-31T23:59:59.999Z
const MAX_STARTS_AT_MILLIS: i64 = 253_402_300_799_999;

fn validate_starts_at(starts_at: Option<i64>) -> AppResult<()> {
    match starts_at {
        Some(ts) if !(0..=MAX_STARTS_AT_MILLIS).contains(&ts) => Err(AppError::with_message(
            shared::ErrorCode::ValueOutOfRange,
            "starts_at is out of range",
        )
        .with_detail("starts_at", ts)),
        _ => Ok(()),
    }
}

fn build_variant(payload: VariantCreate) -> AppResult<Variant> {
    let label = payload.label.trim();
    if label.is_empty() {
        return Err(AppError::required_field("variants.label"));
    }
    if payload.price.is_sign_negative() {
        return Err(
            AppError::validation("Variant price must not be negative").with_detail("label", label)
        );
    }
    Ok(Variant {
        id: payload
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| prefixed_id("var")),
        label: label.to_string(),
        price: payload.price,
        stock: payload.stock,
        sold: 0,
    })
}

fn apply_update(drop: &mut Drop, payload: DropUpdate) {
    if let Some(name) = payload.name {
        drop.name = name.trim().to_string();
    }
    if let Some(description) = payload.description {
        drop.description = Some(description);
    }
    if let Some(status) = payload.status {
        drop.status = status;
    }
    if let Some(access_tier) = payload.access_tier {
        drop.access_tier = access_tier;
    }
    if let Some(starts_at) = payload.starts_at {
        drop.starts_at = Some(starts_at);
    }
}

/// 比较可编辑字段，生成变更列表
fn diff_fields(before: &Drop, after: &Drop) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    if before.name != after.name {
        changes.push(FieldChange::new("name", before.name.clone(), after.name.clone()));
    }
    if before.description != after.description {
        changes.push(FieldChange::new(
            "description",
            before.description.clone(),
            after.description.clone(),
        ));
    }
    if before.status != after.status {
        changes.push(FieldChange::new(
            "status",
            before.status.to_string(),
            after.status.to_string(),
        ));
    }
    if before.access_tier != after.access_tier {
        changes.push(FieldChange::new(
            "access_tier",
            before.access_tier.to_string(),
            after.access_tier.to_string(),
        ));
    }
    if before.starts_at != after.starts_at {
        changes.push(FieldChange::new(
            "starts_at",
            before.starts_at.map(Value::from).unwrap_or(Value::Null),
            after.starts_at.map(Value::from).unwrap_or(Value::Null),
        ));
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDropStore;
    use crate::test_support::{BroadcastHarness, sample_drop};
    use rust_decimal::Decimal;
    use shared::ErrorCode;
    use shared::message::{Audience, EventType};
    use std::time::Duration;

    struct Fixture {
        service: DropService,
        stats: Arc<StatsService>,
        h: BroadcastHarness,
    }

    fn fixture(drops: Vec<Drop>) -> Fixture {
        let h = BroadcastHarness::new();
        let store: Arc<dyn DropStore> = Arc::new(MemoryDropStore::with_drops(drops));
        let stats = Arc::new(StatsService::new(store.clone(), Duration::from_secs(30)));
        let service = DropService::new(store, stats.clone(), h.broadcaster.clone());
        Fixture { service, stats, h }
    }

    #[tokio::test]
    async fn test_create_validates_and_broadcasts() {
        let f = fixture(vec![]);
        let admin = Actor::admin("ops");

        let err = f
            .service
            .create(
                DropCreate {
                    name: "  ".into(),
                    description: None,
                    status: None,
                    access_tier: None,
                    starts_at: None,
                    variants: vec![],
                },
                &admin,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredField);

        let drop = f
            .service
            .create(
                DropCreate {
                    name: "Sneaker Drop".into(),
                    description: Some("Limited".into()),
                    status: Some(DropStatus::Scheduled),
                    access_tier: Some(AccessTier::Members),
                    starts_at: Some(1_800_000_000_000),
                    variants: vec![VariantCreate {
                        id: None,
                        label: "EU 42".into(),
                        price: Decimal::new(19900, 2),
                        stock: 50,
                    }],
                },
                &admin,
            )
            .await
            .unwrap();

        assert!(drop.id.starts_with("drop_"));
        assert!(drop.variants[0].id.starts_with("var_"));
        assert_eq!(
            f.h.transport.event_types(Audience::Public),
            vec![EventType::DropCreated]
        );
    }

    #[tokio::test]
    async fn test_scheduled_requires_starts_at() {
        let f = fixture(vec![]);
        let err = f
            .service
            .create(
                DropCreate {
                    name: "No Date".into(),
                    description: None,
                    status: Some(DropStatus::Scheduled),
                    access_tier: None,
                    starts_at: None,
                    variants: vec![],
                },
                &Actor::admin("ops"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredField);
    }

    #[tokio::test]
    async fn test_out_of_range_starts_at_is_rejected() {
        let f = fixture(vec![sample_drop("drop_1", 10, 0)]);
        let admin = Actor::admin("ops");

        let err = f
            .service
            .create(
                DropCreate {
                    name: "Far Past".into(),
                    description: None,
                    status: Some(DropStatus::Scheduled),
                    access_tier: None,
                    starts_at: Some(i64::MIN),
                    variants: vec![],
                },
                &admin,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValueOutOfRange);

        let err = f
            .service
            .update(
                "drop_1",
                DropUpdate {
                    starts_at: Some(i64::MAX),
                    ..Default::default()
                },
                &admin,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValueOutOfRange);

        let drop = f.service.get("drop_1").await.unwrap();
        assert_eq!(drop.starts_at, Some(1_700_000_000_000));
        assert!(f.h.transport.messages(Audience::Public).is_empty());
    }

    #[tokio::test]
    async fn test_update_emits_field_changes_and_status_change() {
        let f = fixture(vec![sample_drop("drop_1", 10, 0)]);
        let payload = DropUpdate {
            name: Some("Renamed".into()),
            status: Some(DropStatus::Live),
            ..Default::default()
        };
        let drop = f
            .service
            .update("drop_1", payload, &Actor::admin("ops"))
            .await
            .unwrap();
        assert_eq!(drop.status, DropStatus::Live);

        let admin = f.h.transport.messages(Audience::Admin);
        assert_eq!(admin.len(), 2);
        match admin[0].parse_event().unwrap() {
            DropEvent::DropUpdated { changes, .. } => {
                let fields: Vec<_> = changes.iter().map(|c| c.field.as_str()).collect();
                assert_eq!(fields, vec!["name", "status"]);
                assert_eq!(changes[1].old, "scheduled");
                assert_eq!(changes[1].new, "live");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(admin[1].event_type, EventType::StatusChanged);
    }

    #[tokio::test]
    async fn test_noop_update_is_silent() {
        let f = fixture(vec![sample_drop("drop_1", 10, 0)]);
        f.service
            .change_status("drop_1", DropStatus::Scheduled, &Actor::admin("ops"))
            .await
            .unwrap();
        assert_eq!(f.h.transport.count(Audience::Admin), 0);

        let err = f
            .service
            .update("drop_1", DropUpdate::default(), &Actor::admin("ops"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_set_stock_emits_stock_and_progress() {
        let f = fixture(vec![sample_drop("drop_1", 10, 4)]);
        f.service
            .set_stock("drop_1", "v1", 20, &Actor::admin("ops"))
            .await
            .unwrap();

        let admin = f.h.transport.messages(Audience::Admin);
        assert_eq!(
            admin.iter().map(|m| m.event_type).collect::<Vec<_>>(),
            vec![EventType::StockChanged, EventType::ProgressUpdated]
        );
        match admin[1].parse_event().unwrap() {
            DropEvent::ProgressUpdated {
                total_stock,
                total_sold,
                percent,
                ..
            } => {
                assert_eq!(total_stock, 20);
                assert_eq!(total_sold, 4);
                assert_eq!(percent, 20.0);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let err = f
            .service
            .set_stock("drop_1", "v9", 5, &Actor::admin("ops"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::VariantNotFound);
    }

    #[tokio::test]
    async fn test_mutations_invalidate_stats() {
        let f = fixture(vec![sample_drop("drop_1", 100, 40)]);
        assert_eq!(f.stats.get("drop_1").await.unwrap().total_sold, 40);

        f.service
            .record_sale("drop_1", "v1", 5, &Actor::customer("c1"))
            .await
            .unwrap();
        assert_eq!(f.stats.get("drop_1").await.unwrap().total_sold, 45);

        f.service
            .reset_stats("drop_1", &Actor::admin("ops"))
            .await
            .unwrap();
        assert_eq!(f.stats.get("drop_1").await.unwrap().total_sold, 0);
    }

    #[tokio::test]
    async fn test_mutation_succeeds_during_maintenance() {
        let f = fixture(vec![sample_drop("drop_1", 100, 40)]);
        f.h.maintenance.set(true);

        f.service
            .record_sale("drop_1", "v1", 1, &Actor::customer("c1"))
            .await
            .unwrap();
        assert_eq!(f.h.broadcaster.queue_len(), 1);
        assert_eq!(f.h.transport.count(Audience::Public), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_drop() {
        let f = fixture(vec![]);
        let err = f
            .service
            .delete("nope", &Actor::admin("ops"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DropNotFound);
        assert_eq!(f.h.transport.count(Audience::Admin), 0);
    }
}
