//! Drop Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Drop 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropStatus {
    /// 草稿 (仅后台可见)
    #[default]
    Draft,
    /// 已排期，等待开售
    Scheduled,
    /// 开售中
    Live,
    /// 售罄
    SoldOut,
    /// 已结束
    Ended,
    /// 隐藏 (下架)
    Hidden,
}

impl fmt::Display for DropStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropStatus::Draft => write!(f, "draft"),
            DropStatus::Scheduled => write!(f, "scheduled"),
            DropStatus::Live => write!(f, "live"),
            DropStatus::SoldOut => write!(f, "sold_out"),
            DropStatus::Ended => write!(f, "ended"),
            DropStatus::Hidden => write!(f, "hidden"),
        }
    }
}

/// 访问等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    #[default]
    Public,
    Members,
    Vip,
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessTier::Public => write!(f, "public"),
            AccessTier::Members => write!(f, "members"),
            AccessTier::Vip => write!(f, "vip"),
        }
    }
}

/// 规格 (带价格与库存的子商品)
///
/// `sold <= stock` 是业务预期，但不在此处强制。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub label: String,
    pub price: Decimal,
    pub stock: u32,
    #[serde(default)]
    pub sold: u32,
}

/// Drop entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drop {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: DropStatus,
    pub access_tier: AccessTier,
    /// 开售时间 (Unix millis)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<i64>,
    /// 规格列表 (有序)
    pub variants: Vec<Variant>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Drop {
    /// 所有规格库存之和
    pub fn total_stock(&self) -> u64 {
        self.variants.iter().map(|v| u64::from(v.stock)).sum()
    }

    /// 所有规格销量之和
    pub fn total_sold(&self) -> u64 {
        self.variants.iter().map(|v| u64::from(v.sold)).sum()
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn variant_mut(&mut self, variant_id: &str) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| v.id == variant_id)
    }

    /// 是否参与倒计时调度
    pub fn is_schedulable(&self) -> bool {
        self.status == DropStatus::Scheduled && self.starts_at.is_some()
    }
}

/// Create variant payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantCreate {
    /// 不传则由服务端生成
    #[serde(default)]
    pub id: Option<String>,
    pub label: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: u32,
}

/// Create drop payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<DropStatus>,
    #[serde(default)]
    pub access_tier: Option<AccessTier>,
    #[serde(default)]
    pub starts_at: Option<i64>,
    #[serde(default)]
    pub variants: Vec<VariantCreate>,
}

/// Update drop payload (all fields optional)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<DropStatus>,
    pub access_tier: Option<AccessTier>,
    pub starts_at: Option<i64>,
}

impl DropUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.access_tier.is_none()
            && self.starts_at.is_none()
    }
}

/// Set variant stock payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockUpdate {
    pub stock: u32,
}

/// Record sale payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    pub quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: &str, stock: u32, sold: u32) -> Variant {
        Variant {
            id: id.to_string(),
            label: id.to_uppercase(),
            price: Decimal::new(4999, 2),
            stock,
            sold,
        }
    }

    #[test]
    fn test_totals() {
        let drop = Drop {
            id: "drop_1".into(),
            name: "Winter Capsule".into(),
            description: None,
            status: DropStatus::Scheduled,
            access_tier: AccessTier::Public,
            starts_at: Some(1_700_000_000_000),
            variants: vec![variant("s", 60, 25), variant("m", 40, 15)],
            created_at: 0,
            updated_at: 0,
        };

        assert_eq!(drop.total_stock(), 100);
        assert_eq!(drop.total_sold(), 40);
        assert!(drop.is_schedulable());
        assert_eq!(drop.variant("m").map(|v| v.sold), Some(15));
        assert!(drop.variant("xl").is_none());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&DropStatus::SoldOut).unwrap();
        assert_eq!(json, "\"sold_out\"");
        assert_eq!(DropStatus::SoldOut.to_string(), "sold_out");

        let tier: AccessTier = serde_json::from_str("\"vip\"").unwrap();
        assert_eq!(tier, AccessTier::Vip);
    }

    #[test]
    fn test_update_is_empty() {
        assert!(DropUpdate::default().is_empty());
        let update = DropUpdate {
            status: Some(DropStatus::Live),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
