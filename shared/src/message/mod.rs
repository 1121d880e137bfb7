//! 实时消息类型定义
//!
//! drop-server 通过两个受众通道推送这些消息：
//!
//! ```text
//! DropService / Scheduler ──▶ Broadcaster ──┬──▶ admin  (总是立即)
//!                                           └──▶ public (立即 / 维护期间延迟)
//! ```
//!
//! 客户端 (管理后台、公共商城) 通过 WebSocket 接收 JSON 序列化的 [`BusMessage`]。

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Drop, DropStatus};

/// 消息受众
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// 管理后台，总是立即送达
    Admin,
    /// 公共浏览端，维护模式下可能被延迟
    Public,
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Admin => write!(f, "admin"),
            Audience::Public => write!(f, "public"),
        }
    }
}

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DropCreated,
    DropUpdated,
    DropDeleted,
    StockChanged,
    StatusChanged,
    ProgressUpdated,
    StatsReset,
    StartingSoon,
    DropLive,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::DropCreated => "drop_created",
            EventType::DropUpdated => "drop_updated",
            EventType::DropDeleted => "drop_deleted",
            EventType::StockChanged => "stock_changed",
            EventType::StatusChanged => "status_changed",
            EventType::ProgressUpdated => "progress_updated",
            EventType::StatsReset => "stats_reset",
            EventType::StartingSoon => "starting_soon",
            EventType::DropLive => "drop_live",
        };
        write!(f, "{}", s)
    }
}

/// 单个字段的变更 (旧值 → 新值)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

impl FieldChange {
    pub fn new(
        field: impl Into<String>,
        old: impl Into<serde_json::Value>,
        new: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            old: old.into(),
            new: new.into(),
        }
    }
}

/// 领域事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DropEvent {
    DropCreated {
        drop: Drop,
    },
    DropUpdated {
        drop_id: String,
        changes: Vec<FieldChange>,
    },
    DropDeleted {
        drop_id: String,
    },
    StockChanged {
        drop_id: String,
        variant_id: String,
        old_stock: u32,
        new_stock: u32,
    },
    StatusChanged {
        drop_id: String,
        old_status: DropStatus,
        new_status: DropStatus,
    },
    /// 由当前总库存 / 总销量计算，随 StockChanged 一起发出
    ProgressUpdated {
        drop_id: String,
        total_stock: u64,
        total_sold: u64,
        percent: f64,
    },
    StatsReset {
        drop_id: String,
    },
    StartingSoon {
        drop_id: String,
        in_minutes: i64,
    },
    DropLive {
        drop_id: String,
    },
}

impl DropEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            DropEvent::DropCreated { .. } => EventType::DropCreated,
            DropEvent::DropUpdated { .. } => EventType::DropUpdated,
            DropEvent::DropDeleted { .. } => EventType::DropDeleted,
            DropEvent::StockChanged { .. } => EventType::StockChanged,
            DropEvent::StatusChanged { .. } => EventType::StatusChanged,
            DropEvent::ProgressUpdated { .. } => EventType::ProgressUpdated,
            DropEvent::StatsReset { .. } => EventType::StatsReset,
            DropEvent::StartingSoon { .. } => EventType::StartingSoon,
            DropEvent::DropLive { .. } => EventType::DropLive,
        }
    }

    pub fn drop_id(&self) -> &str {
        match self {
            DropEvent::DropCreated { drop } => &drop.id,
            DropEvent::DropUpdated { drop_id, .. }
            | DropEvent::DropDeleted { drop_id }
            | DropEvent::StockChanged { drop_id, .. }
            | DropEvent::StatusChanged { drop_id, .. }
            | DropEvent::ProgressUpdated { drop_id, .. }
            | DropEvent::StatsReset { drop_id }
            | DropEvent::StartingSoon { drop_id, .. }
            | DropEvent::DropLive { drop_id } => drop_id,
        }
    }

    /// 根据当前库存/销量构造进度事件
    pub fn progress(drop: &Drop) -> Self {
        let total_stock = drop.total_stock();
        let total_sold = drop.total_sold();
        let percent = if total_stock == 0 {
            0.0
        } else {
            (total_sold as f64 / total_stock as f64 * 100.0).min(100.0)
        };
        DropEvent::ProgressUpdated {
            drop_id: drop.id.clone(),
            total_stock,
            total_sold,
            percent,
        }
    }

    /// 校验事件结构
    ///
    /// 畸形事件属于调用方 bug，直接返回错误而不是静默丢弃。
    pub fn validate(&self) -> AppResult<()> {
        if self.drop_id().trim().is_empty() {
            return Err(AppError::invalid_event(format!(
                "{} event is missing drop_id",
                self.event_type()
            )));
        }
        match self {
            DropEvent::DropUpdated { changes, .. } if changes.is_empty() => Err(
                AppError::invalid_event("drop_updated event carries no field changes"),
            ),
            DropEvent::StockChanged { variant_id, .. } if variant_id.trim().is_empty() => Err(
                AppError::invalid_event("stock_changed event is missing variant_id"),
            ),
            DropEvent::StatusChanged {
                old_status,
                new_status,
                ..
            } if old_status == new_status => Err(AppError::invalid_event(format!(
                "status_changed event with identical status {}",
                new_status
            ))),
            DropEvent::StartingSoon { in_minutes, .. } if *in_minutes <= 0 => Err(
                AppError::invalid_event("starting_soon event must be in the future"),
            ),
            _ => Ok(()),
        }
    }
}

/// 推送给客户端的消息体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: Uuid,
    pub event_type: EventType,
    pub drop_id: String,
    /// 该 drop 的资源版本号，客户端据此检测丢失的消息
    pub version: u64,
    pub payload: serde_json::Value,
    /// 发布时间 (Unix millis)
    pub timestamp: i64,
}

impl BusMessage {
    pub fn from_event(event: &DropEvent, version: u64) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            event_type: event.event_type(),
            drop_id: event.drop_id().to_string(),
            version,
            payload: serde_json::to_value(event)?,
            timestamp: crate::util::now_millis(),
        })
    }

    /// 解析载荷为领域事件
    pub fn parse_event(&self) -> Result<DropEvent, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
