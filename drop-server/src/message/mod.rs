//! 消息投递层
//!
//! ```text
//!        Broadcaster
//!            │ deliver(audience, msg)
//!     ┌──────┴──────┐
//!     │  Transport  │  ◄── 可插拔接口
//!     └──────┬──────┘
//!            ▼
//!       MessageBus ──┬──▶ admin  broadcast::Sender ──▶ /api/ws/admin
//!                    └──▶ public broadcast::Sender ──▶ /api/ws/public
//! ```

mod bus;

pub use bus::MessageBus;

use async_trait::async_trait;
use shared::message::{Audience, BusMessage};

use crate::utils::AppResult;

/// 传输层 trait
///
/// 实现者把消息交给某个受众的所有订阅者。返回错误表示本次投递失败
/// (例如没有订阅者)，调用方负责记录日志，不向上传播。
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, audience: Audience, msg: &BusMessage) -> AppResult<()>;
}

pub use shared::message::{DropEvent, EventType, FieldChange};
