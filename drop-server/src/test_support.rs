//! 单元测试共用的夹具

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::message::{Audience, BusMessage, EventType};
use shared::models::{AccessTier, Drop, DropStatus, Variant};

use crate::broadcast::{Broadcaster, LocalMaintenanceSource, MaintenanceProbe};
use crate::core::ResourceVersions;
use crate::message::Transport;
use crate::utils::{AppError, AppResult};

pub fn sample_drop(id: &str, stock: u32, sold: u32) -> Drop {
    Drop {
        id: id.to_string(),
        name: format!("Drop {}", id),
        description: None,
        status: DropStatus::Scheduled,
        access_tier: AccessTier::Public,
        starts_at: Some(1_700_000_000_000),
        variants: vec![Variant {
            id: "v1".into(),
            label: "One Size".into(),
            price: Decimal::new(12900, 2),
            stock,
            sold,
        }],
        created_at: 0,
        updated_at: 0,
    }
}

/// 记录所有投递的 Transport
#[derive(Default)]
pub struct RecordingTransport {
    delivered: Mutex<Vec<(Audience, BusMessage)>>,
    fail: Mutex<bool>,
    public_delay: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 让后续投递全部失败
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    /// 公共受众的投递延迟 (模拟慢速客户端)
    pub fn set_public_delay(&self, delay: Option<Duration>) {
        *self.public_delay.lock() = delay;
    }

    pub fn messages(&self, audience: Audience) -> Vec<BusMessage> {
        self.delivered
            .lock()
            .iter()
            .filter(|(a, _)| *a == audience)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn event_types(&self, audience: Audience) -> Vec<EventType> {
        self.messages(audience).iter().map(|m| m.event_type).collect()
    }

    pub fn count(&self, audience: Audience) -> usize {
        self.messages(audience).len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(&self, audience: Audience, msg: &BusMessage) -> AppResult<()> {
        if *self.fail.lock() {
            return Err(AppError::delivery_failed("transport down"));
        }
        let delay = *self.public_delay.lock();
        if let (Audience::Public, Some(delay)) = (audience, delay) {
            tokio::time::sleep(delay).await;
        }
        self.delivered.lock().push((audience, msg.clone()));
        Ok(())
    }
}

/// 广播测试环境：维护开关每次调用都重新读取 (TTL = 0)
pub struct BroadcastHarness {
    pub broadcaster: Arc<Broadcaster>,
    pub transport: Arc<RecordingTransport>,
    pub maintenance: Arc<LocalMaintenanceSource>,
}

impl BroadcastHarness {
    pub fn new() -> Self {
        let transport = RecordingTransport::new();
        let maintenance = Arc::new(LocalMaintenanceSource::new(false));
        let probe = Arc::new(MaintenanceProbe::new(
            maintenance.clone(),
            Duration::ZERO,
            Duration::from_secs(1),
        ));
        let broadcaster = Arc::new(Broadcaster::new(
            transport.clone(),
            probe,
            Arc::new(ResourceVersions::new()),
            Duration::from_millis(500),
        ));
        Self {
            broadcaster,
            transport,
            maintenance,
        }
    }
}
