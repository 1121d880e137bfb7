//! 消息总线核心实现
//!
//! 每个受众一个 tokio `broadcast` 通道。订阅者 (WebSocket 连接、测试)
//! 通过 [`MessageBus::subscribe`] 获得接收端；发送顺序即接收顺序。

use async_trait::async_trait;
use shared::message::{Audience, BusMessage};
use tokio::sync::broadcast;

use super::Transport;
use crate::utils::{AppError, AppResult};

/// 消息总线
#[derive(Debug, Clone)]
pub struct MessageBus {
    admin_tx: broadcast::Sender<BusMessage>,
    public_tx: broadcast::Sender<BusMessage>,
}

impl MessageBus {
    /// 创建默认容量 (1024) 的消息总线
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// 创建指定容量的消息总线
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (admin_tx, _) = broadcast::channel(capacity);
        let (public_tx, _) = broadcast::channel(capacity);
        Self {
            admin_tx,
            public_tx,
        }
    }

    fn sender(&self, audience: Audience) -> &broadcast::Sender<BusMessage> {
        match audience {
            Audience::Admin => &self.admin_tx,
            Audience::Public => &self.public_tx,
        }
    }

    /// 订阅某个受众的消息
    pub fn subscribe(&self, audience: Audience) -> broadcast::Receiver<BusMessage> {
        self.sender(audience).subscribe()
    }

    /// 当前订阅者数量
    pub fn receiver_count(&self, audience: Audience) -> usize {
        self.sender(audience).receiver_count()
    }

    /// 发布消息到某个受众
    pub fn publish(&self, audience: Audience, msg: BusMessage) -> AppResult<usize> {
        self.sender(audience).send(msg).map_err(|_| {
            AppError::delivery_failed(format!("No {} subscribers", audience))
                .with_detail("audience", audience.to_string())
        })
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MessageBus {
    async fn deliver(&self, audience: Audience, msg: &BusMessage) -> AppResult<()> {
        let receivers = self.publish(audience, msg.clone())?;
        tracing::trace!(
            audience = %audience,
            event_type = %msg.event_type,
            receivers,
            "Message delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ErrorCode;
    use shared::message::DropEvent;

    fn message(drop_id: &str) -> BusMessage {
        BusMessage::from_event(
            &DropEvent::DropLive {
                drop_id: drop_id.into(),
            },
            1,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_audiences_are_isolated() {
        let bus = MessageBus::with_capacity(16);
        let mut admin_rx = bus.subscribe(Audience::Admin);
        let mut public_rx = bus.subscribe(Audience::Public);

        bus.deliver(Audience::Admin, &message("drop_a")).await.unwrap();
        bus.deliver(Audience::Public, &message("drop_p")).await.unwrap();

        assert_eq!(admin_rx.recv().await.unwrap().drop_id, "drop_a");
        assert_eq!(public_rx.recv().await.unwrap().drop_id, "drop_p");
        assert!(admin_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_subscribers_is_delivery_failure() {
        let bus = MessageBus::new();
        let err = bus
            .deliver(Audience::Public, &message("drop_1"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DeliveryFailed);
        assert_eq!(bus.receiver_count(Audience::Public), 0);
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe(Audience::Admin);
        for i in 0..5 {
            bus.deliver(Audience::Admin, &message(&format!("drop_{}", i)))
                .await
                .unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap().drop_id, format!("drop_{}", i));
        }
    }
}
