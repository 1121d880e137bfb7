//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 | 认证 |
//! |------|------|------|------|
//! | /health | GET | 健康检查 | 无 |

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use shared::message::Audience;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    /// 最近一次探测到的维护状态 (尚未探测时为 None)
    maintenance: Option<bool>,
    queue_len: usize,
    stats_cache_entries: usize,
    admin_subscribers: usize,
    public_subscribers: usize,
}

/// GET /health
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        maintenance: state
            .broadcaster
            .probe()
            .last_known()
            .map(|s| s.is_active),
        queue_len: state.broadcaster.queue_len(),
        stats_cache_entries: state.stats.cached_entries(),
        admin_subscribers: state.message_bus.receiver_count(Audience::Admin),
        public_subscribers: state.message_bus.receiver_count(Audience::Public),
    })
}
