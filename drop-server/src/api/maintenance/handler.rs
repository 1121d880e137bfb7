//! Maintenance API Handlers

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::auth::Actor;
use crate::broadcast::{FlushReport, QueuedSummary};
use crate::core::{MaintenanceToggle, ServerState};
use crate::utils::AppResult;

#[derive(Debug, Serialize)]
pub struct MaintenanceView {
    pub is_active: bool,
    /// 最近一次探测时间 (Unix millis)
    pub last_checked: Option<i64>,
    /// `local` / `http`
    pub source: &'static str,
    pub queue_len: usize,
    pub flushing: bool,
}

#[derive(Debug, Serialize)]
pub struct QueueView {
    pub len: usize,
    pub flushing: bool,
    pub items: Vec<QueuedSummary>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub active: bool,
}

/// GET /api/maintenance - 维护状态
pub async fn status(State(state): State<ServerState>) -> Json<MaintenanceView> {
    let probe = state.broadcaster.probe();
    let is_active = probe.is_maintenance_active().await;
    Json(MaintenanceView {
        is_active,
        last_checked: probe.last_known().map(|s| s.last_checked),
        source: probe.source_name(),
        queue_len: state.broadcaster.queue_len(),
        flushing: state.broadcaster.is_flushing(),
    })
}

/// PUT /api/maintenance - 切换维护模式
pub async fn toggle(
    State(state): State<ServerState>,
    actor: Actor,
    Json(request): Json<ToggleRequest>,
) -> AppResult<Json<MaintenanceToggle>> {
    tracing::info!(actor_id = ?actor.id, active = request.active, "Maintenance toggle requested");
    let toggle = state.set_maintenance(request.active).await?;
    Ok(Json(toggle))
}

/// GET /api/maintenance/queue - 队列详情
pub async fn queue(State(state): State<ServerState>) -> Json<QueueView> {
    let items = state.broadcaster.queue_summaries();
    Json(QueueView {
        len: items.len(),
        flushing: state.broadcaster.is_flushing(),
        items,
    })
}

/// POST /api/maintenance/queue/flush - 推送全部积压消息
///
/// 已有 flush 进行中时返回 409。
pub async fn flush(
    State(state): State<ServerState>,
    actor: Actor,
) -> AppResult<Json<FlushReport>> {
    tracing::info!(actor_id = ?actor.id, "Manual queue flush requested");
    let report = state.broadcaster.flush_queue().await?;
    Ok(Json(report))
}
