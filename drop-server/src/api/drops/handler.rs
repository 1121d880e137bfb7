//! Drop API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::models::{Drop, DropCreate, DropUpdate, SaleRecord, StockUpdate};

use crate::auth::Actor;
use crate::bulk::{BulkAction, BulkResult};
use crate::core::ServerState;
use crate::stats::DropStats;
use crate::utils::{ApiResponse, AppResult, ok_with_message};

/// GET /api/drops - 获取所有 drop
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<Drop>>> {
    let drops = state.drops.list().await?;
    Ok(Json(drops))
}

/// GET /api/drops/{id} - 获取单个 drop
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Drop>> {
    let drop = state.drops.get(&id).await?;
    Ok(Json(drop))
}

/// GET /api/drops/{id}/stats - 获取统计 (TTL 缓存)
pub async fn stats(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<DropStats>> {
    let stats = state.stats.get(&id).await?;
    Ok(Json(stats))
}

/// POST /api/drops - 创建 drop
pub async fn create(
    State(state): State<ServerState>,
    actor: Actor,
    Json(payload): Json<DropCreate>,
) -> AppResult<Json<Drop>> {
    let drop = state.drops.create(payload, &actor).await?;
    Ok(Json(drop))
}

/// PUT /api/drops/{id} - 更新 drop
pub async fn update(
    State(state): State<ServerState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(payload): Json<DropUpdate>,
) -> AppResult<Json<Drop>> {
    let drop = state.drops.update(&id, payload, &actor).await?;
    Ok(Json(drop))
}

/// DELETE /api/drops/{id} - 删除 drop
pub async fn delete(
    State(state): State<ServerState>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Json<Drop>> {
    let drop = state.drops.delete(&id, &actor).await?;
    Ok(Json(drop))
}

/// PUT /api/drops/{id}/variants/{variant_id}/stock - 设置库存
pub async fn set_stock(
    State(state): State<ServerState>,
    actor: Actor,
    Path((id, variant_id)): Path<(String, String)>,
    Json(payload): Json<StockUpdate>,
) -> AppResult<Json<Drop>> {
    let drop = state
        .drops
        .set_stock(&id, &variant_id, payload.stock, &actor)
        .await?;
    Ok(Json(drop))
}

/// POST /api/drops/{id}/variants/{variant_id}/sales - 记录销量
pub async fn record_sale(
    State(state): State<ServerState>,
    actor: Actor,
    Path((id, variant_id)): Path<(String, String)>,
    Json(payload): Json<SaleRecord>,
) -> AppResult<Json<Drop>> {
    let drop = state
        .drops
        .record_sale(&id, &variant_id, payload.quantity, &actor)
        .await?;
    Ok(Json(drop))
}

/// 批量操作请求
///
/// ```json
/// { "action": "change_status", "payload": { "status": "hidden" }, "ids": ["drop_1", "drop_2"] }
/// ```
#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    #[serde(flatten)]
    pub action: BulkAction,
    pub ids: Vec<String>,
}

/// POST /api/drops/bulk - 批量操作
///
/// 单项失败不影响整体，响应消息为 "N succeeded, M failed"。
pub async fn bulk(
    State(state): State<ServerState>,
    actor: Actor,
    Json(request): Json<BulkRequest>,
) -> AppResult<Json<ApiResponse<BulkResult>>> {
    let result = state
        .bulk
        .apply_bulk(&request.action, &request.ids, &actor)
        .await?;
    Ok(ok_with_message(result.summary(), result))
}
