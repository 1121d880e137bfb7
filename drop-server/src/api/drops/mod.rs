//! Drop API 模块
//!
//! | 路径 | 方法 | 说明 | 认证 |
//! |------|------|------|------|
//! | /api/drops | GET | 列表 | 无 |
//! | /api/drops/{id} | GET | 详情 | 无 |
//! | /api/drops/{id}/stats | GET | 统计 (缓存) | 无 |
//! | /api/drops/{id}/variants/{variant_id}/sales | POST | 记录销量 | 无 |
//! | /api/drops | POST | 创建 | admin |
//! | /api/drops/{id} | PUT / DELETE | 更新 / 删除 | admin |
//! | /api/drops/{id}/variants/{variant_id}/stock | PUT | 设置库存 | admin |
//! | /api/drops/bulk | POST | 批量操作 | admin |

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::require_admin;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/drops", routes())
}

fn routes() -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/", get(handler::list))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/stats", get(handler::stats))
        .route(
            "/{id}/variants/{variant_id}/sales",
            post(handler::record_sale),
        );

    let admin_routes = Router::new()
        .route("/", post(handler::create))
        .route("/bulk", post(handler::bulk))
        .route("/{id}", put(handler::update).delete(handler::delete))
        .route(
            "/{id}/variants/{variant_id}/stock",
            put(handler::set_stock),
        )
        .layer(middleware::from_fn(require_admin));

    read_routes.merge(admin_routes)
}
