//! 维护模式 API 模块
//!
//! | 路径 | 方法 | 说明 | 认证 |
//! |------|------|------|------|
//! | /api/maintenance | GET | 维护状态 + 队列长度 | 无 |
//! | /api/maintenance | PUT | 切换本地维护开关 | admin |
//! | /api/maintenance/queue | GET | 队列详情 | admin |
//! | /api/maintenance/queue/flush | POST | 手动 flush | admin |

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::require_admin;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/maintenance", routes())
}

fn routes() -> Router<ServerState> {
    let read_routes = Router::new().route("/", get(handler::status));

    let admin_routes = Router::new()
        .route("/", put(handler::toggle))
        .route("/queue", get(handler::queue))
        .route("/queue/flush", post(handler::flush))
        .layer(middleware::from_fn(require_admin));

    read_routes.merge(admin_routes)
}
