//! WebSocket 推送模块
//!
//! | 路径 | 受众 | 认证 |
//! |------|------|------|
//! | /api/ws/public | Public (维护期间延迟) | 无 |
//! | /api/ws/admin | Admin (总是立即) | admin |

mod handler;

use axum::{Router, middleware, routing::get};

use crate::auth::require_admin;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    let public = Router::new().route("/api/ws/public", get(handler::public_ws));

    let admin = Router::new()
        .route("/api/ws/admin", get(handler::admin_ws))
        .layer(middleware::from_fn(require_admin));

    public.merge(admin)
}
