//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`drops`] - Drop 管理、库存、销量、统计、批量操作
//! - [`maintenance`] - 维护模式与延迟队列
//! - [`ws`] - admin / public 实时推送 (WebSocket)

pub mod drops;
pub mod health;
pub mod maintenance;
pub mod ws;

use axum::Router;
use http::{HeaderName, HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::ServerState;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// 所有路由 (无中间件、无状态)
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(health::router())
        .merge(drops::router())
        .merge(maintenance::router())
        .merge(ws::router())
}

/// 完整应用：路由 + 中间件 + 状态
pub fn build_app(state: ServerState) -> Router {
    build_router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            XRequestId,
        ))
}
