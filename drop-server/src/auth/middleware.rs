//! 授权中间件

use axum::{extract::Request, middleware::Next, response::Response};

use crate::auth::Actor;
use crate::security_log;
use crate::utils::AppError;

/// 管理员中间件 - 要求 `X-Actor-Role: admin`
///
/// # 错误
///
/// | 情况 | 错误码 |
/// |------|--------|
/// | 无操作者身份 | 401 NotAuthenticated |
/// | 非管理员 | 403 AdminRequired |
pub async fn require_admin(mut req: Request, next: Next) -> Result<Response, AppError> {
    let actor = Actor::from_headers(req.headers());

    if actor.is_anonymous() {
        security_log!(
            WARN,
            "auth_missing",
            method = %req.method(),
            uri = %req.uri()
        );
        return Err(AppError::not_authenticated());
    }

    if !actor.is_admin() {
        security_log!(
            WARN,
            "admin_required",
            actor_id = ?actor.id,
            actor_role = %actor.role,
            uri = %req.uri()
        );
        return Err(AppError::admin_required());
    }

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
