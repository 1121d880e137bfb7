//! 操作者上下文
//!
//! 身份认证由上游网关完成，网关把结果写入请求头：
//!
//! | Header | 说明 |
//! |--------|------|
//! | `X-Actor-Id` | 操作者 ID |
//! | `X-Actor-Role` | `admin` / `customer` / `system` |
//!
//! 缺失或无法识别的角色一律视为匿名 (非特权)。

use std::convert::Infallible;
use std::fmt;

use axum::extract::FromRequestParts;
use http::HeaderMap;
use http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::security_log;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// 操作者角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// 运营管理员，维护期间的操作对公共端立即可见
    Admin,
    Customer,
    /// 后台任务 (倒计时调度等)
    System,
    #[default]
    Anonymous,
}

impl ActorRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(ActorRole::Admin),
            "customer" => Some(ActorRole::Customer),
            "system" => Some(ActorRole::System),
            "anonymous" => Some(ActorRole::Anonymous),
            _ => None,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorRole::Admin => "admin",
            ActorRole::Customer => "customer",
            ActorRole::System => "system",
            ActorRole::Anonymous => "anonymous",
        };
        write!(f, "{}", s)
    }
}

/// 操作者描述
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<String>,
    pub role: ActorRole,
}

impl Actor {
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            role: ActorRole::Admin,
        }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            role: ActorRole::Customer,
        }
    }

    /// 后台任务使用的系统身份
    ///
    /// 系统身份不是特权身份：调度器发出的事件面向公众，维护期间同样进入延迟队列。
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            id: Some(name.into()),
            role: ActorRole::System,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// 特权操作者：维护期间绕过延迟队列
    pub fn is_privileged(&self) -> bool {
        self.role == ActorRole::Admin
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }

    /// 从请求头解析
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let id = headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);

        let raw_role = headers.get(ACTOR_ROLE_HEADER).and_then(|v| v.to_str().ok());
        let role = match raw_role {
            None => ActorRole::Anonymous,
            Some(raw) => ActorRole::parse(raw).unwrap_or_else(|| {
                security_log!(
                    WARN,
                    "unknown_actor_role",
                    actor_id = ?id,
                    role = raw
                );
                ActorRole::Anonymous
            }),
        };

        // 没有 ID 的特权角色不可信
        let role = if id.is_none() && role == ActorRole::Admin {
            ActorRole::Anonymous
        } else {
            role
        };

        Self { id, role }
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(actor.clone());
        }
        let actor = Actor::from_headers(&parts.headers);
        parts.extensions.insert(actor.clone());
        Ok(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(id: Option<&str>, role: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(id) = id {
            headers.insert(ACTOR_ID_HEADER, HeaderValue::from_str(id).unwrap());
        }
        if let Some(role) = role {
            headers.insert(ACTOR_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        }
        headers
    }

    #[test]
    fn test_admin_from_headers() {
        let actor = Actor::from_headers(&headers(Some("ops_1"), Some("Admin")));
        assert_eq!(actor.id.as_deref(), Some("ops_1"));
        assert!(actor.is_privileged());
    }

    #[test]
    fn test_missing_headers_is_anonymous() {
        let actor = Actor::from_headers(&HeaderMap::new());
        assert_eq!(actor, Actor::anonymous());
        assert!(!actor.is_privileged());
        assert!(actor.is_anonymous());
    }

    #[test]
    fn test_unknown_role_is_not_privileged() {
        let actor = Actor::from_headers(&headers(Some("u1"), Some("superuser")));
        assert_eq!(actor.role, ActorRole::Anonymous);
        assert!(!actor.is_privileged());
    }

    #[test]
    fn test_admin_role_without_id_is_downgraded() {
        let actor = Actor::from_headers(&headers(None, Some("admin")));
        assert!(!actor.is_privileged());
    }

    #[test]
    fn test_system_actor_is_not_privileged() {
        assert!(!Actor::system("countdown_scheduler").is_privileged());
        assert!(!Actor::customer("c1").is_privileged());
    }
}
