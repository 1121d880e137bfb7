//! 操作者上下文与授权
//!
//! - [`Actor`] - 当前操作者 (由上游认证层写入请求头)
//! - [`require_admin`] - 管理员中间件

pub mod actor;
pub mod middleware;

pub use actor::{Actor, ActorRole};
pub use middleware::require_admin;
