//! Shared types for the drops platform
//!
//! drop-server 与客户端 (公共商城 / 管理后台) 共用的类型：
//! 错误码、响应结构、实时消息、领域模型。

pub mod error;
pub mod message;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use message::{Audience, BusMessage, DropEvent, EventType};
