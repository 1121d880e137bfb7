//! 工具模块 - 通用工具函数和类型
//!
//! # 内容
//!
//! - [`AppError`] - 应用错误类型 (from shared::error)
//! - [`ApiResponse`] - API 响应结构 (from shared::error)
//! - [`logger`] - 日志初始化

pub mod logger;

pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

/// 包装带自定义消息的成功响应
pub fn ok_with_message<T>(message: impl Into<String>, data: T) -> axum::Json<ApiResponse<T>> {
    axum::Json(ApiResponse::success_with_message(message, data))
}
