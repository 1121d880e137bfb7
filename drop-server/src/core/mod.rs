//! 核心模块 - 服务器配置、状态和错误定义
//!
//! # 模块结构
//!
//! - [`Config`] - 服务器配置
//! - [`ServerState`] - 服务器状态 (组合根)
//! - [`Server`] - HTTP 服务器
//! - [`BackgroundTasks`] - 后台任务管理
//! - [`ServerError`] - 服务器错误

pub mod config;
pub mod error;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::{Config, ThresholdMode};
pub use error::{Result, ServerError};
pub use server::Server;
pub use state::{MaintenanceToggle, ResourceVersions, ServerState};
pub use tasks::{BackgroundTasks, TaskKind};
