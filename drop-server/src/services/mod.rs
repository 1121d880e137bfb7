//! 业务服务层

pub mod drop_service;

pub use drop_service::DropService;
