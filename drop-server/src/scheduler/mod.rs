//! 定时调度

pub mod countdown;

pub use countdown::{CountdownScheduler, SchedulerConfig, SchedulerHandle, minutes_until};
