//! 采集调度：协议适配器 + 健康监控 + 样本存储的串行轮询。
//!
//! 每个协议独立一个调度任务，互不共享退避状态；
//! 展示层只通过 [`SchedulerHandle`] 读取已发布的状态。

mod error;
mod handle;
mod options;
mod scheduler;
mod trigger;

pub use error::SchedulerError;
pub use handle::{SchedulerHandle, StopOutcome};
pub use options::SchedulerOptions;
pub use scheduler::Scheduler;
