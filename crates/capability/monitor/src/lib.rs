//! 连接健康监控：状态机、指数退避、滚动成功率。

mod backoff;
mod monitor;
mod window;

pub use backoff::{Backoff, BackoffPolicy};
pub use monitor::{ConnectionMonitor, MonitorAction, MonitorOptions};
pub use window::RollingWindow;
