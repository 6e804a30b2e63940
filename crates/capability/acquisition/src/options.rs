use plc_config::PollingOptions;
use plc_monitor::{BackoffPolicy, MonitorOptions};
use std::time::Duration;

/// 单个调度器的运行参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerOptions {
    pub interval: Duration,
    /// 连接与读取的上限
    pub timeout: Duration,
    pub store_timeout: Duration,
    pub subscriber_capacity: usize,
    pub monitor: MonitorOptions,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_polling(&PollingOptions::default())
    }
}

impl SchedulerOptions {
    pub fn from_polling(polling: &PollingOptions) -> Self {
        Self {
            interval: polling.interval(),
            timeout: polling.timeout(),
            store_timeout: polling.store_timeout(),
            subscriber_capacity: polling.subscriber_capacity.max(1),
            monitor: MonitorOptions {
                failure_threshold: polling.failure_threshold,
                hard_failure_ceiling: polling.hard_failure_ceiling,
                backoff: BackoffPolicy {
                    min: Duration::from_millis(polling.backoff_min_ms),
                    cap: Duration::from_millis(polling.backoff_cap_ms),
                    jitter: polling.backoff_jitter,
                },
                rolling_window_size: polling.rolling_window_size,
            },
        }
    }
}
