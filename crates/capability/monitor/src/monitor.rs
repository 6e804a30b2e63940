//! 连接健康状态机。
//!
//! ```text
//! Disconnected ──begin_connect──► Connecting ──success──► Connected
//!      ▲                              │                    │   ▲
//!      │                           failure        failures ≥ threshold
//!      │                              │                    ▼   │ read ok
//!      └──── backoff ◄────────────────┘               Degraded
//!      ▲                                                   │
//!      └──────── fatal / failures ≥ hard ceiling ──────────┘
//! ```

use crate::backoff::{Backoff, BackoffPolicy};
use crate::window::RollingWindow;
use domain::{ConnectionState, ConnectionStatus, ProtocolKind};
use plc_telemetry::{TelemetryEvent, TelemetrySink};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// 状态机参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOptions {
    /// Connected → Degraded 的连续失败数
    pub failure_threshold: u32,
    /// 强制断开的连续失败数
    pub hard_failure_ceiling: u32,
    pub backoff: BackoffPolicy,
    pub rolling_window_size: usize,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            hard_failure_ceiling: 10,
            backoff: BackoffPolicy::default(),
            rolling_window_size: 20,
        }
    }
}

/// 记录读取结果后调用方需要执行的动作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    Continue,
    /// 断开连接，`retry_in` 后重连
    Disconnect { retry_in: Duration },
}

/// 单协议的连接健康监控。
///
/// 状态只由本结构修改，通过 watch 通道只读发布。
pub struct ConnectionMonitor {
    options: MonitorOptions,
    state: ConnectionState,
    backoff: Backoff,
    window: RollingWindow,
    retry_at: Option<Instant>,
    tx: watch::Sender<ConnectionState>,
    sink: Arc<dyn TelemetrySink>,
    component: String,
}

impl ConnectionMonitor {
    pub fn new(
        protocol: ProtocolKind,
        options: MonitorOptions,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self::with_backoff(protocol, options, Backoff::new(options.backoff), sink)
    }

    pub fn with_backoff(
        protocol: ProtocolKind,
        options: MonitorOptions,
        backoff: Backoff,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        let state = ConnectionState::initial(protocol);
        let (tx, _) = watch::channel(state.clone());
        Self {
            options,
            state,
            backoff,
            window: RollingWindow::new(options.rolling_window_size),
            retry_at: None,
            tx,
            sink,
            component: format!("monitor.{}", protocol),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status
    }

    /// 下一次允许重连的时间点；None 表示立即可连。
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// 处于 Disconnected 且退避已到期。
    pub fn should_connect(&self, now: Instant) -> bool {
        self.state.status == ConnectionStatus::Disconnected
            && self.retry_at.is_none_or(|at| now >= at)
    }

    /// Disconnected → Connecting
    pub fn begin_connect(&mut self) {
        self.transition(ConnectionStatus::Connecting);
        self.publish();
    }

    /// Connecting → Connected，连续失败清零。
    pub fn record_connect_success(&mut self, latency: Duration) {
        self.state.consecutive_failures = 0;
        self.state.last_latency_ms = Some(latency.as_millis() as u64);
        self.state.last_error = None;
        self.state.next_retry_in_ms = None;
        self.retry_at = None;
        self.transition(ConnectionStatus::Connected);
        self.publish();
    }

    /// Connecting → Disconnected，计为一次失败并推进退避。
    pub fn record_connect_failure(&mut self, error: &dyn fmt::Display, now: Instant) -> Duration {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        self.state.last_error = Some(error.to_string());
        let retry_in = self.schedule_retry(now);
        self.sink.emit(
            TelemetryEvent::warn(self.component.clone(), "connect_failed")
                .field("error", error)
                .field("failures", self.state.consecutive_failures)
                .field("retry_in_ms", retry_in.as_millis()),
        );
        self.transition(ConnectionStatus::Disconnected);
        self.publish();
        retry_in
    }

    /// 读取成功：连续失败清零，退避复位，Degraded → Connected。
    pub fn record_read_success(&mut self, latency: Duration) {
        self.window.push(true);
        self.backoff.reset();
        self.state.consecutive_failures = 0;
        self.state.last_latency_ms = Some(latency.as_millis() as u64);
        self.state.last_error = None;
        self.refresh_window();
        self.sink.emit(
            TelemetryEvent::debug(self.component.clone(), "read_ok")
                .field("latency_ms", latency.as_millis()),
        );
        if self.state.status == ConnectionStatus::Degraded {
            self.transition(ConnectionStatus::Connected);
        }
        self.publish();
    }

    /// 读取失败；`fatal` 为传输层整体失败。
    pub fn record_read_failure(
        &mut self,
        error: &dyn fmt::Display,
        fatal: bool,
        now: Instant,
    ) -> MonitorAction {
        self.window.push(false);
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        self.state.last_error = Some(error.to_string());
        self.refresh_window();
        self.sink.emit(
            TelemetryEvent::warn(self.component.clone(), "read_failed")
                .field("error", error)
                .field("fatal", fatal)
                .field("failures", self.state.consecutive_failures),
        );

        let failures = self.state.consecutive_failures;
        let action = if fatal || failures >= self.options.hard_failure_ceiling {
            let retry_in = self.schedule_retry(now);
            self.transition(ConnectionStatus::Disconnected);
            MonitorAction::Disconnect { retry_in }
        } else {
            if failures >= self.options.failure_threshold
                && self.state.status == ConnectionStatus::Connected
            {
                self.transition(ConnectionStatus::Degraded);
            }
            MonitorAction::Continue
        };
        self.publish();
        action
    }

    /// 调度器停止时的有序断开，不进入退避。
    pub fn record_shutdown(&mut self) {
        self.retry_at = None;
        self.state.next_retry_in_ms = None;
        self.transition(ConnectionStatus::Disconnected);
        self.publish();
    }

    fn schedule_retry(&mut self, now: Instant) -> Duration {
        let retry_in = self.backoff.next_delay();
        self.retry_at = Some(now + retry_in);
        self.state.next_retry_in_ms = Some(retry_in.as_millis() as u64);
        retry_in
    }

    fn refresh_window(&mut self) {
        self.state.success_rate = self.window.success_rate();
        self.state.window_len = self.window.len();
    }

    fn transition(&mut self, to: ConnectionStatus) {
        let from = self.state.status;
        if from == to {
            return;
        }
        self.state.status = to;
        let event = if to == ConnectionStatus::Disconnected || to == ConnectionStatus::Degraded {
            TelemetryEvent::warn(self.component.clone(), "state_changed")
        } else {
            TelemetryEvent::info(self.component.clone(), "state_changed")
        };
        self.sink.emit(
            event
                .field("from", from)
                .field("to", to)
                .field("failures", self.state.consecutive_failures),
        );
    }

    fn publish(&self) {
        self.tx.send_replace(self.state.clone());
    }
}
