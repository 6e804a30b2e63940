//! 遥测事件出口。
//!
//! 核心组件只依赖 [`TelemetrySink`]；`emit` 不阻塞、不返回错误，
//! 出口繁忙时事件被丢弃并计数。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TelemetryLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// 一条结构化遥测记录。
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub level: TelemetryLevel,
    /// 来源组件，例如 `monitor.modbus`
    pub component: String,
    /// snake_case 事件名
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl TelemetryEvent {
    pub fn new(
        level: TelemetryLevel,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            component: component.into(),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn debug(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TelemetryLevel::Debug, component, message)
    }

    pub fn info(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TelemetryLevel::Info, component, message)
    }

    pub fn warn(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TelemetryLevel::Warn, component, message)
    }

    pub fn error(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TelemetryLevel::Error, component, message)
    }

    /// 追加一个字段。
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    pub fn field_value(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
    }

    fn render_fields(&self) -> String {
        self.fields
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 遥测出口（fire-and-forget）。
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);

    /// 因出口繁忙而丢弃的事件数。
    fn dropped(&self) -> u64 {
        0
    }
}

/// 丢弃全部事件。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// 内存出口（测试用）。
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 按事件名过滤。
    pub fn named(&self, message: &str) -> Vec<TelemetryEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.message == message)
            .collect()
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: TelemetryEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// 经有界通道转发到后台任务，由后台任务写出 tracing 事件。
pub struct TracingSink {
    tx: mpsc::Sender<TelemetryEvent>,
    dropped: AtomicU64,
}

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 通道满或已关闭时计数。
    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn write_event(event: &TelemetryEvent) {
    let fields = event.render_fields();
    match event.level {
        TelemetryLevel::Debug => debug!(
            target: "plc.telemetry",
            component = %event.component,
            fields = %fields,
            "{}",
            event.message
        ),
        TelemetryLevel::Info => info!(
            target: "plc.telemetry",
            component = %event.component,
            fields = %fields,
            "{}",
            event.message
        ),
        TelemetryLevel::Warn => warn!(
            target: "plc.telemetry",
            component = %event.component,
            fields = %fields,
            "{}",
            event.message
        ),
        TelemetryLevel::Error => error!(
            target: "plc.telemetry",
            component = %event.component,
            fields = %fields,
            "{}",
            event.message
        ),
    }
}

/// `TracingSink` 的后台写出任务。
pub struct TelemetryRuntime;

impl TelemetryRuntime {
    /// 启动后台任务；返回的 sink 可注入各组件，guard 负责退出时冲刷。
    pub fn start(capacity: usize) -> (Arc<TracingSink>, TelemetryGuard) {
        let (tx, mut rx) = mpsc::channel::<TelemetryEvent>(capacity.max(1));
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    event = rx.recv() => match event {
                        Some(event) => write_event(&event),
                        None => break,
                    },
                    _ = worker_cancel.cancelled() => {
                        while let Ok(event) = rx.try_recv() {
                            write_event(&event);
                        }
                        break;
                    }
                }
            }
        });

        let sink = Arc::new(TracingSink {
            tx,
            dropped: AtomicU64::new(0),
        });
        (
            sink.clone(),
            TelemetryGuard {
                sink,
                cancel,
                handle,
            },
        )
    }
}

/// 后台写出任务的生命周期句柄。
pub struct TelemetryGuard {
    sink: Arc<TracingSink>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TelemetryGuard {
    /// 写出通道中剩余的事件后停止后台任务。
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
        let dropped = self.sink.dropped();
        if dropped > 0 {
            warn!(target: "plc.telemetry", dropped, "telemetry_events_dropped");
        }
    }
}
