//! 轮询调度器
//!
//! 每个协议一个任务。一个周期内依次完成：
//! 1. 未连接时：退避到期则重连，否则跳过本周期
//! 2. 已连接时：`read_batch`（受 `timeout` 约束）
//! 3. 成功：写入存储（受 `store_timeout` 约束）并广播批次；
//!    配置了触发标签时只在上升沿落库
//! 4. 失败：交给监控状态机，不落库
//!
//! 周期之间不重叠；上一周期超时运行时下一周期顺延。

use crate::error::SchedulerError;
use crate::handle::SchedulerHandle;
use crate::options::SchedulerOptions;
use crate::trigger::Trigger;
use chrono::Utc;
use domain::{ConfigFingerprint, ConnectionStatus, PartitionKey, SampleBatch, TagDefinition};
use plc_monitor::{Backoff, ConnectionMonitor, MonitorAction};
use plc_protocol::{ConnectionError, ProtocolAdapter, ReadError};
use plc_storage::{SampleStore, StoreError};
use plc_telemetry::{AcquisitionMetrics, TelemetryEvent, TelemetrySink};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// 调度器构建参数。
pub struct Scheduler {
    adapter: Box<dyn ProtocolAdapter>,
    tags: Vec<TagDefinition>,
    fingerprint: ConfigFingerprint,
    store: Arc<dyn SampleStore>,
    sink: Arc<dyn TelemetrySink>,
    options: SchedulerOptions,
    backoff: Option<Backoff>,
    start_paused: bool,
    trigger: Option<Trigger>,
}

impl Scheduler {
    pub fn new(
        adapter: Box<dyn ProtocolAdapter>,
        tags: Vec<TagDefinition>,
        fingerprint: ConfigFingerprint,
        store: Arc<dyn SampleStore>,
        sink: Arc<dyn TelemetrySink>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            adapter,
            tags,
            fingerprint,
            store,
            sink,
            options,
            backoff: None,
            start_paused: false,
            trigger: None,
        }
    }

    /// 指定退避序列（测试使用固定种子）。
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// 以暂停状态启动，等待 `resume`。
    pub fn start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }

    /// 只在该标签出现上升沿时落库。
    pub fn with_trigger(mut self, tag: impl Into<String>) -> Self {
        self.trigger = Some(Trigger::new(tag));
        self
    }

    /// 启动调度任务。
    pub fn spawn(self) -> SchedulerHandle {
        let protocol = self.adapter.protocol();
        let backoff = self
            .backoff
            .unwrap_or_else(|| Backoff::new(self.options.monitor.backoff));
        let monitor = ConnectionMonitor::with_backoff(
            protocol,
            self.options.monitor,
            backoff,
            self.sink.clone(),
        );
        let state_rx = monitor.subscribe();
        let (batch_tx, _) = broadcast::channel(self.options.subscriber_capacity.max(1));
        let (latest_tx, latest_rx) = watch::channel(None);
        let (paused_tx, paused_rx) = watch::channel(self.start_paused);
        let metrics = Arc::new(AcquisitionMetrics::new());
        let cancel = CancellationToken::new();
        let session_id = uuid::Uuid::new_v4();

        let worker = Worker {
            adapter: self.adapter,
            tags: self.tags,
            fingerprint: self.fingerprint.clone(),
            store: self.store,
            sink: self.sink.clone(),
            options: self.options,
            trigger: self.trigger,
            monitor,
            batch_tx: batch_tx.clone(),
            latest_tx,
            paused_rx,
            metrics: metrics.clone(),
            cancel: cancel.clone(),
            component: format!("scheduler.{}", protocol),
        };
        let span = tracing::info_span!(
            "scheduler",
            protocol = %protocol,
            session = %session_id
        );
        let task = tokio::spawn(worker.run().instrument(span));

        SchedulerHandle::new(
            protocol,
            self.fingerprint,
            session_id,
            state_rx,
            latest_rx,
            batch_tx,
            paused_tx,
            metrics,
            self.sink,
            cancel,
            task,
        )
    }
}

struct Worker {
    adapter: Box<dyn ProtocolAdapter>,
    tags: Vec<TagDefinition>,
    fingerprint: ConfigFingerprint,
    store: Arc<dyn SampleStore>,
    sink: Arc<dyn TelemetrySink>,
    options: SchedulerOptions,
    trigger: Option<Trigger>,
    monitor: ConnectionMonitor,
    batch_tx: broadcast::Sender<Arc<SampleBatch>>,
    latest_tx: watch::Sender<Option<Arc<SampleBatch>>>,
    paused_rx: watch::Receiver<bool>,
    metrics: Arc<AcquisitionMetrics>,
    cancel: CancellationToken,
    component: String,
}

impl Worker {
    async fn run(mut self) -> Result<(), SchedulerError> {
        self.provision_today().await?;
        self.sink.emit(
            TelemetryEvent::info(self.component.clone(), "scheduler_started")
                .field("endpoint", self.adapter.endpoint())
                .field("tags", self.tags.len())
                .field("fingerprint", &self.fingerprint)
                .field(
                    "trigger",
                    self.trigger.as_ref().map(Trigger::tag).unwrap_or("-"),
                ),
        );

        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.is_paused() {
                if !self.wait_while_paused().await {
                    break;
                }
                ticker.reset_immediately();
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = self.paused_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            self.run_cycle().await;
            if self.cancel.is_cancelled() {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// 启动时确认当日分区可写；失败则调度器停止。
    async fn provision_today(&mut self) -> Result<(), SchedulerError> {
        let key = PartitionKey::new(self.fingerprint.clone(), Utc::now().date_naive());
        let limit = self.options.store_timeout;
        let result = match timeout(limit, self.store.provision(&key)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit.as_millis() as u64)),
        };
        match result {
            Ok(()) => Ok(()),
            Err(source) => {
                self.sink.emit(
                    TelemetryEvent::error(self.component.clone(), "partition_unwritable")
                        .field("partition", &key)
                        .field("error", &source),
                );
                Err(SchedulerError::Fatal {
                    partition: key.id(),
                    source,
                })
            }
        }
    }

    fn is_paused(&self) -> bool {
        *self.paused_rx.borrow()
    }

    /// 暂停期间断开连接；返回 false 表示已取消。
    async fn wait_while_paused(&mut self) -> bool {
        if self.adapter.is_connected() || self.monitor.status() != ConnectionStatus::Disconnected
        {
            self.adapter.disconnect().await;
            self.monitor.record_shutdown();
        }
        self.sink
            .emit(TelemetryEvent::info(self.component.clone(), "paused"));

        loop {
            if !*self.paused_rx.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                changed = self.paused_rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }

        self.sink
            .emit(TelemetryEvent::info(self.component.clone(), "resumed"));
        true
    }

    async fn run_cycle(&mut self) {
        self.metrics.record_cycle();
        let now = Instant::now();
        match self.monitor.status() {
            ConnectionStatus::Connected | ConnectionStatus::Degraded => self.read_cycle().await,
            _ if self.monitor.should_connect(now) => self.connect_cycle().await,
            _ => {
                self.metrics.record_skipped();
                let retry_in = self
                    .monitor
                    .retry_at()
                    .map(|at| at.saturating_duration_since(now))
                    .unwrap_or_default();
                self.sink.emit(
                    TelemetryEvent::debug(self.component.clone(), "cycle_skipped")
                        .field("retry_in_ms", retry_in.as_millis()),
                );
            }
        }
    }

    async fn connect_cycle(&mut self) {
        self.monitor.begin_connect();
        self.metrics.record_connect_attempt();
        let started = Instant::now();
        let limit = self.options.timeout;

        let result = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = timeout(limit, self.adapter.connect(limit)) => result,
        };
        let result = match result {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(limit.as_millis() as u64)),
        };

        match result {
            Ok(()) => {
                let latency = started.elapsed();
                self.monitor.record_connect_success(latency);
                self.sink.emit(
                    TelemetryEvent::info(self.component.clone(), "connected")
                        .field("endpoint", self.adapter.endpoint())
                        .field("latency_ms", latency.as_millis()),
                );
            }
            Err(err) => {
                self.metrics.record_connect_failure();
                self.adapter.disconnect().await;
                self.monitor.record_connect_failure(&err, Instant::now());
            }
        }
    }

    async fn read_cycle(&mut self) {
        let started = Instant::now();
        let limit = self.options.timeout;

        let result = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = timeout(limit, self.adapter.read_batch(&self.tags)) => result,
        };
        // 超时截断了在途请求，连接状态不可信，按致命错误处理
        let (result, truncated) = match result {
            Ok(result) => (result, false),
            Err(_) => (Err(ReadError::Timeout(limit.as_millis() as u64)), true),
        };

        match result {
            Ok(batch) => {
                let latency = started.elapsed();
                self.monitor.record_read_success(latency);
                self.metrics.record_read_ok(latency.as_millis() as u64);
                self.publish(batch).await;
            }
            Err(err) => {
                self.metrics.record_read_failed();
                let fatal = truncated || err.is_fatal();
                let action = self
                    .monitor
                    .record_read_failure(&err, fatal, Instant::now());
                if let MonitorAction::Disconnect { retry_in } = action {
                    self.adapter.disconnect().await;
                    self.sink.emit(
                        TelemetryEvent::warn(self.component.clone(), "disconnected")
                            .field("error", &err)
                            .field("retry_in_ms", retry_in.as_millis()),
                    );
                }
            }
        }
    }

    /// 落库并通知订阅者；存储错误只记录，不重试。
    async fn publish(&mut self, batch: SampleBatch) {
        let batch = Arc::new(batch);
        for sample in batch.bad_samples() {
            self.sink.emit(
                TelemetryEvent::debug(self.component.clone(), "sample_bad")
                    .field("tag", &sample.tag)
                    .field("error", sample.error.as_deref().unwrap_or("unknown")),
            );
        }

        if self.should_store(&batch) {
            self.persist(&batch).await;
        } else {
            self.metrics.record_untriggered();
        }

        self.latest_tx.send_replace(Some(batch.clone()));
        // 无订阅者时发送失败，忽略
        let _ = self.batch_tx.send(batch);
    }

    /// 未配置触发标签时每个批次都落库。
    fn should_store(&mut self, batch: &SampleBatch) -> bool {
        let Some(trigger) = self.trigger.as_mut() else {
            return true;
        };
        let fired = trigger.observe(batch);
        if fired {
            self.sink.emit(
                TelemetryEvent::info(self.component.clone(), "trigger_fired")
                    .field("tag", trigger.tag())
                    .field("ts_ms", batch.ts_ms()),
            );
        }
        fired
    }

    async fn persist(&mut self, batch: &SampleBatch) {
        let bad = batch.len() - batch.good_count();
        let limit = self.options.store_timeout;
        let stored = match timeout(limit, self.store.append(&self.fingerprint, batch)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit.as_millis() as u64)),
        };
        match stored {
            Ok(rows) => self.metrics.record_store_ok(rows as u64, bad as u64),
            Err(err) => {
                self.metrics.record_store_failed();
                self.sink.emit(
                    TelemetryEvent::error(self.component.clone(), "store_failed")
                        .field("error", &err)
                        .field("samples", batch.len()),
                );
            }
        }
    }

    async fn shutdown(&mut self) {
        self.adapter.disconnect().await;
        self.monitor.record_shutdown();
        self.sink.emit(
            TelemetryEvent::info(self.component.clone(), "scheduler_stopped")
                .field("cycles", self.metrics.snapshot().cycles),
        );
    }
}
