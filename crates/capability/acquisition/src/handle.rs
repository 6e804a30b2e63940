use crate::error::SchedulerError;
use domain::{ConfigFingerprint, ConnectionState, ProtocolKind, SampleBatch};
use plc_telemetry::{AcquisitionMetrics, MetricsSnapshot, TelemetrySink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// `stop` 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// 在宽限期内完成断开
    Graceful,
    /// 宽限期已过，任务被强制终止
    Aborted,
    AlreadyStopped,
}

/// 运行中调度器的控制与只读视图。
pub struct SchedulerHandle {
    protocol: ProtocolKind,
    fingerprint: ConfigFingerprint,
    session_id: uuid::Uuid,
    state_rx: watch::Receiver<ConnectionState>,
    latest_rx: watch::Receiver<Option<Arc<SampleBatch>>>,
    batch_tx: broadcast::Sender<Arc<SampleBatch>>,
    paused_tx: watch::Sender<bool>,
    metrics: Arc<AcquisitionMetrics>,
    sink: Arc<dyn TelemetrySink>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<(), SchedulerError>>>>,
}

impl SchedulerHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        protocol: ProtocolKind,
        fingerprint: ConfigFingerprint,
        session_id: uuid::Uuid,
        state_rx: watch::Receiver<ConnectionState>,
        latest_rx: watch::Receiver<Option<Arc<SampleBatch>>>,
        batch_tx: broadcast::Sender<Arc<SampleBatch>>,
        paused_tx: watch::Sender<bool>,
        metrics: Arc<AcquisitionMetrics>,
        sink: Arc<dyn TelemetrySink>,
        cancel: CancellationToken,
        task: JoinHandle<Result<(), SchedulerError>>,
    ) -> Self {
        Self {
            protocol,
            fingerprint,
            session_id,
            state_rx,
            latest_rx,
            batch_tx,
            paused_tx,
            metrics,
            sink,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    pub fn fingerprint(&self) -> &ConfigFingerprint {
        &self.fingerprint
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// 当前连接状态快照。
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// 订阅批次；消费过慢的接收端会丢失旧批次。
    pub fn subscribe_batches(&self) -> broadcast::Receiver<Arc<SampleBatch>> {
        self.batch_tx.subscribe()
    }

    pub fn latest_batch(&self) -> Option<Arc<SampleBatch>> {
        self.latest_rx.borrow().clone()
    }

    /// 含共享遥测出口的丢弃计数。
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            telemetry_dropped: self.sink.dropped(),
            ..self.metrics.snapshot()
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused_tx.borrow()
    }

    pub fn pause(&self) {
        self.paused_tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused_tx.send_replace(false);
    }

    /// 取消在途请求并断开；超过宽限期则强制终止任务。
    ///
    /// 启动阶段的致命错误在这里返回。
    pub async fn stop(&self, grace: Duration) -> Result<StopOutcome, SchedulerError> {
        self.cancel.cancel();
        let Some(mut task) = self.task.lock().await.take() else {
            return Ok(StopOutcome::AlreadyStopped);
        };
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(StopOutcome::Graceful),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(err)) => Err(SchedulerError::Join(err.to_string())),
            Err(_) => {
                task.abort();
                warn!(
                    target: "plc.acquisition",
                    protocol = %self.protocol,
                    grace_ms = grace.as_millis() as u64,
                    "scheduler_aborted"
                );
                Ok(StopOutcome::Aborted)
            }
        }
    }
}
