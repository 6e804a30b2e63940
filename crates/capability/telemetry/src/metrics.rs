use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 采集指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub reads_ok: u64,
    pub reads_failed: u64,
    pub skipped_cycles: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub store_ok: u64,
    pub store_failed: u64,
    pub samples_written: u64,
    pub bad_samples: u64,
    pub read_latency_ms_total: u64,
    pub read_latency_ms_count: u64,
    /// 触发模式下未出现上升沿、未落库的批次
    pub untriggered: u64,
    /// 共享遥测出口累计丢弃的事件（进程级）
    pub telemetry_dropped: u64,
}

/// 单个调度器的采集指标。
#[derive(Debug, Default)]
pub struct AcquisitionMetrics {
    cycles: AtomicU64,
    reads_ok: AtomicU64,
    reads_failed: AtomicU64,
    skipped_cycles: AtomicU64,
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    store_ok: AtomicU64,
    store_failed: AtomicU64,
    samples_written: AtomicU64,
    bad_samples: AtomicU64,
    read_latency_ms_total: AtomicU64,
    read_latency_ms_count: AtomicU64,
    untriggered: AtomicU64,
}

impl AcquisitionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            reads_ok: self.reads_ok.load(Ordering::Relaxed),
            reads_failed: self.reads_failed.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            store_ok: self.store_ok.load(Ordering::Relaxed),
            store_failed: self.store_failed.load(Ordering::Relaxed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            bad_samples: self.bad_samples.load(Ordering::Relaxed),
            read_latency_ms_total: self.read_latency_ms_total.load(Ordering::Relaxed),
            read_latency_ms_count: self.read_latency_ms_count.load(Ordering::Relaxed),
            untriggered: self.untriggered.load(Ordering::Relaxed),
            telemetry_dropped: 0,
        }
    }

    /// 记录完成的周期数（无论结果）。
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录成功读取及其往返延迟（毫秒）。
    pub fn record_read_ok(&self, latency_ms: u64) {
        self.reads_ok.fetch_add(1, Ordering::Relaxed);
        self.read_latency_ms_total
            .fetch_add(latency_ms, Ordering::Relaxed);
        self.read_latency_ms_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failed(&self) {
        self.reads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录因退避未到期而跳过的周期。
    pub fn record_skipped(&self) {
        self.skipped_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录写入成功的批次及其中的样本数。
    pub fn record_store_ok(&self, samples: u64, bad: u64) {
        self.store_ok.fetch_add(1, Ordering::Relaxed);
        self.samples_written.fetch_add(samples, Ordering::Relaxed);
        self.bad_samples.fetch_add(bad, Ordering::Relaxed);
    }

    pub fn record_store_failed(&self) {
        self.store_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_untriggered(&self) {
        self.untriggered.fetch_add(1, Ordering::Relaxed);
    }
}
