use async_trait::async_trait;
use chrono::Utc;
use domain::{
    ConfigFingerprint, ConnectionStatus, PartitionKey, ProtocolKind, RegisterAddress,
    RegisterDataType, RegisterKind, Sample, SampleBatch, SampleValue, TagAddress, TagDefinition,
};
use plc_acquisition::{Scheduler, SchedulerError, SchedulerHandle, SchedulerOptions, StopOutcome};
use plc_monitor::{BackoffPolicy, MonitorOptions};
use plc_protocol::{ConnectionError, ProtocolAdapter, ReadError};
use plc_storage::{
    InMemorySampleStore, PartitionInfo, SampleQuery, SampleStore, StoreError, StoredSample,
};
use plc_telemetry::{MemorySink, TelemetryEvent, TelemetryLevel, TelemetrySink};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Script {
    connect_fails_forever: bool,
    read_results: VecDeque<Result<(), ReadError>>,
    read_delay: Duration,
    disconnect_hangs: bool,
    connects: usize,
    reads: usize,
    disconnects: usize,
    in_flight: usize,
    max_in_flight: usize,
    /// "Start" 标签依次返回的电平，用尽后为 false
    start_levels: VecDeque<bool>,
    appending: bool,
    reads_during_append: usize,
}

type SharedScript = Arc<Mutex<Script>>;

struct FakeAdapter {
    script: SharedScript,
    connected: bool,
}

#[async_trait]
impl ProtocolAdapter for FakeAdapter {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Modbus
    }

    fn endpoint(&self) -> String {
        "fake:502/unit1".to_string()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, _timeout: Duration) -> Result<(), ConnectionError> {
        let fails = {
            let mut script = self.script.lock().expect("script");
            script.connects += 1;
            script.connect_fails_forever
        };
        if fails {
            return Err(ConnectionError::Refused("fake controller offline".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn read_batch(&mut self, tags: &[TagDefinition]) -> Result<SampleBatch, ReadError> {
        if !self.connected {
            return Err(ReadError::NotConnected);
        }
        let delay = {
            let mut script = self.script.lock().expect("script");
            script.reads += 1;
            if script.appending {
                script.reads_during_append += 1;
            }
            script.in_flight += 1;
            script.max_in_flight = script.max_in_flight.max(script.in_flight);
            script.read_delay
        };
        tokio::time::sleep(delay).await;
        let (result, start) = {
            let mut script = self.script.lock().expect("script");
            script.in_flight -= 1;
            let start = script.start_levels.pop_front().unwrap_or(false);
            (script.read_results.pop_front().unwrap_or(Ok(())), start)
        };
        result.map(|()| {
            SampleBatch::new(
                Utc::now(),
                tags.iter()
                    .map(|tag| match tag.name.as_str() {
                        "Start" => Sample::good("Start", SampleValue::Bool(start)),
                        name => Sample::good(name, SampleValue::I64(1)),
                    })
                    .collect(),
            )
        })
    }

    async fn disconnect(&mut self) {
        let hangs = {
            let mut script = self.script.lock().expect("script");
            script.disconnects += 1;
            script.disconnect_hangs
        };
        self.connected = false;
        if hangs {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Default)]
struct FailingStore {
    fail_provision: bool,
}

#[async_trait]
impl SampleStore for FailingStore {
    async fn provision(&self, _key: &PartitionKey) -> Result<(), StoreError> {
        if self.fail_provision {
            return Err(StoreError::Io(std::io::Error::other("read-only volume")));
        }
        Ok(())
    }

    async fn append(
        &self,
        _fingerprint: &ConfigFingerprint,
        _batch: &SampleBatch,
    ) -> Result<usize, StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk full")))
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionInfo>, StoreError> {
        Ok(Vec::new())
    }

    async fn query(
        &self,
        key: &PartitionKey,
        _query: &SampleQuery,
    ) -> Result<Vec<StoredSample>, StoreError> {
        Err(StoreError::UnknownPartition(key.id()))
    }
}

/// 写入耗时超过轮询间隔的存储。
struct SlowStore {
    script: SharedScript,
    delay: Duration,
    inner: InMemorySampleStore,
}

#[async_trait]
impl SampleStore for SlowStore {
    async fn provision(&self, key: &PartitionKey) -> Result<(), StoreError> {
        self.inner.provision(key).await
    }

    async fn append(
        &self,
        fingerprint: &ConfigFingerprint,
        batch: &SampleBatch,
    ) -> Result<usize, StoreError> {
        self.script.lock().expect("script").appending = true;
        tokio::time::sleep(self.delay).await;
        self.script.lock().expect("script").appending = false;
        self.inner.append(fingerprint, batch).await
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionInfo>, StoreError> {
        self.inner.list_partitions().await
    }

    async fn query(
        &self,
        key: &PartitionKey,
        query: &SampleQuery,
    ) -> Result<Vec<StoredSample>, StoreError> {
        self.inner.query(key, query).await
    }
}

/// 只报告丢弃计数的出口。
struct LossySink {
    dropped: u64,
}

impl TelemetrySink for LossySink {
    fn emit(&self, _event: TelemetryEvent) {}

    fn dropped(&self) -> u64 {
        self.dropped
    }
}

fn tags() -> Vec<TagDefinition> {
    vec![TagDefinition::new(
        "Speed",
        TagAddress::Register(RegisterAddress {
            kind: RegisterKind::Holding,
            offset: 0,
            data_type: RegisterDataType::Int16,
            bit: None,
            byte_order: Default::default(),
            word_order: Default::default(),
        }),
    )]
}

fn tags_with_start() -> Vec<TagDefinition> {
    let mut tags = tags();
    tags.push(TagDefinition::new(
        "Start",
        TagAddress::Register(RegisterAddress {
            kind: RegisterKind::Coil,
            offset: 0,
            data_type: RegisterDataType::Bool,
            bit: None,
            byte_order: Default::default(),
            word_order: Default::default(),
        }),
    ));
    tags
}

fn fingerprint() -> ConfigFingerprint {
    ConfigFingerprint::from_hex("feedfacefeedface").expect("hex")
}

fn options() -> SchedulerOptions {
    SchedulerOptions {
        interval: Duration::from_millis(500),
        timeout: Duration::from_millis(3000),
        store_timeout: Duration::from_millis(5000),
        subscriber_capacity: 16,
        monitor: MonitorOptions {
            backoff: BackoffPolicy {
                min: Duration::from_millis(500),
                cap: Duration::from_millis(4000),
                jitter: 0.0,
            },
            ..MonitorOptions::default()
        },
    }
}

fn spawn(
    script: &SharedScript,
    store: Arc<dyn SampleStore>,
    sink: &Arc<MemorySink>,
    options: SchedulerOptions,
    paused: bool,
) -> SchedulerHandle {
    let adapter = FakeAdapter {
        script: script.clone(),
        connected: false,
    };
    Scheduler::new(
        Box::new(adapter),
        tags(),
        fingerprint(),
        store,
        sink.clone(),
        options,
    )
    .start_paused(paused)
    .spawn()
}

fn transitions(sink: &MemorySink) -> Vec<String> {
    sink.named("state_changed")
        .iter()
        .filter_map(|event| event.field_value("to").map(str::to_string))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn cycles_never_overlap() {
    let script: SharedScript = Arc::default();
    script.lock().expect("script").read_delay = Duration::from_millis(700);
    let store = Arc::new(InMemorySampleStore::new());
    let sink = Arc::new(MemorySink::new());
    let handle = spawn(&script, store.clone(), &sink, options(), false);

    tokio::time::sleep(Duration::from_secs(5)).await;

    let metrics = handle.metrics();
    {
        let script = script.lock().expect("script");
        assert_eq!(script.max_in_flight, 1);
        assert!(script.reads >= 5, "reads = {}", script.reads);
    }
    // 每个成功周期恰好写入一个批次
    assert_eq!(store.total_rows() as u64, metrics.reads_ok);
    assert_eq!(metrics.store_ok, metrics.reads_ok);

    assert_eq!(
        handle.stop(Duration::from_secs(1)).await.expect("stop"),
        StopOutcome::Graceful
    );
}

#[tokio::test(start_paused = true)]
async fn five_connect_failures_back_off_to_cap() {
    let script: SharedScript = Arc::default();
    script.lock().expect("script").connect_fails_forever = true;
    let sink = Arc::new(MemorySink::new());
    let handle = spawn(
        &script,
        Arc::new(InMemorySampleStore::new()),
        &sink,
        options(),
        false,
    );

    // 失败时刻：0, 0.5, 1.5, 3.5, 7.5 秒；第六次在 11.5 秒
    tokio::time::sleep(Duration::from_secs(9)).await;

    let waits: Vec<String> = sink
        .named("connect_failed")
        .iter()
        .filter_map(|event| event.field_value("retry_in_ms").map(str::to_string))
        .collect();
    assert_eq!(waits, vec!["500", "1000", "2000", "4000", "4000"]);

    let mut expected = Vec::new();
    for _ in 0..5 {
        expected.push("connecting".to_string());
        expected.push("disconnected".to_string());
    }
    assert_eq!(transitions(&sink), expected);

    let state = handle.state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.consecutive_failures, 5);
    assert_eq!(state.next_retry_in_ms, Some(4000));

    let metrics = handle.metrics();
    assert_eq!(metrics.connect_attempts, 5);
    assert_eq!(metrics.connect_failures, 5);
    assert!(metrics.skipped_cycles > 0);
    assert_eq!(metrics.reads_ok, 0);

    handle.stop(Duration::from_secs(1)).await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn store_errors_do_not_stop_polling() {
    let script: SharedScript = Arc::default();
    let sink = Arc::new(MemorySink::new());
    let handle = spawn(
        &script,
        Arc::new(FailingStore::default()),
        &sink,
        options(),
        false,
    );
    let mut batches = handle.subscribe_batches();

    tokio::time::sleep(Duration::from_millis(3100)).await;

    let metrics = handle.metrics();
    assert!(metrics.reads_ok >= 4, "reads_ok = {}", metrics.reads_ok);
    assert_eq!(metrics.store_failed, metrics.reads_ok);
    assert_eq!(metrics.store_ok, 0);
    assert!(metrics.cycles > metrics.reads_ok);

    let failures = sink.named("store_failed");
    assert_eq!(failures.len() as u64, metrics.store_failed);
    assert!(failures.iter().all(|e| e.level == TelemetryLevel::Error));

    // 存储失败不影响连接状态与订阅者
    assert_eq!(handle.state().status, ConnectionStatus::Connected);
    assert!(handle.latest_batch().is_some());
    let batch = batches.try_recv().expect("broadcast batch");
    assert_eq!(batch.len(), 1);

    handle.stop(Duration::from_secs(1)).await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn unwritable_partition_is_fatal() {
    let script: SharedScript = Arc::default();
    let sink = Arc::new(MemorySink::new());
    let handle = spawn(
        &script,
        Arc::new(FailingStore {
            fail_provision: true,
        }),
        &sink,
        options(),
        false,
    );

    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = handle
        .stop(Duration::from_secs(1))
        .await
        .expect_err("fatal");
    assert!(matches!(err, SchedulerError::Fatal { .. }));

    let events = sink.named("partition_unwritable");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, TelemetryLevel::Error);
    assert_eq!(script.lock().expect("script").connects, 0);
}

#[tokio::test(start_paused = true)]
async fn read_failures_degrade_then_reconnect() {
    let script: SharedScript = Arc::default();
    {
        let mut script = script.lock().expect("script");
        for _ in 0..4 {
            script.read_results.push_back(Err(ReadError::Timeout(100)));
        }
    }
    let mut opts = options();
    opts.monitor.failure_threshold = 2;
    opts.monitor.hard_failure_ceiling = 4;
    let sink = Arc::new(MemorySink::new());
    let handle = spawn(
        &script,
        Arc::new(InMemorySampleStore::new()),
        &sink,
        opts,
        false,
    );
    let states = handle.subscribe_state();

    // 0s 连接；0.5-2.0s 四次读取失败；2.5s 重连；3.0s 读取成功
    tokio::time::sleep(Duration::from_millis(3200)).await;

    assert_eq!(
        transitions(&sink),
        vec![
            "connecting",
            "connected",
            "degraded",
            "disconnected",
            "connecting",
            "connected"
        ]
    );
    let state = handle.state();
    assert_eq!(state.status, ConnectionStatus::Connected);
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(states.borrow().status, ConnectionStatus::Connected);

    let metrics = handle.metrics();
    assert_eq!(metrics.reads_failed, 4);
    assert!(metrics.reads_ok >= 1);
    assert_eq!(sink.named("disconnected").len(), 1);
    assert_eq!(script.lock().expect("script").connects, 2);

    handle.stop(Duration::from_secs(1)).await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn fatal_read_error_disconnects_immediately() {
    let script: SharedScript = Arc::default();
    script
        .lock()
        .expect("script")
        .read_results
        .push_back(Err(ReadError::Transport("connection reset".to_string())));
    let sink = Arc::new(MemorySink::new());
    let handle = spawn(
        &script,
        Arc::new(InMemorySampleStore::new()),
        &sink,
        options(),
        false,
    );

    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(handle.state().status, ConnectionStatus::Disconnected);
    assert_eq!(handle.state().next_retry_in_ms, Some(500));
    assert_eq!(script.lock().expect("script").disconnects, 1);

    handle.stop(Duration::from_secs(1)).await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn pause_disconnects_and_resume_reconnects() {
    let script: SharedScript = Arc::default();
    let sink = Arc::new(MemorySink::new());
    let handle = spawn(
        &script,
        Arc::new(InMemorySampleStore::new()),
        &sink,
        options(),
        true,
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(handle.is_paused());
    assert_eq!(script.lock().expect("script").connects, 0);
    assert_eq!(handle.metrics().cycles, 0);

    handle.resume();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(script.lock().expect("script").connects, 1);
    assert!(script.lock().expect("script").reads >= 1);
    assert_eq!(handle.state().status, ConnectionStatus::Connected);

    handle.pause();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.state().status, ConnectionStatus::Disconnected);
    let reads = {
        let script = script.lock().expect("script");
        assert_eq!(script.disconnects, 1);
        script.reads
    };
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(script.lock().expect("script").reads, reads);

    handle.stop(Duration::from_secs(1)).await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_in_flight_read() {
    let script: SharedScript = Arc::default();
    script.lock().expect("script").read_delay = Duration::from_secs(3600);
    let sink = Arc::new(MemorySink::new());
    let mut opts = options();
    opts.timeout = Duration::from_secs(7200);
    let handle = spawn(
        &script,
        Arc::new(InMemorySampleStore::new()),
        &sink,
        opts,
        false,
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(script.lock().expect("script").reads, 1);

    let outcome = handle.stop(Duration::from_secs(1)).await.expect("stop");
    assert_eq!(outcome, StopOutcome::Graceful);
    assert_eq!(handle.state().status, ConnectionStatus::Disconnected);
    assert_eq!(script.lock().expect("script").disconnects, 1);
    assert_eq!(sink.named("scheduler_stopped").len(), 1);

    assert_eq!(
        handle.stop(Duration::from_secs(1)).await.expect("again"),
        StopOutcome::AlreadyStopped
    );
}

#[tokio::test(start_paused = true)]
async fn stop_aborts_after_grace_period() {
    let script: SharedScript = Arc::default();
    script.lock().expect("script").disconnect_hangs = true;
    let sink = Arc::new(MemorySink::new());
    let handle = spawn(
        &script,
        Arc::new(InMemorySampleStore::new()),
        &sink,
        options(),
        false,
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    let outcome = handle
        .stop(Duration::from_millis(200))
        .await
        .expect("stop");
    assert_eq!(outcome, StopOutcome::Aborted);
    assert!(sink.named("scheduler_stopped").is_empty());
}

#[tokio::test(start_paused = true)]
async fn rows_land_in_fingerprint_partition() {
    let script: SharedScript = Arc::default();
    let store = Arc::new(InMemorySampleStore::new());
    let sink = Arc::new(MemorySink::new());
    let handle = spawn(&script, store.clone(), &sink, options(), false);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    handle.stop(Duration::from_secs(1)).await.expect("stop");

    let partitions = store.list_partitions().await.expect("list");
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].fingerprint, fingerprint());
    let latest = handle.latest_batch().expect("latest");
    let rows = store
        .query(&partitions[0].key(), &SampleQuery::default())
        .await
        .expect("query");
    assert_eq!(rows.last().map(|row| row.ts_ms), Some(latest.ts_ms()));
}

#[tokio::test(start_paused = true)]
async fn slow_append_delays_next_read() {
    let script: SharedScript = Arc::default();
    let store = Arc::new(SlowStore {
        script: script.clone(),
        delay: Duration::from_millis(700),
        inner: InMemorySampleStore::new(),
    });
    let sink = Arc::new(MemorySink::new());
    let handle = spawn(&script, store.clone(), &sink, options(), false);

    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.stop(Duration::from_secs(1)).await.expect("stop");

    let metrics = handle.metrics();
    let script = script.lock().expect("script");
    assert!(script.reads >= 3, "reads = {}", script.reads);
    assert_eq!(script.reads_during_append, 0);
    assert_eq!(script.max_in_flight, 1);
    assert_eq!(store.inner.total_rows() as u64, metrics.store_ok);
}

#[tokio::test(start_paused = true)]
async fn trigger_stores_only_rising_edges() {
    let script: SharedScript = Arc::default();
    script
        .lock()
        .expect("script")
        .start_levels
        .extend([false, true, true, false, true]);
    let store = Arc::new(InMemorySampleStore::new());
    let sink = Arc::new(MemorySink::new());
    let adapter = FakeAdapter {
        script: script.clone(),
        connected: false,
    };
    let handle = Scheduler::new(
        Box::new(adapter),
        tags_with_start(),
        fingerprint(),
        store.clone(),
        sink.clone(),
        options(),
    )
    .with_trigger("Start")
    .spawn();
    let mut batches = handle.subscribe_batches();

    // 0s 连接；0.5-3.0s 六次读取，第 2、5 次为上升沿
    tokio::time::sleep(Duration::from_millis(3200)).await;
    handle.stop(Duration::from_secs(1)).await.expect("stop");

    let metrics = handle.metrics();
    assert!(metrics.reads_ok >= 6, "reads_ok = {}", metrics.reads_ok);
    assert_eq!(metrics.store_ok, 2);
    assert_eq!(metrics.untriggered, metrics.reads_ok - 2);
    assert_eq!(store.total_rows(), 4);
    assert_eq!(sink.named("trigger_fired").len(), 2);

    // 未落库的批次照常广播
    let mut received = 0;
    while batches.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received as u64, metrics.reads_ok);
}

#[tokio::test(start_paused = true)]
async fn metrics_report_dropped_telemetry() {
    let script: SharedScript = Arc::default();
    let adapter = FakeAdapter {
        script: script.clone(),
        connected: false,
    };
    let handle = Scheduler::new(
        Box::new(adapter),
        tags(),
        fingerprint(),
        Arc::new(InMemorySampleStore::new()),
        Arc::new(LossySink { dropped: 7 }),
        options(),
    )
    .spawn();

    tokio::time::sleep(Duration::from_millis(600)).await;
    let metrics = handle.metrics();
    assert_eq!(metrics.telemetry_dropped, 7);
    assert!(metrics.reads_ok >= 1);

    handle.stop(Duration::from_secs(1)).await.expect("stop");
}
