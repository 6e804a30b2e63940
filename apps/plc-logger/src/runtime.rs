//! 调度器的启动与停止。

use plc_acquisition::{Scheduler, SchedulerHandle, SchedulerOptions, StopOutcome};
use plc_config::LoggerConfig;
use plc_storage::SampleStore;
use plc_telemetry::TelemetrySink;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 每个已配置且有启用标签的协议启动一个调度器。
///
/// 每个调度器使用自己协议的指纹，分区因此只有一个写入方。
pub fn spawn_schedulers(
    config: &LoggerConfig,
    store: Arc<dyn SampleStore>,
    sink: Arc<dyn TelemetrySink>,
) -> Vec<Arc<SchedulerHandle>> {
    let options = SchedulerOptions::from_polling(&config.polling);
    let mut handles = Vec::new();
    for endpoint in config.endpoints() {
        let protocol = endpoint.protocol();
        let tags = config.enabled_tags(protocol);
        if tags.is_empty() {
            info!(target: "plc.runtime", protocol = %protocol, "protocol_without_tags_skipped");
            continue;
        }
        let fingerprint = config.protocol_fingerprint(&endpoint);
        let trigger = config.trigger_for(protocol);
        info!(
            target: "plc.runtime",
            protocol = %protocol,
            fingerprint = %fingerprint,
            tags = tags.len(),
            trigger = trigger.as_deref().unwrap_or("-"),
            "scheduler_spawning"
        );
        let mut scheduler = Scheduler::new(
            endpoint.build_adapter(),
            tags,
            fingerprint,
            store.clone(),
            sink.clone(),
            options,
        )
        .start_paused(!config.auto_start);
        if let Some(trigger) = trigger {
            scheduler = scheduler.with_trigger(trigger);
        }
        handles.push(Arc::new(scheduler.spawn()));
    }
    handles
}

/// 依次停止；启动阶段失败的调度器在这里报告错误。
pub async fn stop_all(handles: &[Arc<SchedulerHandle>], grace: Duration) {
    for handle in handles {
        match handle.stop(grace).await {
            Ok(StopOutcome::Aborted) => {}
            Ok(outcome) => info!(
                target: "plc.runtime",
                protocol = %handle.protocol(),
                outcome = ?outcome,
                "scheduler_stopped"
            ),
            Err(err) => error!(
                target: "plc.runtime",
                protocol = %handle.protocol(),
                error = %err,
                "scheduler_failed"
            ),
        }
    }
}
