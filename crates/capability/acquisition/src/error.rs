use plc_storage::StoreError;

/// 调度器错误。
///
/// 连接、读取、存储错误都在周期内消化；只有以下情况会结束调度任务。
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// 启动时分区不可写
    #[error("partition {partition} is not writable: {source}")]
    Fatal {
        partition: String,
        #[source]
        source: StoreError,
    },
    /// 调度任务异常退出
    #[error("scheduler task failed: {0}")]
    Join(String),
}
