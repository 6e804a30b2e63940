//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查响应。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub ok: bool,
    /// 每个运行中的调度器一项，各自写入自己的分区
    pub schedulers: Vec<SchedulerSummaryDto>,
    /// 遥测出口累计丢弃的事件
    pub telemetry_dropped: u64,
}

/// 调度器摘要。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSummaryDto {
    pub protocol: String,
    pub fingerprint: String,
    pub paused: bool,
}

/// 单个调度器的采集指标。
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionMetricsDto {
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
    pub untriggered: u64,
    pub telemetry_dropped: u64,
}

/// 协议连接健康快照。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDto {
    pub protocol: String,
    /// 该协议写入的分区指纹
    pub fingerprint: String,
    /// disconnected / connecting / connected / degraded
    pub status: String,
    pub consecutive_failures: u32,
    pub last_latency_ms: Option<u64>,
    pub success_rate: Option<f64>,
    pub window_len: usize,
    pub next_retry_in_ms: Option<u64>,
    pub last_error: Option<String>,
    pub paused: bool,
    pub session_id: String,
    /// 最近一次成功读取的批次时间（毫秒）
    pub last_batch_ts_ms: Option<i64>,
    pub metrics: AcquisitionMetricsDto,
}

/// 数据目录中的分区。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionDto {
    pub id: String,
    pub fingerprint: String,
    /// YYYY-MM-DD
    pub date: String,
    pub size_bytes: Option<u64>,
}

/// 分区中的一行样本。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSampleDto {
    pub ts_ms: i64,
    pub ts_utc: String,
    pub tag: String,
    /// 坏质量样本为 null
    pub value: Option<serde_json::Value>,
    pub quality: bool,
}

/// 样本查询参数。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplesQuery {
    pub tag: Option<String>,
    #[serde(alias = "from_ms")]
    pub from_ms: Option<i64>,
    #[serde(alias = "to_ms")]
    pub to_ms: Option<i64>,
    pub limit: Option<i64>,
}
