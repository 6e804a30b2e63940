//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：bad_request_error, not_found_error, storage_error
//! - DTO 转换：connection_to_dto, scheduler_summary_to_dto, partition_to_dto, sample_to_dto

use api_contract::{
    AcquisitionMetricsDto, ApiResponse, ConnectionDto, PartitionDto, SchedulerSummaryDto,
    StoredSampleDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::SampleValue;
use plc_acquisition::SchedulerHandle;
use plc_storage::{PartitionInfo, StoreError, StoredSample};
use plc_telemetry::MetricsSnapshot;

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("INVALID.REQUEST", message.into())),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", "not found")),
    )
        .into_response()
}

/// 存储错误响应；未知分区映射为 404
pub fn storage_error(err: StoreError) -> Response {
    if matches!(err, StoreError::UnknownPartition(_)) {
        return not_found_error();
    }
    let message = err.to_string();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.ERROR", message)),
    )
        .into_response()
}

pub fn connection_to_dto(handle: &SchedulerHandle) -> ConnectionDto {
    let state = handle.state();
    ConnectionDto {
        protocol: state.protocol.to_string(),
        fingerprint: handle.fingerprint().to_string(),
        status: state.status.to_string(),
        consecutive_failures: state.consecutive_failures,
        last_latency_ms: state.last_latency_ms,
        success_rate: state.success_rate,
        window_len: state.window_len,
        next_retry_in_ms: state.next_retry_in_ms,
        last_error: state.last_error,
        paused: handle.is_paused(),
        session_id: handle.session_id().to_string(),
        last_batch_ts_ms: handle.latest_batch().map(|batch| batch.ts_ms()),
        metrics: metrics_to_dto(handle.metrics()),
    }
}

pub fn scheduler_summary_to_dto(handle: &SchedulerHandle) -> SchedulerSummaryDto {
    SchedulerSummaryDto {
        protocol: handle.protocol().to_string(),
        fingerprint: handle.fingerprint().to_string(),
        paused: handle.is_paused(),
    }
}

fn metrics_to_dto(snapshot: MetricsSnapshot) -> AcquisitionMetricsDto {
    AcquisitionMetricsDto {
        cycles: snapshot.cycles,
        reads_ok: snapshot.reads_ok,
        reads_failed: snapshot.reads_failed,
        skipped_cycles: snapshot.skipped_cycles,
        connect_attempts: snapshot.connect_attempts,
        connect_failures: snapshot.connect_failures,
        store_ok: snapshot.store_ok,
        store_failed: snapshot.store_failed,
        samples_written: snapshot.samples_written,
        bad_samples: snapshot.bad_samples,
        read_latency_ms_total: snapshot.read_latency_ms_total,
        read_latency_ms_count: snapshot.read_latency_ms_count,
        untriggered: snapshot.untriggered,
        telemetry_dropped: snapshot.telemetry_dropped,
    }
}

pub fn partition_to_dto(info: PartitionInfo) -> PartitionDto {
    PartitionDto {
        id: info.id,
        fingerprint: info.fingerprint.to_string(),
        date: info.date.format("%Y-%m-%d").to_string(),
        size_bytes: info.size_bytes,
    }
}

pub fn sample_to_dto(row: StoredSample) -> StoredSampleDto {
    StoredSampleDto {
        ts_ms: row.ts_ms,
        ts_utc: row.ts_utc,
        tag: row.tag_name,
        value: row.value.map(value_to_json),
        quality: row.quality,
    }
}

fn value_to_json(value: SampleValue) -> serde_json::Value {
    match value {
        SampleValue::Bool(v) => serde_json::Value::Bool(v),
        SampleValue::I64(v) => serde_json::Value::from(v),
        // NaN/Inf 没有 JSON 表示，输出 null
        SampleValue::F64(v) => serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SampleValue::String(v) => serde_json::Value::String(v),
    }
}
