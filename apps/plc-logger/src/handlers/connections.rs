//! 连接健康快照与采集开关
//!
//! - GET /api/connections
//! - POST /api/connections/:protocol/pause
//! - POST /api/connections/:protocol/resume

use api_contract::ApiResponse;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::ProtocolKind;
use plc_acquisition::SchedulerHandle;
use std::sync::Arc;
use tracing::info;

use crate::{
    AppState,
    utils::response::{bad_request_error, connection_to_dto, not_found_error},
};

pub async fn list_connections(State(state): State<AppState>) -> Response {
    let items: Vec<_> = state
        .schedulers
        .iter()
        .map(|handle| connection_to_dto(handle))
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(items))).into_response()
}

pub async fn pause_connection(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
) -> Response {
    match find_scheduler(&state, &protocol) {
        Ok(handle) => {
            handle.pause();
            info!(target: "plc.runtime", protocol = %handle.protocol(), "acquisition_paused");
            (StatusCode::OK, Json(ApiResponse::success(connection_to_dto(&handle))))
                .into_response()
        }
        Err(response) => response,
    }
}

pub async fn resume_connection(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
) -> Response {
    match find_scheduler(&state, &protocol) {
        Ok(handle) => {
            handle.resume();
            info!(target: "plc.runtime", protocol = %handle.protocol(), "acquisition_resumed");
            (StatusCode::OK, Json(ApiResponse::success(connection_to_dto(&handle))))
                .into_response()
        }
        Err(response) => response,
    }
}

/// 未知协议名返回 400；协议未启动调度器返回 404。
fn find_scheduler(state: &AppState, protocol: &str) -> Result<Arc<SchedulerHandle>, Response> {
    let Some(protocol) = ProtocolKind::parse(protocol) else {
        return Err(bad_request_error("protocol must be modbus or ads"));
    };
    state
        .schedulers
        .iter()
        .find(|handle| handle.protocol() == protocol)
        .cloned()
        .ok_or_else(not_found_error)
}
