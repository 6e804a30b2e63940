use api_contract::{ApiResponse, HealthDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{AppState, utils::response::scheduler_summary_to_dto};

pub async fn health(State(state): State<AppState>) -> Response {
    let dto = HealthDto {
        ok: true,
        schedulers: state
            .schedulers
            .iter()
            .map(|handle| scheduler_summary_to_dto(handle))
            .collect(),
        telemetry_dropped: state.sink.dropped(),
    };
    (StatusCode::OK, Json(ApiResponse::success(dto))).into_response()
}
