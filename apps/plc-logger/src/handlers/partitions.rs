//! 分区列表与样本查询
//!
//! - GET /api/partitions
//! - GET /api/partitions/:partition_id/samples?tag=&fromMs=&toMs=&limit=

use api_contract::{ApiResponse, SamplesQuery};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::PartitionKey;
use plc_storage::SampleQuery;

use crate::{
    AppState,
    utils::response::{bad_request_error, partition_to_dto, sample_to_dto, storage_error},
};

const DEFAULT_LIMIT: i64 = 1000;
const MAX_LIMIT: i64 = 5000;

pub async fn list_partitions(State(state): State<AppState>) -> Response {
    match state.store.list_partitions().await {
        Ok(partitions) => {
            let items: Vec<_> = partitions.into_iter().map(partition_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(items))).into_response()
        }
        Err(err) => storage_error(err),
    }
}

pub async fn list_samples(
    State(state): State<AppState>,
    Path(partition_id): Path<String>,
    Query(query): Query<SamplesQuery>,
) -> Response {
    let Some(key) = PartitionKey::parse_id(&partition_id) else {
        return bad_request_error("invalid partition id");
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return bad_request_error("limit must be between 1 and 5000");
    }
    if let (Some(from), Some(to)) = (query.from_ms, query.to_ms) {
        if from > to {
            return bad_request_error("fromMs must not be after toMs");
        }
    }

    let query = SampleQuery {
        tag: query.tag.filter(|tag| !tag.trim().is_empty()),
        from_ms: query.from_ms,
        to_ms: query.to_ms,
        limit,
    };
    match state.store.query(&key, &query).await {
        Ok(rows) => {
            let items: Vec<_> = rows.into_iter().map(sample_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(items))).into_response()
        }
        Err(err) => storage_error(err),
    }
}
