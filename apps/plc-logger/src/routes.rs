//! 路由定义
//!
//! 诊断接口：
//! - 健康检查：/health
//! - 连接状态：/api/connections
//! - 采集开关：/api/connections/:protocol/pause, /api/connections/:protocol/resume
//! - 分区：/api/partitions, /api/partitions/:partition_id/samples

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{get, post},
};

/// 创建诊断路由
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/connections", get(list_connections))
        .route("/api/connections/:protocol/pause", post(pause_connection))
        .route("/api/connections/:protocol/resume", post(resume_connection))
        .route("/api/partitions", get(list_partitions))
        .route("/api/partitions/:partition_id/samples", get(list_samples))
}
