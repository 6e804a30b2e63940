//! PLC 采集进程：加载配置、按协议启动调度器、可选的诊断接口。

mod handlers;
mod routes;
mod runtime;
mod utils;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
};
use plc_acquisition::SchedulerHandle;
use plc_config::{AppConfig, ConfigProvider, JsonFileConfigProvider};
use plc_storage::{SampleStore, SqliteSampleStore};
use plc_telemetry::{TelemetryRuntime, TelemetrySink, init_tracing, new_request_ids};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info};

#[derive(Clone)]
pub struct AppState {
    pub schedulers: Arc<Vec<Arc<SchedulerHandle>>>,
    pub store: Arc<dyn SampleStore>,
    pub sink: Arc<dyn TelemetrySink>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let (sink, telemetry) = TelemetryRuntime::start(config.telemetry_capacity);
    let sink: Arc<dyn TelemetrySink> = sink;

    let provider = JsonFileConfigProvider::new(&config.config_file);
    let logger = provider.load()?;
    info!(
        target: "plc.runtime",
        fingerprint = %logger.fingerprint(),
        config_file = %config.config_file.display(),
        data_dir = %config.data_dir.display(),
        auto_start = logger.auto_start,
        "logger_starting"
    );

    let sqlite = Arc::new(
        SqliteSampleStore::new(&config.data_dir).with_busy_timeout(logger.polling.store_timeout()),
    );
    let store: Arc<dyn SampleStore> = sqlite.clone();
    let schedulers = runtime::spawn_schedulers(&logger, store.clone(), sink.clone());
    let schedulers = Arc::new(schedulers);

    let server = match &config.http_addr {
        Some(addr) => {
            let state = AppState {
                schedulers: schedulers.clone(),
                store,
                sink,
            };
            let app = routes::create_api_router()
                .with_state(state)
                .layer(TraceLayer::new_for_http())
                // 注入 request_id/trace_id
                .layer(middleware::from_fn(request_context));
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(target: "plc.runtime", addr = %addr, "diagnostics_listening");
            Some(tokio::spawn(async move {
                if let Err(err) = axum::serve(listener, app).await {
                    error!(target: "plc.runtime", error = %err, "diagnostics_server_failed");
                }
            }))
        }
        None => None,
    };

    tokio::signal::ctrl_c().await?;
    info!(target: "plc.runtime", "shutdown_requested");

    runtime::stop_all(&schedulers, Duration::from_millis(config.stop_grace_ms)).await;
    if let Some(server) = server {
        server.abort();
    }
    sqlite.close().await;
    telemetry.shutdown().await;
    info!(target: "plc.runtime", "logger_stopped");
    Ok(())
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}
