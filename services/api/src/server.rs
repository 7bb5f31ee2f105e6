use crate::cli::ServeArgs;
use crate::infra::{build_coordinator, AppState};
use crate::routes::ingest_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use listing_ingest::config::AppConfig;
use listing_ingest::error::AppError;
use listing_ingest::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        coordinator: Arc::new(build_coordinator(&config, false)?),
    };

    let app = ingest_routes()
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "listing ingest service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
