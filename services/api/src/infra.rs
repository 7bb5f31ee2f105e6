use listing_ingest::config::AppConfig;
use listing_ingest::error::AppError;
use listing_ingest::sinks::{
    InMemorySearchIndex, InMemoryWarehouse, OpenSearchIndex, PostgresWarehouse, SearchSink,
    WarehouseSink,
};
use listing_ingest::workflows::listings::{DualSinkWriter, IngestionCoordinator};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const WAREHOUSE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) coordinator: Arc<IngestionCoordinator>,
}

/// Wires the configured sinks into a coordinator. Unset URLs and dry runs fall back to
/// in-memory sinks.
pub(crate) fn build_coordinator(
    config: &AppConfig,
    dry_run: bool,
) -> Result<IngestionCoordinator, AppError> {
    let warehouse: Arc<dyn WarehouseSink> = match config.warehouse.database_url.as_deref() {
        Some(url) if !dry_run => {
            let max_connections = u32::try_from(config.ingest.max_concurrency).unwrap_or(u32::MAX);
            info!(table = %config.warehouse.table, "writing to postgres warehouse");
            Arc::new(PostgresWarehouse::connect_lazy(
                url,
                max_connections,
                WAREHOUSE_ACQUIRE_TIMEOUT,
            )?)
        }
        _ => {
            info!("writing to in-memory warehouse");
            Arc::new(InMemoryWarehouse::default())
        }
    };

    let search: Arc<dyn SearchSink> = match config.search.url.as_deref() {
        Some(url) if !dry_run => {
            info!(index = %config.search.index, "writing to opensearch index");
            Arc::new(OpenSearchIndex::connect(url, config.search.credentials())?)
        }
        _ => {
            info!("writing to in-memory search index");
            Arc::new(InMemorySearchIndex::default())
        }
    };

    let writer = DualSinkWriter::new(
        warehouse,
        search,
        config.sink_targets(),
        config.retry_policy(),
    );
    Ok(IngestionCoordinator::new(config.ingestion_settings(), writer))
}
