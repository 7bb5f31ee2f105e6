use super::record::NormalizedRecord;
use super::schema::ListingField;
use crate::sinks::{SearchDocument, SearchSink, SinkError, UpsertStatus, WarehouseSink};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, error, warn};

/// Exponential backoff applied to transient sink failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per sink per record, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delays between attempts: `base_delay` doubling per retry, capped at `max_delay`.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        let base_millis = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_delay = self.max_delay;
        // Powers of two starting at 2, halved so the first delay is `base_delay` itself.
        ExponentialBackoff::from_millis(2)
            .factor(base_millis)
            .map(move |delay| (delay / 2).min(max_delay))
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Permanent,
}

/// Final result of writing one record to one sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    Committed,
    /// The sink already held an identical record.
    SkippedDuplicate,
    Failed {
        kind: FailureKind,
        message: String,
        attempts: u32,
    },
}

impl WriteOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Warehouse,
    Search,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warehouse => "warehouse",
            Self::Search => "search",
        })
    }
}

/// Where accepted records land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTargets {
    pub table: String,
    pub index: String,
    /// Catalog fields left out of search documents.
    pub search_excluded: Vec<ListingField>,
}

impl Default for SinkTargets {
    fn default() -> Self {
        Self {
            table: "real_estate.transactions".to_string(),
            index: "real_estate_index_map".to_string(),
            search_excluded: Vec::new(),
        }
    }
}

/// Writes each record to both sinks independently. A failure on one side never rolls back
/// or blocks the other; both outcomes are reported.
#[derive(Clone)]
pub struct DualSinkWriter {
    warehouse: Arc<dyn WarehouseSink>,
    search: Arc<dyn SearchSink>,
    targets: SinkTargets,
    retry: RetryPolicy,
}

impl DualSinkWriter {
    pub fn new(
        warehouse: Arc<dyn WarehouseSink>,
        search: Arc<dyn SearchSink>,
        targets: SinkTargets,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            warehouse,
            search,
            targets,
            retry,
        }
    }

    /// Returns `(warehouse, search)` outcomes for one record.
    pub async fn commit(&self, record: &NormalizedRecord) -> (WriteOutcome, WriteOutcome) {
        let document = SearchDocument::from_record(record, &self.targets.search_excluded);
        let warehouse = self.warehouse.as_ref();
        let search = self.search.as_ref();
        let table = self.targets.table.as_str();
        let index = self.targets.index.as_str();
        let id = record.id.as_str();
        let document = &document;

        let warehouse_write = with_retry(self.retry, SinkKind::Warehouse, id, move || {
            warehouse.upsert(table, record)
        });
        let search_write = with_retry(self.retry, SinkKind::Search, id, move || {
            search.index(index, id, document)
        });
        tokio::join!(warehouse_write, search_write)
    }
}

async fn with_retry<F, Fut>(
    policy: RetryPolicy,
    sink: SinkKind,
    id: &str,
    mut operation: F,
) -> WriteOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<UpsertStatus, SinkError>>,
{
    let attempts = AtomicU32::new(0);
    let action = || {
        attempts.fetch_add(1, Ordering::Relaxed);
        operation()
    };
    let retryable = |err: &SinkError| {
        if err.is_transient() {
            let attempt = attempts.load(Ordering::Relaxed);
            warn!(%sink, id, attempt, error = %err, "transient write failure");
            true
        } else {
            false
        }
    };
    let result = RetryIf::spawn(policy.backoff(), action, retryable).await;
    let attempts = attempts.into_inner();

    match result {
        Ok(UpsertStatus::Unchanged) => {
            debug!(%sink, id, "record already present");
            WriteOutcome::SkippedDuplicate
        }
        Ok(status) => {
            debug!(%sink, id, ?status, attempts, "record written");
            WriteOutcome::Committed
        }
        Err(err) => {
            let kind = if err.is_transient() {
                warn!(%sink, id, attempts, error = %err, "retries exhausted");
                FailureKind::Transient
            } else {
                error!(%sink, id, error = %err, "permanent write failure");
                FailureKind::Permanent
            };
            WriteOutcome::Failed {
                kind,
                message: err.message().to_string(),
                attempts,
            }
        }
    }
}
