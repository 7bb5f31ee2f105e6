//! Destinations for normalized listings.
//!
//! Both sinks are keyed by the record identity and must be idempotent: writing the same record
//! twice leaves the same state as writing it once. Implementations report whether a write
//! changed anything so the pipeline can tell committed writes from no-ops.

pub mod memory;
pub mod opensearch;
pub mod postgres;

use crate::workflows::listings::{ListingField, NormalizedRecord};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

pub use memory::{InMemorySearchIndex, InMemoryWarehouse};
pub use self::opensearch::OpenSearchIndex;
pub use postgres::PostgresWarehouse;

/// Effect of one keyed upsert on the sink's stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertStatus {
    Inserted,
    Replaced,
    Unchanged,
}

/// Sink failures split by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Timeouts, throttling, dropped connections.
    #[error("transient sink error: {0}")]
    Transient(String),
    /// Authentication, schema mismatch, malformed requests.
    #[error("permanent sink error: {0}")]
    Permanent(String),
}

impl SinkError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Permanent(msg) => msg,
        }
    }
}

/// Analytical table keyed by `id`.
#[async_trait]
pub trait WarehouseSink: Send + Sync {
    /// Inserts the record, or replaces every column of the existing row with the same `id`.
    async fn upsert(
        &self,
        table: &str,
        record: &NormalizedRecord,
    ) -> Result<UpsertStatus, SinkError>;
}

/// Full-text/faceted index keyed by `id`.
#[async_trait]
pub trait SearchSink: Send + Sync {
    /// Indexes the document under `id`, replacing any previous version.
    async fn index(
        &self,
        index_name: &str,
        id: &str,
        document: &SearchDocument,
    ) -> Result<UpsertStatus, SinkError>;
}

/// The search-side projection of a record: catalog fields minus any configured exclusions,
/// dates as ISO-8601 strings and explicit nulls so a write always overwrites every field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SearchDocument(Map<String, Value>);

impl SearchDocument {
    pub fn from_record(record: &NormalizedRecord, excluded: &[ListingField]) -> Self {
        let fields = record
            .values()
            .into_iter()
            .filter(|(field, _)| !excluded.contains(field))
            .map(|(field, value)| (field.name().to_string(), value.to_json()))
            .collect();
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}
