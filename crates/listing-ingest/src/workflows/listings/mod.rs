//! Listing export ingestion: read a delimited export, coerce every row into the fixed catalog,
//! validate the batch and upsert accepted records into the warehouse and the search index.

mod address;
mod fields;
pub mod normalizer;
pub mod record;
pub mod report;
pub mod schema;
pub mod source;
pub mod validator;
pub mod writer;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, error, info, warn};

pub use normalizer::{normalize, NormalizationError};
pub use record::NormalizedRecord;
pub use report::{IngestionReport, RowDisposition, RowReport, RunStatus, SinkTally};
pub use schema::{FieldType, FieldValue, ListingField};
pub use source::{RawRow, SourceOptions, SourceReadError, UnknownColumnPolicy};
pub use validator::{
    BatchValidator, DuplicatePolicy, RejectionReason, ValidationError, ValidationOutcome,
};
pub use writer::{DualSinkWriter, FailureKind, RetryPolicy, SinkTargets, WriteOutcome};

#[derive(Debug, Clone, Copy)]
pub struct IngestionSettings {
    pub source: SourceOptions,
    pub duplicates: DuplicatePolicy,
    /// Records written concurrently. Each record still writes both sinks in parallel.
    pub max_concurrency: usize,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            source: SourceOptions::default(),
            duplicates: DuplicatePolicy::default(),
            max_concurrency: 8,
        }
    }
}

/// Drives one file through read, normalize, validate and write.
///
/// Only a file that cannot be read at all fails the run; every other problem is confined to
/// its row and shows up in the report.
#[derive(Clone)]
pub struct IngestionCoordinator {
    settings: IngestionSettings,
    writer: DualSinkWriter,
}

impl IngestionCoordinator {
    pub fn new(settings: IngestionSettings, writer: DualSinkWriter) -> Self {
        Self { settings, writer }
    }

    pub async fn run_path<P: AsRef<Path>>(
        &self,
        path: P,
        reference_date: NaiveDate,
    ) -> Result<IngestionReport, SourceReadError> {
        let path = path.as_ref();
        info!(path = %path.display(), "ingesting listing file");
        let file = File::open(path)?;
        self.run_reader(file, reference_date).await
    }

    /// `reference_date` bounds plausible build years; pass the current date in production.
    pub async fn run_reader<R: Read>(
        &self,
        reader: R,
        reference_date: NaiveDate,
    ) -> Result<IngestionReport, SourceReadError> {
        let batch = source::read_rows(reader, &self.settings.source)?;
        if !batch.ignored_columns.is_empty() {
            warn!(columns = ?batch.ignored_columns, "ignoring columns outside the catalog");
        }

        let mut rows = Vec::with_capacity(batch.rows.len());
        // Report slots and records of the rows that normalized, in file order.
        let mut slots = Vec::new();
        let mut records = Vec::new();
        for row in batch.rows {
            let slot = rows.len();
            match row {
                Ok(raw) => {
                    let normalized = normalize(&raw);
                    let (record_id, disposition) = match &normalized {
                        Ok(record) => (Some(record.id.clone()), RowDisposition::Accepted),
                        Err(err) => (
                            None,
                            RowDisposition::Rejected {
                                reason: err.clone().into(),
                            },
                        ),
                    };
                    rows.push(RowReport {
                        row_number: raw.row_number,
                        line: raw.line,
                        record_id,
                        disposition,
                        warehouse: None,
                        search: None,
                    });
                    if let Ok(record) = normalized {
                        slots.push(slot);
                        records.push(record);
                    }
                }
                Err(malformed) => rows.push(RowReport {
                    row_number: malformed.row_number,
                    line: malformed.line,
                    record_id: None,
                    disposition: RowDisposition::Rejected {
                        reason: RejectionReason::malformed_row(malformed.message),
                    },
                    warehouse: None,
                    search: None,
                }),
            }
        }

        let validator = BatchValidator::new(reference_date, self.settings.duplicates);
        let outcomes = validator.validate(&records);

        let mut accepted: Vec<(usize, NormalizedRecord)> = Vec::new();
        for ((slot, record), outcome) in slots.iter().copied().zip(records).zip(outcomes) {
            let disposition = match outcome {
                ValidationOutcome::Accepted => {
                    accepted.push((slot, record));
                    continue;
                }
                ValidationOutcome::Rejected(reason) => RowDisposition::Rejected { reason },
                ValidationOutcome::SupersededInBatch { superseded_by } => {
                    RowDisposition::SupersededInBatch {
                        superseded_by_row: rows[slots[superseded_by]].row_number,
                    }
                }
            };
            rows[slot].disposition = disposition;
        }

        for row in &rows {
            match &row.disposition {
                RowDisposition::Rejected { reason } => warn!(
                    row_number = row.row_number,
                    code = reason.code,
                    field = reason.field.map(ListingField::name),
                    "row rejected: {}",
                    reason.message
                ),
                RowDisposition::SupersededInBatch { superseded_by_row } => debug!(
                    row_number = row.row_number,
                    superseded_by_row,
                    "row superseded by a later duplicate"
                ),
                RowDisposition::Accepted => {}
            }
        }

        info!(
            rows = rows.len(),
            blank_rows = batch.blank_rows,
            accepted = accepted.len(),
            "validated listing batch"
        );

        let writer = &self.writer;
        let written: Vec<(usize, WriteOutcome, WriteOutcome)> = stream::iter(accepted)
            .map(|(slot, record)| async move {
                let (warehouse, search) = writer.commit(&record).await;
                (slot, warehouse, search)
            })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        for (slot, warehouse, search) in written {
            rows[slot].warehouse = Some(warehouse);
            rows[slot].search = Some(search);
        }

        let report = IngestionReport::from_rows(rows, batch.blank_rows, batch.ignored_columns);
        if report.has_permanent_failures() {
            error!(
                warehouse_permanent = report.warehouse.permanent_failures,
                search_permanent = report.search.permanent_failures,
                "listing batch hit permanent sink failures"
            );
        }
        info!(
            status = ?report.status,
            accepted = report.accepted,
            rejected = report.rejected,
            superseded = report.superseded_in_batch,
            warehouse_committed = report.warehouse.committed,
            search_committed = report.search.committed,
            "listing batch finished"
        );
        Ok(report)
    }
}
