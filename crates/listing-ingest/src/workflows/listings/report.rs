use super::validator::RejectionReason;
use super::writer::{FailureKind, WriteOutcome};
use serde::Serialize;
use std::collections::BTreeMap;

/// What the validator decided for one source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowDisposition {
    Accepted,
    Rejected { reason: RejectionReason },
    /// A later row of the same file carries the same identity and was written instead.
    SupersededInBatch { superseded_by_row: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowReport {
    pub row_number: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(flatten)]
    pub disposition: RowDisposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<WriteOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<WriteOutcome>,
}

impl RowReport {
    pub fn is_accepted(&self) -> bool {
        matches!(self.disposition, RowDisposition::Accepted)
    }

    pub fn rejection(&self) -> Option<&RejectionReason> {
        match &self.disposition {
            RowDisposition::Rejected { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Per-sink outcome counts over the accepted rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkTally {
    pub committed: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub permanent_failures: usize,
}

impl SinkTally {
    fn record(&mut self, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::Committed => self.committed += 1,
            WriteOutcome::SkippedDuplicate => self.skipped_duplicate += 1,
            WriteOutcome::Failed { kind, .. } => {
                self.failed += 1;
                if *kind == FailureKind::Permanent {
                    self.permanent_failures += 1;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every non-blank row was written to both sinks or already present there.
    Clean,
    /// Some rows were rejected or superseded; every accepted row reached both sinks.
    CompletedWithRejects,
    /// At least one sink write failed.
    CompletedWithSinkFailures,
}

/// Summary of one ingestion run. Counts are derived from the per-row entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub status: RunStatus,
    pub rows_read: usize,
    pub blank_rows_skipped: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub superseded_in_batch: usize,
    pub rejected_by_reason: BTreeMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_columns: Vec<String>,
    pub warehouse: SinkTally,
    pub search: SinkTally,
    pub rows: Vec<RowReport>,
}

impl IngestionReport {
    /// `rows` must be in source order.
    pub fn from_rows(
        rows: Vec<RowReport>,
        blank_rows_skipped: usize,
        ignored_columns: Vec<String>,
    ) -> Self {
        let mut accepted = 0;
        let mut rejected = 0;
        let mut superseded_in_batch = 0;
        let mut rejected_by_reason = BTreeMap::new();
        let mut warehouse = SinkTally::default();
        let mut search = SinkTally::default();

        for row in &rows {
            match &row.disposition {
                RowDisposition::Accepted => accepted += 1,
                RowDisposition::Rejected { reason } => {
                    rejected += 1;
                    *rejected_by_reason.entry(reason.code).or_insert(0) += 1;
                }
                RowDisposition::SupersededInBatch { .. } => superseded_in_batch += 1,
            }
            if let Some(outcome) = &row.warehouse {
                warehouse.record(outcome);
            }
            if let Some(outcome) = &row.search {
                search.record(outcome);
            }
        }

        let status = if warehouse.failed + search.failed > 0 {
            RunStatus::CompletedWithSinkFailures
        } else if rejected + superseded_in_batch > 0 {
            RunStatus::CompletedWithRejects
        } else {
            RunStatus::Clean
        };

        Self {
            status,
            rows_read: rows.len(),
            blank_rows_skipped,
            accepted,
            rejected,
            superseded_in_batch,
            rejected_by_reason,
            ignored_columns,
            warehouse,
            search,
            rows,
        }
    }

    pub fn row(&self, row_number: usize) -> Option<&RowReport> {
        self.rows.iter().find(|row| row.row_number == row_number)
    }

    pub fn has_permanent_failures(&self) -> bool {
        self.warehouse.permanent_failures + self.search.permanent_failures > 0
    }

    /// Rows that reached at least one sink but not the other.
    pub fn divergent_rows(&self) -> impl Iterator<Item = &RowReport> {
        self.rows.iter().filter(|row| {
            match (&row.warehouse, &row.search) {
                (Some(warehouse), Some(search)) => warehouse.is_failed() != search.is_failed(),
                _ => false,
            }
        })
    }
}
