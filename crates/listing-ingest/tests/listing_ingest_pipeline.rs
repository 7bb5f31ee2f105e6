use async_trait::async_trait;
use chrono::NaiveDate;
use listing_ingest::sinks::{
    InMemorySearchIndex, InMemoryWarehouse, SearchDocument, SearchSink, SinkError, UpsertStatus,
    WarehouseSink,
};
use listing_ingest::workflows::listings::{
    DualSinkWriter, DuplicatePolicy, FailureKind, FieldValue, IngestionCoordinator,
    IngestionReport, IngestionSettings, ListingField, RetryPolicy, RowDisposition, RunStatus,
    SinkTargets, SourceOptions, SourceReadError, UnknownColumnPolicy, WriteOutcome,
};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const TABLE: &str = "real_estate.transactions";
const INDEX: &str = "real_estate_index_map";

const EXPORT: &str = "\u{feff}sourcePropertyId,propertyStatus,price,numberOfBeds,streetNumber,streetName,streetType,city,state,zipcode,list_date,presentedBy,email\n\
MLS-1,Active,\"$450,000\",3,123,Main,st,Springfield,il,62704,2024-03-05,Jane Q Public,jane@example.com\n\
MLS-2,Closed,310000,2,9,Oak,Ave,Peoria,IL,61602,,Sam Lee,\"sam@example.com,lee@example.com\"\n";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid reference date")
}

struct Pipeline {
    coordinator: IngestionCoordinator,
    warehouse: Arc<InMemoryWarehouse>,
    search: Arc<InMemorySearchIndex>,
}

fn pipeline_with(settings: IngestionSettings) -> Pipeline {
    let warehouse = Arc::new(InMemoryWarehouse::default());
    let search = Arc::new(InMemorySearchIndex::default());
    let writer = DualSinkWriter::new(
        warehouse.clone(),
        search.clone(),
        SinkTargets::default(),
        RetryPolicy::default(),
    );
    Pipeline {
        coordinator: IngestionCoordinator::new(settings, writer),
        warehouse,
        search,
    }
}

fn pipeline() -> Pipeline {
    pipeline_with(IngestionSettings::default())
}

async fn run(coordinator: &IngestionCoordinator, csv: &str) -> IngestionReport {
    coordinator
        .run_reader(csv.as_bytes(), today())
        .await
        .expect("source is readable")
}

/// Rejects every write with the given error, counting attempts.
struct BrokenSearch {
    error: SinkError,
    calls: AtomicU32,
}

#[async_trait]
impl SearchSink for BrokenSearch {
    async fn index(
        &self,
        _index_name: &str,
        _id: &str,
        _document: &SearchDocument,
    ) -> Result<UpsertStatus, SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

#[tokio::test]
async fn export_rows_land_in_both_sinks_normalized() {
    let pipeline = pipeline();
    let report = run(&pipeline.coordinator, EXPORT).await;

    assert_eq!(report.status, RunStatus::Clean);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.warehouse.committed, 2);
    assert_eq!(report.search.committed, 2);

    let id = "mls-1-123-main-st-springfield-il-62704";
    assert_eq!(report.row(1).and_then(|row| row.record_id.as_deref()), Some(id));
    assert_eq!(
        pipeline.warehouse.value(TABLE, id, ListingField::FullAddress),
        Some(FieldValue::String(Some(
            "123 Main St, Springfield, IL 62704".to_string()
        )))
    );
    assert_eq!(
        pipeline.warehouse.value(TABLE, id, ListingField::Price),
        Some(FieldValue::Float(Some(450_000.0)))
    );
    assert_eq!(
        pipeline
            .warehouse
            .value(TABLE, id, ListingField::PresentedByMiddleName),
        Some(FieldValue::String(Some("Q".to_string())))
    );

    let document = pipeline.search.document(INDEX, id).expect("indexed");
    assert_eq!(document.get("list_date"), Some(&Value::from("2024-03-05")));
    assert_eq!(document.get("status"), Some(&Value::from("Active")));

    let second = "mls-2-9-oak-ave-peoria-il-61602";
    let document = pipeline.search.document(INDEX, second).expect("indexed");
    assert_eq!(document.get("status"), Some(&Value::from("Sold")));
    assert_eq!(document.get("list_date"), Some(&Value::Null));
    assert_eq!(document.get("email_2"), Some(&Value::from("lee@example.com")));
}

#[tokio::test]
async fn identical_input_produces_identical_reports() {
    let first = run(&pipeline().coordinator, EXPORT).await;
    let second = run(&pipeline().coordinator, EXPORT).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn rerunning_a_file_converges_without_new_writes() {
    let pipeline = pipeline();
    run(&pipeline.coordinator, EXPORT).await;
    let rerun = run(&pipeline.coordinator, EXPORT).await;

    assert_eq!(rerun.warehouse.committed, 0);
    assert_eq!(rerun.warehouse.skipped_duplicate, 2);
    assert_eq!(rerun.search.skipped_duplicate, 2);
    assert_eq!(rerun.status, RunStatus::Clean);
    assert_eq!(pipeline.warehouse.len(TABLE), 2);
    assert_eq!(pipeline.search.len(INDEX), 2);
}

#[tokio::test]
async fn last_row_wins_for_duplicate_identities() {
    let pipeline = pipeline();
    let csv = "id,status,price\nlisting-7,Active,100\nlisting-8,Active,1\nlisting-7,Pending,300\n";
    let report = run(&pipeline.coordinator, csv).await;

    assert_eq!(report.superseded_in_batch, 1);
    assert_eq!(
        report.row(1).map(|row| &row.disposition),
        Some(&RowDisposition::SupersededInBatch {
            superseded_by_row: 3
        })
    );
    assert_eq!(
        pipeline.warehouse.value(TABLE, "listing-7", ListingField::Price),
        Some(FieldValue::Float(Some(300.0)))
    );
    let document = pipeline.search.document(INDEX, "listing-7").expect("indexed");
    assert_eq!(document.get("status"), Some(&Value::from("Pending")));
}

#[tokio::test]
async fn reject_policy_keeps_the_first_duplicate() {
    let pipeline = pipeline_with(IngestionSettings {
        duplicates: DuplicatePolicy::Reject,
        ..IngestionSettings::default()
    });
    let csv = "id,status,price\nlisting-7,Active,100\nlisting-7,Pending,300\n";
    let report = run(&pipeline.coordinator, csv).await;

    assert_eq!(report.rejected_by_reason.get("duplicate_identity"), Some(&1));
    assert_eq!(
        pipeline.warehouse.value(TABLE, "listing-7", ListingField::Price),
        Some(FieldValue::Float(Some(100.0)))
    );
}

#[tokio::test]
async fn type_violations_never_reach_a_sink() {
    let pipeline = pipeline();
    let csv = "id,status,price,list_date\na,Active,N/A,\nb,Active,10,03/05/2024\nc,Active,10,2024-03-05\n";
    let report = run(&pipeline.coordinator, csv).await;

    let price = report.row(1).and_then(|row| row.rejection()).expect("rejected");
    assert_eq!(price.code, "invalid_number");
    assert_eq!(price.field, Some(ListingField::Price));
    let date = report.row(2).and_then(|row| row.rejection()).expect("rejected");
    assert_eq!(date.code, "invalid_date");
    assert_eq!(date.field, Some(ListingField::ListDate));

    assert!(pipeline.warehouse.row(TABLE, "a").is_none());
    assert!(pipeline.search.document(INDEX, "a").is_none());
    assert!(pipeline.warehouse.row(TABLE, "b").is_none());
    assert!(pipeline.warehouse.row(TABLE, "c").is_some());
    assert_eq!(report.accepted, 1);
}

#[tokio::test]
async fn undecodable_rows_are_rejected_without_stopping_the_run() {
    let pipeline = pipeline();
    let mut bytes = b"id,status\na,Active\nb,".to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe]);
    bytes.extend_from_slice(b"\nc,Active\n");

    let report = pipeline
        .coordinator
        .run_reader(&bytes[..], today())
        .await
        .expect("source is readable");

    assert_eq!(report.rows_read, 3);
    assert_eq!(report.rejected_by_reason.get("malformed_row"), Some(&1));
    assert_eq!(pipeline.warehouse.len(TABLE), 2);
}

#[tokio::test]
async fn a_failing_search_sink_does_not_block_the_warehouse() {
    let warehouse = Arc::new(InMemoryWarehouse::default());
    let broken = Arc::new(BrokenSearch {
        error: SinkError::permanent("mapper_parsing_exception"),
        calls: AtomicU32::new(0),
    });
    let coordinator = IngestionCoordinator::new(
        IngestionSettings::default(),
        DualSinkWriter::new(
            warehouse.clone(),
            broken.clone(),
            SinkTargets::default(),
            RetryPolicy::default(),
        ),
    );

    let report = run(&coordinator, EXPORT).await;
    assert_eq!(report.status, RunStatus::CompletedWithSinkFailures);
    assert_eq!(report.warehouse.committed, 2);
    assert_eq!(report.search.failed, 2);
    assert_eq!(report.search.permanent_failures, 2);
    assert_eq!(report.divergent_rows().count(), 2);
    assert_eq!(broken.calls.load(Ordering::SeqCst), 2);
    assert!(matches!(
        report.row(1).and_then(|row| row.search.as_ref()),
        Some(WriteOutcome::Failed {
            kind: FailureKind::Permanent,
            attempts: 1,
            ..
        })
    ));

    // Once the index is healthy again a rerun fills it without rewriting the warehouse.
    let search = Arc::new(InMemorySearchIndex::default());
    let recovered = IngestionCoordinator::new(
        IngestionSettings::default(),
        DualSinkWriter::new(
            warehouse.clone(),
            search.clone(),
            SinkTargets::default(),
            RetryPolicy::default(),
        ),
    );
    let rerun = run(&recovered, EXPORT).await;
    assert_eq!(rerun.warehouse.skipped_duplicate, 2);
    assert_eq!(rerun.search.committed, 2);
    assert_eq!(search.len(INDEX), 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_transient_failures_are_reported_not_fatal() {
    let broken = Arc::new(BrokenSearch {
        error: SinkError::transient("429 too many requests"),
        calls: AtomicU32::new(0),
    });
    let coordinator = IngestionCoordinator::new(
        IngestionSettings::default(),
        DualSinkWriter::new(
            Arc::new(InMemoryWarehouse::default()),
            broken.clone(),
            SinkTargets::default(),
            RetryPolicy::default(),
        ),
    );

    let report = run(&coordinator, "id,status\na,Active\n").await;
    assert_eq!(report.search.failed, 1);
    assert_eq!(report.search.permanent_failures, 0);
    assert_eq!(broken.calls.load(Ordering::SeqCst), 3);
    assert!(!report.has_permanent_failures());
}

#[tokio::test]
async fn warehouse_failures_are_isolated_per_record() {
    struct RejectsId(&'static str);

    #[async_trait]
    impl WarehouseSink for RejectsId {
        async fn upsert(
            &self,
            _table: &str,
            record: &listing_ingest::workflows::listings::NormalizedRecord,
        ) -> Result<UpsertStatus, SinkError> {
            if record.id == self.0 {
                Err(SinkError::permanent("value too long for column"))
            } else {
                Ok(UpsertStatus::Inserted)
            }
        }
    }

    let coordinator = IngestionCoordinator::new(
        IngestionSettings::default(),
        DualSinkWriter::new(
            Arc::new(RejectsId("b")),
            Arc::new(InMemorySearchIndex::default()),
            SinkTargets::default(),
            RetryPolicy::default(),
        ),
    );
    let report = run(&coordinator, "id,status\na,Active\nb,Active\nc,Active\n").await;
    assert_eq!(report.warehouse.committed, 2);
    assert_eq!(report.warehouse.permanent_failures, 1);
    assert_eq!(report.search.committed, 3);
}

#[tokio::test]
async fn unknown_columns_can_fail_the_source() {
    let pipeline = pipeline_with(IngestionSettings {
        source: SourceOptions {
            unknown_columns: UnknownColumnPolicy::Reject,
            ..SourceOptions::default()
        },
        ..IngestionSettings::default()
    });

    let result = pipeline
        .coordinator
        .run_reader("id,status,favoriteColor\na,Active,blue\n".as_bytes(), today())
        .await;
    match result {
        Err(SourceReadError::UnknownColumns(columns)) => {
            assert_eq!(columns, vec!["favoriteColor".to_string()])
        }
        other => panic!("expected unknown column failure, got {other:?}"),
    }
    assert!(pipeline.warehouse.is_empty(TABLE));
}

#[tokio::test]
async fn semicolon_delimited_exports_are_supported() {
    let pipeline = pipeline_with(IngestionSettings {
        source: SourceOptions {
            delimiter: b';',
            ..SourceOptions::default()
        },
        ..IngestionSettings::default()
    });
    let report = run(&pipeline.coordinator, "id;status;price\na;Active;\"1,250\"\n").await;
    assert_eq!(report.accepted, 1);
    assert_eq!(
        pipeline.warehouse.value(TABLE, "a", ListingField::Price),
        Some(FieldValue::Float(Some(1250.0)))
    );
}

#[tokio::test]
async fn missing_file_is_a_source_error() {
    let result = pipeline()
        .coordinator
        .run_path("/nonexistent/listings.csv", today())
        .await;
    assert!(matches!(result, Err(SourceReadError::Io(_))));
}
