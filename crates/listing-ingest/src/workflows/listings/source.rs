use super::fields::clean;
use super::schema::ListingField;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use tracing::debug;

/// How the reader treats header columns that are not part of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownColumnPolicy {
    #[default]
    Ignore,
    Reject,
}

#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
    pub delimiter: u8,
    pub unknown_columns: UnknownColumnPolicy,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            unknown_columns: UnknownColumnPolicy::Ignore,
        }
    }
}

/// The file as a whole could not be read. Nothing downstream runs when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum SourceReadError {
    #[error("failed to read listing file: {0}")]
    Io(#[from] std::io::Error),
    #[error("listing file is not valid delimited data: {0}")]
    Csv(#[from] csv::Error),
    #[error("header row names none of the catalog columns")]
    NoRecognizedColumns,
    #[error("header contains columns outside the catalog: {}", .0.join(", "))]
    UnknownColumns(Vec<String>),
}

/// One data row keyed by catalog column. Values are trimmed but otherwise untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub row_number: usize,
    pub line: Option<u64>,
    values: BTreeMap<ListingField, String>,
}

impl RawRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            line: None,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: ListingField, value: impl Into<String>) -> Self {
        self.values.insert(field, value.into());
        self
    }

    pub fn get(&self, field: ListingField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    /// True when every cell is empty or a missing-value placeholder such as `NaN`.
    pub fn is_blank(&self) -> bool {
        self.values
            .values()
            .all(|value| clean(Some(value)).is_none())
    }
}

/// A data row the reader could not decode (for example invalid UTF-8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRow {
    pub row_number: usize,
    pub line: Option<u64>,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct SourceBatch {
    pub rows: Vec<Result<RawRow, MalformedRow>>,
    pub blank_rows: usize,
    pub ignored_columns: Vec<String>,
}

pub(crate) fn read_rows<R: Read>(
    reader: R,
    options: &SourceOptions,
) -> Result<SourceBatch, SourceReadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut columns: Vec<Option<ListingField>> = Vec::with_capacity(headers.len());
    let mut unknown = Vec::new();
    for header in headers.iter() {
        let field = ListingField::from_header(header);
        if field.is_none() && !header.trim().is_empty() {
            unknown.push(header.trim().to_string());
        }
        columns.push(field);
    }

    if columns.iter().all(Option::is_none) {
        return Err(SourceReadError::NoRecognizedColumns);
    }
    if !unknown.is_empty() && options.unknown_columns == UnknownColumnPolicy::Reject {
        return Err(SourceReadError::UnknownColumns(unknown));
    }

    let mut batch = SourceBatch {
        ignored_columns: unknown,
        ..SourceBatch::default()
    };

    for (index, result) in csv_reader.records().enumerate() {
        let row_number = index + 1;
        let record = match result {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                let line = err.position().map(|position| position.line());
                debug!(row_number, error = %err, "undecodable row");
                batch.rows.push(Err(MalformedRow {
                    row_number,
                    line,
                    message: err.to_string(),
                }));
                continue;
            }
        };

        let mut row = RawRow::new(row_number);
        row.line = record.position().map(|position| position.line());
        for (value, column) in record.iter().zip(columns.iter()) {
            let Some(field) = column else {
                continue;
            };
            // The first non-empty column wins when two headers map to the same field.
            let occupied = row.get(*field).is_some_and(|existing| !existing.is_empty());
            if !occupied {
                row.values.insert(*field, value.to_string());
            }
        }

        if row.is_blank() {
            batch.blank_rows += 1;
            continue;
        }
        batch.rows.push(Ok(row));
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read(csv: &str) -> Result<SourceBatch, SourceReadError> {
        read_rows(Cursor::new(csv.to_string()), &SourceOptions::default())
    }

    #[test]
    fn maps_aliases_and_skips_blank_rows() {
        let batch = read("sourcePropertyId,price,favoriteColor\nMLS-1, 100 ,blue\n,,\nMLS-2,200,red\n")
            .expect("reads");
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.blank_rows, 1);
        assert_eq!(batch.ignored_columns, vec!["favoriteColor".to_string()]);

        let first = batch.rows[0].as_ref().expect("row decodes");
        assert_eq!(first.row_number, 1);
        assert_eq!(first.get(ListingField::Mls), Some("MLS-1"));
        assert_eq!(first.get(ListingField::Price), Some("100"));

        let second = batch.rows[1].as_ref().expect("row decodes");
        assert_eq!(second.row_number, 3);
    }

    #[test]
    fn rows_of_placeholders_count_as_blank() {
        let batch = read("mls,status,price\nnan,NULL,None\nMLS-1,Active,10\n").expect("reads");
        assert_eq!(batch.blank_rows, 1);
        assert_eq!(batch.rows.len(), 1);
        assert!(RawRow::new(1).with(ListingField::Mls, " NaN ").is_blank());
        assert!(!RawRow::new(1).with(ListingField::Mls, "nano").is_blank());
    }

    #[test]
    fn rejects_unknown_columns_when_configured() {
        let options = SourceOptions {
            unknown_columns: UnknownColumnPolicy::Reject,
            ..SourceOptions::default()
        };
        let error = read_rows(Cursor::new("mls,favoriteColor\nA,blue\n"), &options)
            .expect_err("unknown column rejected");
        match error {
            SourceReadError::UnknownColumns(columns) => {
                assert_eq!(columns, vec!["favoriteColor".to_string()])
            }
            other => panic!("expected unknown columns, got {other:?}"),
        }
    }

    #[test]
    fn header_without_catalog_columns_is_fatal() {
        let error = read("Name,Created At\nTask,2025-09-24\n").expect_err("not a listing file");
        assert!(matches!(error, SourceReadError::NoRecognizedColumns));
    }

    #[test]
    fn empty_input_is_fatal() {
        let error = read("").expect_err("no header");
        assert!(matches!(error, SourceReadError::NoRecognizedColumns));
    }

    #[test]
    fn invalid_utf8_is_a_row_level_problem() {
        let mut bytes = b"mls,city\nA,Springfield\nB,".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b"\n");
        let batch = read_rows(Cursor::new(bytes), &SourceOptions::default()).expect("reads");
        assert_eq!(batch.rows.len(), 2);
        assert!(batch.rows[0].is_ok());
        let malformed = batch.rows[1].as_ref().expect_err("row is malformed");
        assert_eq!(malformed.row_number, 2);
    }

    #[test]
    fn honours_custom_delimiter() {
        let options = SourceOptions {
            delimiter: b';',
            ..SourceOptions::default()
        };
        let batch = read_rows(Cursor::new("mls;city\nA;Springfield\n"), &options).expect("reads");
        let row = batch.rows[0].as_ref().expect("row decodes");
        assert_eq!(row.get(ListingField::City), Some("Springfield"));
    }
}
