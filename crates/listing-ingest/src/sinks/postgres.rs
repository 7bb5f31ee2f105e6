use super::{SinkError, UpsertStatus, WarehouseSink};
use crate::workflows::listings::{FieldValue, ListingField, NormalizedRecord};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

/// SQLSTATE codes worth retrying: serialization failure, deadlock, connection exhaustion,
/// admin shutdown and the connection exception class.
const TRANSIENT_SQLSTATES: &[&str] = &[
    "40001", "40P01", "53300", "57P01", "57P02", "57P03", "08000", "08001", "08003", "08004",
    "08006",
];

/// Warehouse table hosted in Postgres. Column names and types follow the listing catalog:
/// `text`, `bigint`, `double precision` and `date`.
#[derive(Debug, Clone)]
pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds a lazily connecting pool; the first write surfaces connection problems.
    pub fn connect_lazy(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)
            .map_err(|err| SinkError::permanent(format!("invalid warehouse url: {err}")))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl WarehouseSink for PostgresWarehouse {
    async fn upsert(
        &self,
        table: &str,
        record: &NormalizedRecord,
    ) -> Result<UpsertStatus, SinkError> {
        let statement = upsert_statement(table)?;
        let mut query = sqlx::query(&statement);
        for (_, value) in record.values() {
            query = match value {
                FieldValue::String(value) => query.bind(value),
                FieldValue::Integer(value) => query.bind(value),
                FieldValue::Float(value) => query.bind(value),
                FieldValue::Date(value) => query.bind(value),
            };
        }

        // The guarded DO UPDATE returns no row when every column already matches.
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_error)?;
        let Some(row) = row else {
            return Ok(UpsertStatus::Unchanged);
        };
        let inserted: bool = row
            .try_get("inserted")
            .map_err(|err| SinkError::permanent(err.to_string()))?;
        Ok(if inserted {
            UpsertStatus::Inserted
        } else {
            UpsertStatus::Replaced
        })
    }
}

pub(crate) fn upsert_statement(table: &str) -> Result<String, SinkError> {
    let table = quote_table(table)?;
    let columns: Vec<String> = ListingField::ALL
        .iter()
        .map(|field| quote_identifier(field.name()))
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|n| format!("${n}")).collect();
    let updatable: Vec<&String> = ListingField::ALL
        .iter()
        .zip(&columns)
        .filter(|(field, _)| **field != ListingField::Id)
        .map(|(_, column)| column)
        .collect();

    let assignments: Vec<String> = updatable
        .iter()
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .collect();
    let current: Vec<String> = updatable
        .iter()
        .map(|column| format!("target.{column}"))
        .collect();
    let incoming: Vec<String> = updatable
        .iter()
        .map(|column| format!("EXCLUDED.{column}"))
        .collect();

    Ok(format!(
        "INSERT INTO {table} AS target ({columns}) VALUES ({placeholders}) \
         ON CONFLICT (\"id\") DO UPDATE SET {assignments} \
         WHERE ({current}) IS DISTINCT FROM ({incoming}) \
         RETURNING (xmax = 0) AS inserted",
        columns = columns.join(", "),
        placeholders = placeholders.join(", "),
        assignments = assignments.join(", "),
        current = current.join(", "),
        incoming = incoming.join(", "),
    ))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{name}\"")
}

/// Accepts `table` or `schema.table` made of plain identifiers.
fn quote_table(table: &str) -> Result<String, SinkError> {
    let parts: Vec<&str> = table.split('.').collect();
    let valid = parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if !valid {
        return Err(SinkError::permanent(format!(
            "invalid warehouse table name '{table}'"
        )));
    }
    Ok(parts
        .iter()
        .map(|part| quote_identifier(part))
        .collect::<Vec<_>>()
        .join("."))
}

fn classify_error(err: sqlx::Error) -> SinkError {
    let transient = match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| TRANSIENT_SQLSTATES.iter().any(|state| *state == code)),
        _ => false,
    };
    if transient {
        SinkError::transient(err.to_string())
    } else {
        SinkError::permanent(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_binds_every_catalog_column_in_order() {
        let statement = upsert_statement("real_estate.transactions").expect("valid table");
        assert!(statement.starts_with(
            "INSERT INTO \"real_estate\".\"transactions\" AS target (\"id\", \"mls\""
        ));
        assert!(statement.contains("$43)"));
        assert!(!statement.contains("$44"));
        assert!(statement.contains("\"oh_startTime\" = EXCLUDED.\"oh_startTime\""));
        assert!(!statement.contains("\"id\" = EXCLUDED"));
        assert!(statement.ends_with("RETURNING (xmax = 0) AS inserted"));
    }

    #[test]
    fn table_names_are_validated() {
        assert!(upsert_statement("transactions").is_ok());
        assert!(upsert_statement("a.b.c").is_err());
        assert!(upsert_statement("listings; DROP TABLE x").is_err());
        assert!(upsert_statement("").is_err());
    }

    #[test]
    fn pool_timeouts_are_transient() {
        assert!(classify_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!classify_error(sqlx::Error::RowNotFound).is_transient());
    }
}
