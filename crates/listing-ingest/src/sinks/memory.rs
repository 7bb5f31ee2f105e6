use super::{SearchDocument, SearchSink, SinkError, UpsertStatus, WarehouseSink};
use crate::workflows::listings::{FieldValue, ListingField, NormalizedRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

type Key = (String, String);

/// Process-local warehouse table used for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryWarehouse {
    rows: Mutex<HashMap<Key, Vec<(ListingField, FieldValue)>>>,
}

impl InMemoryWarehouse {
    pub fn row(&self, table: &str, id: &str) -> Option<Vec<(ListingField, FieldValue)>> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.get(&(table.to_string(), id.to_string())).cloned()
    }

    pub fn value(&self, table: &str, id: &str, field: ListingField) -> Option<FieldValue> {
        self.row(table, id)?
            .into_iter()
            .find(|(column, _)| *column == field)
            .map(|(_, value)| value)
    }

    pub fn len(&self, table: &str) -> usize {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.keys().filter(|(name, _)| name == table).count()
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

#[async_trait]
impl WarehouseSink for InMemoryWarehouse {
    async fn upsert(
        &self,
        table: &str,
        record: &NormalizedRecord,
    ) -> Result<UpsertStatus, SinkError> {
        let values = record.values();
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = rows.insert((table.to_string(), record.id.clone()), values.clone());
        Ok(match previous {
            None => UpsertStatus::Inserted,
            Some(previous) if previous == values => UpsertStatus::Unchanged,
            Some(_) => UpsertStatus::Replaced,
        })
    }
}

/// Process-local search index used for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    documents: Mutex<HashMap<Key, SearchDocument>>,
}

impl InMemorySearchIndex {
    pub fn document(&self, index_name: &str, id: &str) -> Option<SearchDocument> {
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        documents
            .get(&(index_name.to_string(), id.to_string()))
            .cloned()
    }

    pub fn len(&self, index_name: &str) -> usize {
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        documents.keys().filter(|(name, _)| name == index_name).count()
    }

    pub fn is_empty(&self, index_name: &str) -> bool {
        self.len(index_name) == 0
    }
}

#[async_trait]
impl SearchSink for InMemorySearchIndex {
    async fn index(
        &self,
        index_name: &str,
        id: &str,
        document: &SearchDocument,
    ) -> Result<UpsertStatus, SinkError> {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = documents.insert((index_name.to_string(), id.to_string()), document.clone());
        Ok(match previous {
            None => UpsertStatus::Inserted,
            Some(previous) if &previous == document => UpsertStatus::Unchanged,
            Some(_) => UpsertStatus::Replaced,
        })
    }
}
