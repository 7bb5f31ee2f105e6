use super::{SearchDocument, SearchSink, SinkError, UpsertStatus};
use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    GetSourceParts, IndexParts, OpenSearch,
};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

/// Search index hosted in OpenSearch.
pub struct OpenSearchIndex {
    client: OpenSearch,
}

impl OpenSearchIndex {
    /// Builds a client for a single node. No request is sent until the first write.
    pub fn connect(url: &str, credentials: Option<(String, String)>) -> Result<Self, SinkError> {
        let parsed_url = Url::parse(url)
            .map_err(|e| SinkError::permanent(format!("invalid search url: {e}")))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();
        if let Some((username, password)) = credentials {
            builder = builder.auth(Credentials::Basic(username, password));
        }
        let transport = builder
            .build()
            .map_err(|e| SinkError::permanent(e.to_string()))?;

        info!(url = %url, "created search index client");
        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }
}

#[async_trait]
impl SearchSink for OpenSearchIndex {
    async fn index(
        &self,
        index_name: &str,
        id: &str,
        document: &SearchDocument,
    ) -> Result<UpsertStatus, SinkError> {
        if let Some(stored) = self.stored_source(index_name, id).await? {
            if is_unchanged(&stored, document) {
                debug!(doc_id = %id, "document already indexed");
                return Ok(UpsertStatus::Unchanged);
            }
        }

        // A full index write replaces the stored source, dropping fields the new document lacks.
        let response = self
            .client
            .index(IndexParts::IndexId(index_name, id))
            .body(document)
            .send()
            .await
            .map_err(|e| SinkError::transient(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &error_body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SinkError::transient(e.to_string()))?;
        let result = body.get("result").and_then(Value::as_str);
        debug!(doc_id = %id, result = ?result, "document indexed");
        Ok(upsert_status(result))
    }
}

impl OpenSearchIndex {
    async fn stored_source(&self, index_name: &str, id: &str) -> Result<Option<Value>, SinkError> {
        let response = self
            .client
            .get_source(GetSourceParts::IndexId(index_name, id))
            .send()
            .await
            .map_err(|e| SinkError::transient(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &error_body));
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| SinkError::transient(e.to_string()))
    }
}

fn is_unchanged(stored: &Value, document: &SearchDocument) -> bool {
    stored.as_object() == Some(document.as_map())
}

fn upsert_status(result: Option<&str>) -> UpsertStatus {
    match result {
        Some("created") => UpsertStatus::Inserted,
        _ => UpsertStatus::Replaced,
    }
}

fn classify_status(status: u16, body: &str) -> SinkError {
    let message = format!("index request failed with status {status}: {body}");
    match status {
        408 | 409 | 429 | 500..=599 => SinkError::transient(message),
        _ => SinkError::permanent(message),
    }
}
