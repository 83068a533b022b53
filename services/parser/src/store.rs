//! Document store: one analysis document per sheet plus its record chunks.
//!
//! Postgres keeps both as JSONB rows; the in-memory store backs tests and
//! dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::config::{Config, StoreKind};
use crate::error::StoreError;
use crate::records::{FileType, Record};
use crate::stats::{ColumnSummary, SheetStats};

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Per-sheet analysis. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDocument {
    pub sheet_name: String,
    pub file_type: FileType,
    pub columns: Vec<String>,
    /// First records of the sheet, as persisted.
    pub rows: Vec<Value>,
    pub stats: SheetStats,
    pub summary: BTreeMap<String, ColumnSummary>,
    /// Base64 SVG, empty when the chart was skipped.
    pub chart_bar: String,
    pub chart_pie: String,
    pub formal_summary: String,
    pub timestamp: DateTime<Utc>,
    pub total_records: usize,
}

/// Slice of a sheet's records, stored as child `data_chunk_<index>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChunk {
    pub index: usize,
    pub records: Vec<Record>,
}

impl DataChunk {
    pub fn child_id(&self) -> String {
        format!("data_chunk_{}", self.index)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upsert the analysis document.
    async fn put_analysis(&self, doc_id: &str, doc: &AnalysisDocument) -> Result<(), StoreError>;

    /// Upsert one chunk under `doc_id`.
    async fn put_chunk(&self, doc_id: &str, chunk: &DataChunk) -> Result<(), StoreError>;

    async fn get_analysis(&self, doc_id: &str) -> Result<Option<AnalysisDocument>, StoreError>;

    /// All chunks of `doc_id` in index order. Empty when nothing is stored.
    async fn chunks(&self, doc_id: &str) -> Result<Vec<DataChunk>, StoreError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_results (
                doc_id TEXT PRIMARY KEY,
                document JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_chunks (
                doc_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                records JSONB NOT NULL,
                PRIMARY KEY (doc_id, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn chunk_index(index: usize) -> Result<i32, StoreError> {
    i32::try_from(index).map_err(|_| StoreError::Database(format!("chunk index {} out of range", index)))
}

fn stored_index(index: i32) -> Result<usize, StoreError> {
    usize::try_from(index).map_err(|_| StoreError::Database(format!("corrupt chunk index {}", index)))
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn put_analysis(&self, doc_id: &str, doc: &AnalysisDocument) -> Result<(), StoreError> {
        let document = serde_json::to_value(doc)?;
        sqlx::query(
            r#"
            INSERT INTO analysis_results (doc_id, document, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (doc_id) DO UPDATE SET document = EXCLUDED.document
            "#,
        )
        .bind(doc_id)
        .bind(&document)
        .bind(doc.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_chunk(&self, doc_id: &str, chunk: &DataChunk) -> Result<(), StoreError> {
        let records = serde_json::to_value(&chunk.records)?;
        sqlx::query(
            r#"
            INSERT INTO analysis_chunks (doc_id, chunk_index, records)
            VALUES ($1, $2, $3)
            ON CONFLICT (doc_id, chunk_index) DO UPDATE SET records = EXCLUDED.records
            "#,
        )
        .bind(doc_id)
        .bind(chunk_index(chunk.index)?)
        .bind(&records)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_analysis(&self, doc_id: &str) -> Result<Option<AnalysisDocument>, StoreError> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT document FROM analysis_results WHERE doc_id = $1")
                .bind(doc_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((document,)) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    async fn chunks(&self, doc_id: &str) -> Result<Vec<DataChunk>, StoreError> {
        let rows: Vec<(i32, Value)> = sqlx::query_as(
            "SELECT chunk_index, records FROM analysis_chunks WHERE doc_id = $1 ORDER BY chunk_index",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(index, records)| {
                Ok(DataChunk {
                    index: stored_index(index)?,
                    records: serde_json::from_value(records)?,
                })
            })
            .collect()
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

#[derive(Default)]
struct MemoryData {
    documents: HashMap<String, Value>,
    chunks: HashMap<String, BTreeMap<usize, Value>>,
}

/// Keeps documents as serialized JSON so reads go through the same
/// conversion as the database path.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    data: Arc<RwLock<MemoryData>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored document ids, sorted.
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = match self.data.read() {
            Ok(data) => data.documents.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        ids.sort();
        ids
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put_analysis(&self, doc_id: &str, doc: &AnalysisDocument) -> Result<(), StoreError> {
        let value = serde_json::to_value(doc)?;
        let mut data = self.data.write().map_err(poisoned)?;
        data.documents.insert(doc_id.to_string(), value);
        Ok(())
    }

    async fn put_chunk(&self, doc_id: &str, chunk: &DataChunk) -> Result<(), StoreError> {
        let value = serde_json::to_value(&chunk.records)?;
        let mut data = self.data.write().map_err(poisoned)?;
        data.chunks
            .entry(doc_id.to_string())
            .or_default()
            .insert(chunk.index, value);
        Ok(())
    }

    async fn get_analysis(&self, doc_id: &str) -> Result<Option<AnalysisDocument>, StoreError> {
        let value = {
            let data = self.data.read().map_err(poisoned)?;
            data.documents.get(doc_id).cloned()
        };
        match value {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    async fn chunks(&self, doc_id: &str) -> Result<Vec<DataChunk>, StoreError> {
        let stored: Vec<(usize, Value)> = {
            let data = self.data.read().map_err(poisoned)?;
            data.chunks
                .get(doc_id)
                .map(|c| c.iter().map(|(i, v)| (*i, v.clone())).collect())
                .unwrap_or_default()
        };
        stored
            .into_iter()
            .map(|(index, records)| {
                Ok(DataChunk {
                    index,
                    records: serde_json::from_value(records)?,
                })
            })
            .collect()
    }
}

/// Open the store selected by configuration. Postgres connection failures
/// are startup errors.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match &config.store {
        StoreKind::Memory => {
            info!("using in-memory document store");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }
        StoreKind::Postgres { db_url } => {
            let store = PgDocumentStore::connect(db_url, config.db_max_connections).await?;
            store.ensure_schema().await?;
            info!("postgres document store ready");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn document(sheet: &str) -> AnalysisDocument {
        AnalysisDocument {
            sheet_name: sheet.to_string(),
            file_type: FileType::Base,
            columns: vec!["Customer_Name".into(), "file_type".into()],
            rows: vec![],
            stats: SheetStats::default(),
            summary: BTreeMap::new(),
            chart_bar: String::new(),
            chart_pie: String::new(),
            formal_summary: "No data processed".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 19, 10, 30, 0).unwrap(),
            total_records: 0,
        }
    }

    #[test]
    fn test_stored_chunk_index_must_be_non_negative() {
        assert_eq!(stored_index(3).unwrap(), 3);
        assert!(matches!(stored_index(-1), Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn test_memory_store_document_roundtrip() {
        let store = MemoryDocumentStore::new();
        store.put_analysis("doc-1", &document("Sheet1")).await.unwrap();

        let loaded = store.get_analysis("doc-1").await.unwrap();
        assert_eq!(loaded, Some(document("Sheet1")));
        assert_eq!(store.get_analysis("missing").await.unwrap(), None);
        assert_eq!(store.document_ids(), vec!["doc-1"]);
    }

    #[tokio::test]
    async fn test_memory_store_chunks_in_index_order() {
        let store = MemoryDocumentStore::new();
        for index in [2, 0, 1] {
            let chunk = DataChunk {
                index,
                records: vec![],
            };
            store.put_chunk("doc-1", &chunk).await.unwrap();
        }
        // Rewriting a chunk replaces it.
        store
            .put_chunk("doc-1", &DataChunk { index: 1, records: vec![] })
            .await
            .unwrap();

        let chunks = store.chunks("doc-1").await.unwrap();
        let indexes: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(chunks[1].child_id(), "data_chunk_1");
        assert!(store.chunks("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_store_memory() {
        let config = Config::for_memory();
        let store = connect_store(&config).await.unwrap();
        assert!(store.chunks("nothing").await.unwrap().is_empty());
    }
}
