//! Chunked persistence of one sheet's analysis.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::records::Record;
use crate::retry::RetryPolicy;
use crate::store::{AnalysisDocument, DataChunk, DocumentStore};

/// Records per stored chunk, keeping each chunk well below per-document
/// size limits.
pub const CHUNK_SIZE: usize = 500;

/// Split records into ordered chunks of at most `size`. Concatenating the
/// chunks gives back the input.
pub fn chunk_records(records: Vec<Record>, size: usize) -> Vec<DataChunk> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(records.len().div_ceil(size));
    let mut iter = records.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(DataChunk {
            index: chunks.len(),
            records: iter.by_ref().take(size).collect(),
        });
    }
    chunks
}

#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl Persister {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Write the analysis document, then every chunk in index order.
    /// Each write retries on its own; there is no transaction across them.
    /// Returns the number of chunks written.
    pub async fn persist(
        &self,
        doc_id: &str,
        doc: &AnalysisDocument,
        records: Vec<Record>,
    ) -> Result<usize, StoreError> {
        let store = self.store.as_ref();
        self.retry
            .run("put_analysis", move || store.put_analysis(doc_id, doc))
            .await?;
        info!(doc_id, sheet = %doc.sheet_name, "saved analysis document");

        let chunks = chunk_records(records, CHUNK_SIZE);
        for chunk in &chunks {
            self.retry
                .run("put_chunk", move || store.put_chunk(doc_id, chunk))
                .await?;
            debug!(doc_id, chunk = %chunk.child_id(), records = chunk.records.len(), "saved data chunk");
        }

        info!(doc_id, chunks = chunks.len(), "saved data chunks");
        Ok(chunks.len())
    }
}
