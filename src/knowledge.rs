//! Tenant-scoped knowledge base: embed-and-insert on ingest, embed-and-match
//! on retrieval. The tenant filter rides on every operation; a search under
//! one tenant can never observe documents ingested under another.

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::rag::Embedder;
use crate::store::{Document, DocumentStore};

pub const MATCH_THRESHOLD: f32 = 0.5;
pub const MATCH_COUNT: usize = 3;

pub struct KnowledgeBase {
    documents: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeBase {
    pub fn new(documents: Arc<dyn DocumentStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { documents, embedder }
    }

    pub async fn learn(&self, tenant_id: &str, text: &str, source: &str) -> AppResult<()> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| AppError::upstream("embedding_failed", e.to_string()))?;
        self.documents
            .insert(Document {
                tenant_id: tenant_id.to_string(),
                content: text.to_string(),
                source: source.to_string(),
                embedding,
            })
            .await
            .map_err(|e| AppError::upstream("store_unavailable", e.to_string()))?;
        Ok(())
    }

    /// Top matching document contents for this tenant, best first.
    pub async fn search(&self, tenant_id: &str, query: &str) -> AppResult<Vec<String>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| AppError::upstream("embedding_failed", e.to_string()))?;
        let docs = self
            .documents
            .search(tenant_id, &embedding, MATCH_THRESHOLD, MATCH_COUNT)
            .await
            .map_err(|e| AppError::upstream("store_unavailable", e.to_string()))?;
        Ok(docs.into_iter().map(|d| d.content).collect())
    }
}
