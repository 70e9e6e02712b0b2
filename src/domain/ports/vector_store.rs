use std::sync::Arc;

use crate::domain::{errors::DomainError, DocumentChunk, Embedding, SearchResult};
use async_trait::async_trait;

/// A read-only similarity index built from one upload batch.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `top_k` entries ranked by descending similarity to `query`.
    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds a fresh index from embedded chunks.
pub trait IndexBuilder: Send + Sync {
    fn build(
        &self,
        entries: Vec<(DocumentChunk, Embedding)>,
    ) -> Result<Arc<dyn VectorStore>, DomainError>;
}
