use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    ports::{IndexBuilder, VectorStore},
    DocumentChunk, DomainError, Embedding, SearchResult,
};

/// Flat cosine-similarity index over one upload batch. Immutable once built;
/// a new upload builds a new index.
#[derive(Debug)]
pub struct InMemoryVectorStore {
    entries: Vec<(DocumentChunk, Embedding)>,
    dimension: usize,
}

impl InMemoryVectorStore {
    pub fn build(entries: Vec<(DocumentChunk, Embedding)>) -> Result<Self, DomainError> {
        let dimension = entries
            .first()
            .map(|(_, e)| e.dimension())
            .ok_or_else(|| DomainError::validation("cannot build an index from zero chunks"))?;

        if dimension == 0 {
            return Err(DomainError::external("embedding service returned empty vectors"));
        }
        if let Some((chunk, e)) = entries.iter().find(|(_, e)| e.dimension() != dimension) {
            return Err(DomainError::external(format!(
                "embedding dimension mismatch for {} chunk {}: expected {}, got {}",
                chunk.metadata.source,
                chunk.chunk_index,
                dimension,
                e.dimension()
            )));
        }

        Ok(Self { entries, dimension })
    }
}

/// Builds an [`InMemoryVectorStore`] per upload batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryIndexBuilder;

impl IndexBuilder for InMemoryIndexBuilder {
    fn build(
        &self,
        entries: Vec<(DocumentChunk, Embedding)>,
    ) -> Result<Arc<dyn VectorStore>, DomainError> {
        Ok(Arc::new(InMemoryVectorStore::build(entries)?))
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        if query.dimension() != self.dimension {
            return Err(DomainError::external(format!(
                "query embedding has dimension {}, index has {}",
                query.dimension(),
                self.dimension
            )));
        }

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|(chunk, embedding)| SearchResult {
                chunk: chunk.clone(),
                embedding: embedding.clone(),
                score: query.cosine_similarity(embedding),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);

        Ok(results)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
