use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::{
    maximal_marginal_relevance,
    ports::{EmbeddingService, IndexBuilder, VectorStore},
    DocumentChunk, DomainError, MmrParams, SearchResult,
};

pub struct RagService {
    embedding: Arc<dyn EmbeddingService>,
    indexes: Arc<dyn IndexBuilder>,
    params: MmrParams,
}

impl RagService {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        indexes: Arc<dyn IndexBuilder>,
        params: MmrParams,
    ) -> Self {
        Self {
            embedding,
            indexes,
            params,
        }
    }

    /// Embeds every chunk and builds a fresh index. Nothing is returned
    /// unless all chunks were embedded with the model's dimension.
    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    pub async fn build_index(
        &self,
        chunks: Vec<DocumentChunk>,
    ) -> Result<Arc<dyn VectorStore>, DomainError> {
        if chunks.is_empty() {
            return Err(DomainError::validation("cannot index zero chunks"));
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = self.embedding.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(DomainError::external(format!(
                "embedding service returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimension = self.embedding.dimension();
        if let Some((chunk, e)) = chunks
            .iter()
            .zip(&embeddings)
            .find(|(_, e)| e.dimension() != dimension)
        {
            return Err(DomainError::external(format!(
                "embedding for {} chunk {} has dimension {}, expected {}",
                chunk.metadata.source,
                chunk.chunk_index,
                e.dimension(),
                dimension
            )));
        }

        let index = self.indexes.build(chunks.into_iter().zip(embeddings).collect())?;
        debug!(dimension, entries = index.len(), "index built");
        Ok(index)
    }

    /// MMR retrieval: the `fetch_k` most similar chunks are re-ranked for
    /// diversity and the first `k` picks are returned in selection order.
    #[instrument(skip(self, index))]
    pub async fn retrieve(
        &self,
        index: &dyn VectorStore,
        query: &str,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let query_embedding = self.embedding.embed(query).await?;
        let candidates = index.search(&query_embedding, self.params.fetch_k).await?;

        let vectors: Vec<_> = candidates.iter().map(|c| c.embedding.clone()).collect();
        let picks = maximal_marginal_relevance(
            &query_embedding,
            &vectors,
            self.params.k,
            self.params.lambda_mult,
        );

        let mut slots: Vec<Option<SearchResult>> = candidates.into_iter().map(Some).collect();
        let results: Vec<SearchResult> = picks
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect();

        debug!(pool = vectors.len(), selected = results.len(), "mmr selection");
        Ok(results)
    }
}
