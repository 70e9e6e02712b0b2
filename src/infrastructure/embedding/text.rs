use std::collections::HashMap;

use async_trait::async_trait;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::embeddings::EmbeddingsBuilder;
use rig::providers::openai;
use tracing::debug;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};
use crate::infrastructure::config::EmbeddingConfig;

/// OpenAI embeddings through rig. The client reads `OPENAI_API_KEY` from the
/// environment, which startup validation guarantees is set.
pub struct TextEmbedding {
    model: String,
    dimension: usize,
}

impl TextEmbedding {
    pub fn new() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            dimension: config.dimension,
        }
    }
}

impl Default for TextEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingService for TextEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| DomainError::external("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = openai::Client::from_env();
        let model = client.embedding_model(&self.model);

        let mut builder = EmbeddingsBuilder::new(model);
        for text in texts {
            builder = builder
                .document(text.to_string())
                .map_err(|e| DomainError::external(e.to_string()))?;
        }

        let embeddings = builder
            .build()
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;
        debug!(count = embeddings.len(), model = %self.model, "embeddings received");

        // The builder batches requests concurrently and does not keep input
        // order, so results are matched back to their texts.
        let by_text: HashMap<String, Embedding> = embeddings
            .into_iter()
            .map(|(doc, emb)| (doc, Embedding::from(emb.first().vec)))
            .collect();

        texts
            .iter()
            .map(|text| {
                by_text.get(*text).cloned().ok_or_else(|| {
                    DomainError::external("embedding service returned fewer vectors than inputs")
                })
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
