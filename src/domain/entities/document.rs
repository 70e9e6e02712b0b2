use serde::{Deserialize, Serialize};

use super::Embedding;

/// Where a piece of text came from. Chunks carry a copy of their parent
/// document's metadata unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source: String,
    pub page: usize,
    pub page_label: String,
}

impl SourceMetadata {
    pub fn new(source: impl Into<String>, page: usize) -> Self {
        Self {
            source: source.into(),
            page,
            page_label: page.to_string(),
        }
    }
}

/// A normalized uploaded file. Lives only until it has been chunked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: SourceMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: SourceMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    pub chunk_index: usize,
    pub metadata: SourceMetadata,
}

impl DocumentChunk {
    pub fn new(content: impl Into<String>, chunk_index: usize, metadata: SourceMetadata) -> Self {
        Self {
            content: content.into(),
            chunk_index,
            metadata,
        }
    }
}

/// A chunk returned by the index along with the vector it was stored under,
/// so callers can re-rank candidates without another embedding round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub embedding: Embedding,
    pub score: f32,
}
