use std::sync::Arc;
use tracing::instrument;

use crate::domain::{
    ports::{DocumentLoader, UploadedFile},
    DocumentChunk, DomainError, TextSplitter,
};

/// Chunks produced from one upload batch.
#[derive(Debug, Clone)]
pub struct IngestedBatch {
    pub documents: usize,
    pub chunks: Vec<DocumentChunk>,
}

pub struct DocumentService {
    loader: Arc<dyn DocumentLoader>,
    splitter: TextSplitter,
}

impl DocumentService {
    pub fn new(loader: Arc<dyn DocumentLoader>, splitter: TextSplitter) -> Self {
        Self { loader, splitter }
    }

    #[instrument(skip(self, files), fields(files = files.len()))]
    pub fn ingest(&self, files: &[UploadedFile]) -> Result<IngestedBatch, DomainError> {
        let documents = self.loader.load(files)?;
        let chunks = self.splitter.split_documents(&documents);

        if chunks.is_empty() {
            return Err(DomainError::validation("uploaded files contain no text"));
        }

        Ok(IngestedBatch {
            documents: documents.len(),
            chunks,
        })
    }
}
