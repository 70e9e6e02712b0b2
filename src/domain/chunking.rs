//! Splitting documents into overlapping windows for embedding.
//!
//! Windows are measured in characters. A window ends at the last preferred
//! boundary that fits (separators are tried in order and stay attached to the
//! text before them), or at the hard size limit when none does. The next
//! window starts exactly `chunk_overlap` characters before the previous one
//! ended, so the tail of each chunk is repeated at the head of the next.

use crate::domain::{Document, DocumentChunk, DomainError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

pub fn default_separators() -> Vec<String> {
    vec!["\n\n".to_string(), "\n".to_string()]
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize, separators: Vec<String>) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DomainError::configuration("chunk_size must be greater than zero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(DomainError::configuration(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: separators.into_iter().filter(|s| !s.is_empty()).collect(),
        })
    }

    /// Splits every document independently; chunk indices restart at 0 per document.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<DocumentChunk> {
        documents
            .iter()
            .filter(|doc| !doc.content.trim().is_empty())
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .enumerate()
                    .map(move |(i, piece)| DocumentChunk::new(piece, i, doc.metadata.clone()))
            })
            .collect()
    }

    pub fn split_text<'a>(&self, text: &'a str) -> Vec<&'a str> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, the end of the text included.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        let mut pieces = Vec::new();
        let mut start = 0;

        loop {
            let limit = (start + self.chunk_size).min(total);
            if limit == total {
                pieces.push(&text[bounds[start]..]);
                break;
            }

            let end = self
                .boundary_before(text, &bounds, start, limit)
                .unwrap_or(limit);
            pieces.push(&text[bounds[start]..bounds[end]]);
            start = end - self.chunk_overlap;
        }

        pieces
    }

    /// Latest separator end within `(start, limit]` that still leaves the next
    /// window room to advance past the overlap.
    fn boundary_before(
        &self,
        text: &str,
        bounds: &[usize],
        start: usize,
        limit: usize,
    ) -> Option<usize> {
        let window = &text[bounds[start]..bounds[limit]];
        let min_end = start + self.chunk_overlap + 1;

        self.separators.iter().find_map(|sep| {
            let pos = window.rfind(sep.as_str())?;
            let end = bounds.binary_search(&(bounds[start] + pos + sep.len())).ok()?;
            (end >= min_end).then_some(end)
        })
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: default_separators(),
        }
    }
}
