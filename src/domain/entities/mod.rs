mod conversation;
mod document;
mod embedding;
mod notation;

pub use conversation::{Conversation, Turn, TurnRole};
pub use document::{Document, DocumentChunk, SearchResult, SourceMetadata};
pub use embedding::Embedding;
pub use notation::{Notation, TemplateDispatch};
