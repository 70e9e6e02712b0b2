pub mod config;
pub mod embedding;
pub mod llm;
pub mod loader;
pub mod vector_store;

pub use config::{AppConfig, Config};
pub use embedding::TextEmbedding;
pub use llm::OpenAiChatModel;
pub use loader::XmlDocumentLoader;
pub use vector_store::{InMemoryIndexBuilder, InMemoryVectorStore};
