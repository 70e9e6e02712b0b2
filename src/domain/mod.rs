pub mod chunking;
pub mod entities;
pub mod errors;
pub mod ports;
pub mod prompt;
pub mod retrieval;

pub use chunking::TextSplitter;
pub use entities::*;
pub use errors::{DomainError, Result};
pub use prompt::PromptTemplates;
pub use retrieval::{maximal_marginal_relevance, MmrParams};
