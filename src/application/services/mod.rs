mod document;
mod rag;
mod verifier;

pub use document::{DocumentService, IngestedBatch};
pub use rag::RagService;
pub use verifier::{Answer, SessionSettings, SessionSummary, UploadSummary, VerifierService};
