//! Application layer - Use cases and orchestration.
//!
//! Services depend on domain ports (traits) rather than concrete
//! implementations, except for the in-memory index every upload builds.

pub mod services;
pub mod session;

pub use services::{
    Answer, DocumentService, RagService, SessionSettings, SessionSummary, UploadSummary,
    VerifierService,
};
pub use session::{SessionContext, SessionRegistry};
