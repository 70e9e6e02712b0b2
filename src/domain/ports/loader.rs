use crate::domain::{errors::DomainError, Document};

/// A file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

pub trait DocumentLoader: Send + Sync {
    /// Normalizes a batch of uploads; fails as a whole on any bad input.
    fn load(&self, files: &[UploadedFile]) -> Result<Vec<Document>, DomainError>;
}
