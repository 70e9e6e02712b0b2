use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::domain::errors::DomainError;

/// Incremental answer text. Fragment boundaries carry no meaning.
pub type TextStream = BoxStream<'static, Result<String, DomainError>>;

#[async_trait]
pub trait LlmService: Send + Sync {
    async fn stream(&self, prompt: &str) -> Result<TextStream, DomainError>;

    async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        let mut stream = self.stream(prompt).await?;
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            answer.push_str(&fragment?);
        }
        Ok(answer)
    }
}
