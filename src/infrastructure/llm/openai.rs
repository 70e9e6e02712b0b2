use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{
    ports::{LlmService, TextStream},
    DomainError,
};
use crate::infrastructure::config::LlmConfig;

/// Streaming chat completions against an OpenAI-compatible endpoint. The
/// composed prompt is sent as a single user message.
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[async_trait]
impl LlmService for OpenAiChatModel {
    async fn stream(&self, prompt: &str) -> Result<TextStream, DomainError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            stream: true,
        };

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let res = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| DomainError::timeout("chat completion request timed out"))?
            .map_err(|e| DomainError::external(format!("chat completion request failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(DomainError::external(format!(
                "chat completion returned {status}: {text}"
            )));
        }
        debug!(model = %self.model, prompt_chars = prompt.len(), "completion stream opened");

        let (tx, rx) = mpsc::channel(32);
        let mut bytes = res.bytes_stream();

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(item) = bytes.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(Err(DomainError::external(format!("stream interrupted: {e}"))))
                            .await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                // Only complete lines are parsed; the tail waits for more bytes.
                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        SseLine::Delta(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Done => return,
                        SseLine::Failed(message) => {
                            let _ = tx.send(Err(DomainError::external(message))).await;
                            return;
                        }
                        SseLine::Skip => {}
                    }
                }
            }

            // A body that closes before [DONE] is a truncated answer.
            if parse_sse_line(&String::from_utf8_lossy(&buffer)) == SseLine::Done {
                return;
            }
            warn!(pending = buffer.len(), "completion stream ended before [DONE]");
            let _ = tx
                .send(Err(DomainError::external(
                    "completion stream ended before [DONE]",
                )))
                .await;
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
    Failed(String),
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return SseLine::Skip;
    };
    if let Some(message) = json["error"]["message"].as_str() {
        return SseLine::Failed(format!("chat completion failed: {message}"));
    }

    match json["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => SseLine::Delta(content.to_string()),
        _ => SseLine::Skip,
    }
}
