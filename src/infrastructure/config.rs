use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::chunking::{default_separators, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::domain::{DomainError, MmrParams, PromptTemplates, TemplateDispatch, TextSplitter};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

/// Everything the service needs at startup: the YAML settings, the prompt
/// templates and the API credential taken from the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub config: Config,
    #[serde(default)]
    pub prompts: PromptTemplates,
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: MmrParams,
    pub sessions: SessionConfig,
    pub uploads: UploadConfig,
    pub templates: TemplateConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub dispatch: TemplateDispatch,
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
            timeout_seconds: 120,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: default_separators(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_seconds: 3600,
            sweep_interval_seconds: 60,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["xml".to_string()],
        }
    }
}

impl AppConfig {
    /// Reads the YAML file named by `APP_CONFIG` (or the default path when it
    /// exists), applies environment overrides and validates the result.
    pub fn load() -> Result<Self, DomainError> {
        let explicit = std::env::var("APP_CONFIG").ok().map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if explicit.is_some() || path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DomainError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
            .map_err(|e| DomainError::configuration(format!("invalid configuration: {e}")))
    }

    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), DomainError> {
        if let Some(host) = lookup("SERVER_HOST") {
            self.config.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT") {
            self.config.server.port = port
                .parse()
                .map_err(|_| DomainError::configuration(format!("invalid SERVER_PORT '{port}'")))?;
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            self.config.llm.base_url = base_url;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.credentials.api_key = key;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.credentials.api_key.trim().is_empty() {
            return Err(DomainError::configuration("OPENAI_API_KEY is not set"));
        }
        self.splitter()?;
        self.config.retrieval.validate()?;

        let incomplete = self.prompts.incomplete();
        if !incomplete.is_empty() {
            let names: Vec<_> = incomplete.iter().map(|n| n.as_str()).collect();
            return Err(DomainError::configuration(format!(
                "prompt templates missing {{query}} or {{snippets}}: {}",
                names.join(", ")
            )));
        }
        if self.config.sessions.idle_ttl_seconds == 0 || self.config.sessions.sweep_interval_seconds == 0 {
            return Err(DomainError::configuration(
                "session idle_ttl_seconds and sweep_interval_seconds must be positive",
            ));
        }
        Ok(())
    }

    pub fn splitter(&self) -> Result<TextSplitter, DomainError> {
        let chunking = &self.config.chunking;
        TextSplitter::new(
            chunking.chunk_size,
            chunking.chunk_overlap,
            chunking.separators.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Notation;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.config.chunking.chunk_size, 500);
        assert_eq!(config.config.chunking.chunk_overlap, 100);
        assert_eq!(config.config.retrieval, MmrParams::default());
        assert_eq!(config.config.llm.model, "gpt-4o");
        assert_eq!(config.config.templates.dispatch, TemplateDispatch::Strict);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config = AppConfig::from_yaml(
            r#"
server:
  port: 9000
retrieval:
  k: 4
  fetch_k: 8
  lambda_mult: 0.5
templates:
  dispatch: legacy
prompts:
  stl: "STL {subject} {snippets} {query} {memory}"
"#,
        )
        .unwrap();

        assert_eq!(config.config.server.port, 9000);
        assert_eq!(config.config.server.host, "0.0.0.0");
        assert_eq!(config.config.retrieval.k, 4);
        assert_eq!(config.config.templates.dispatch, TemplateDispatch::Legacy);
        assert_eq!(config.prompts.stl, "STL {subject} {snippets} {query} {memory}");
        assert!(config.prompts.template(Notation::Ladder).contains("Ladder"));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let shipped = AppConfig::from_file(&path).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(shipped.config.chunking.separators, defaults.config.chunking.separators);
        assert_eq!(shipped.config.retrieval, defaults.config.retrieval);
        assert_eq!(shipped.config.server.port, defaults.config.server.port);
        assert_eq!(shipped.prompts, defaults.prompts);
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(DomainError::Configuration(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("SERVER_PORT", "3000"),
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_BASE_URL", "http://localhost:1234/v1"),
            ]))
            .unwrap();

        assert_eq!(config.config.server.port, 3000);
        assert_eq!(config.config.llm.base_url, "http://localhost:1234/v1");
        assert!(config.validate().is_ok());
        assert!(!format!("{:?}", config.credentials).contains("sk-test"));

        assert!(config.apply_env(env(&[("SERVER_PORT", "eighty")])).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_pipeline_settings() {
        let mut config = AppConfig::default();
        config.credentials.api_key = "sk-test".into();

        config.config.chunking.chunk_overlap = 500;
        assert!(config.validate().is_err());

        config.config.chunking.chunk_overlap = 100;
        config.config.retrieval.fetch_k = 10;
        assert!(config.validate().is_err());

        config.config.retrieval.fetch_k = 100;
        config.prompts.fbd = "no placeholders".into();
        assert!(config.validate().is_err());
    }
}
