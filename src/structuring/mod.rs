//! Turning extracted text into structured records.
//!
//! Structuring is normally delegated to a local Ollama model running in JSON mode. When no
//! provider is configured the pipeline falls back to a deterministic extractive structurer so
//! that the service stays usable without a model runtime.

mod extractive;
mod ollama;

pub use extractive::ExtractiveStructurer;
pub use ollama::OllamaStructurer;

use crate::config::{Config, StructuringProvider};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Adapter-defined fields of a structured record.
pub type StructuredFields = Map<String, Value>;

/// Errors surfaced while structuring extracted text.
#[derive(Debug, Error)]
pub enum StructuringError {
    /// The extracted text was empty or whitespace only.
    #[error("no text to structure")]
    EmptyInput,
    /// The provider was unreachable or answered with an error status.
    #[error("structuring provider failed: {0}")]
    Upstream(String),
    /// The provider answered, but not with a JSON object.
    #[error("structuring provider returned malformed output: {0}")]
    MalformedOutput(String),
}

impl StructuringError {
    /// Short machine-friendly label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty-input",
            Self::Upstream(_) => "upstream-failure",
            Self::MalformedOutput(_) => "malformed-output",
        }
    }
}

/// Interface implemented by structuring backends.
#[async_trait]
pub trait Structurer: Send + Sync {
    /// Convert raw text into a map of extracted fields.
    async fn structure(&self, text: String) -> Result<StructuredFields, StructuringError>;
}

/// Build the structurer selected by configuration.
pub fn build_structurer(config: &Config) -> Result<Arc<dyn Structurer>, StructuringError> {
    match config.structuring_provider {
        StructuringProvider::None => {
            tracing::info!("Using extractive structurer");
            Ok(Arc::new(ExtractiveStructurer::default()))
        }
        StructuringProvider::Ollama => {
            tracing::info!(
                url = %config.ollama_url,
                model = %config.structuring_model,
                "Using Ollama structurer"
            );
            Ok(Arc::new(OllamaStructurer::new(
                config.ollama_url.clone(),
                config.structuring_model.clone(),
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(StructuringError::EmptyInput.kind(), "empty-input");
        assert_eq!(
            StructuringError::Upstream("down".into()).kind(),
            "upstream-failure"
        );
        assert_eq!(
            StructuringError::MalformedOutput("[]".into()).kind(),
            "malformed-output"
        );
    }

    #[tokio::test]
    async fn default_config_builds_extractive_structurer() {
        let structurer = build_structurer(&Config::default()).expect("structurer");
        let fields = structurer
            .structure("hello world".into())
            .await
            .expect("fields");
        assert_eq!(fields["summary"], "hello world");
    }
}
