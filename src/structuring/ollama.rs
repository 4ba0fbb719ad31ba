use super::{StructuredFields, Structurer, StructuringError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

/// Upper bound on document characters forwarded to the model.
const MAX_PROMPT_CHARS: usize = 24_000;

const PROMPT_PREAMBLE: &str = "You extract structured data from documents. \
Read the document below and answer with a single JSON object. \
Use camelCase keys, include a short `summary`, a `documentType`, and any named people, \
organisations, dates, amounts or identifiers you can find. \
Do not invent values that are not present in the document.\n\nDocument:\n";

/// Structurer backed by Ollama's `/api/generate` endpoint in JSON mode.
pub struct OllamaStructurer {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaStructurer {
    /// Create a client for the Ollama runtime at `base_url`.
    pub fn new(base_url: String, model: String) -> Result<Self, StructuringError> {
        let http = Client::builder()
            .user_agent("docsift/structuring")
            .build()
            .map_err(|error| {
                StructuringError::Upstream(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl Structurer for OllamaStructurer {
    async fn structure(&self, text: String) -> Result<StructuredFields, StructuringError> {
        if text.trim().is_empty() {
            return Err(StructuringError::EmptyInput);
        }

        let payload = json!({
            "model": self.model,
            "prompt": build_prompt(&text),
            "stream": false,
            "format": "json",
            "options": {
                "temperature": 0.1,
            }
        });

        tracing::debug!(
            model = %self.model,
            characters = text.chars().count(),
            "Requesting structured output"
        );

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                StructuringError::Upstream(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StructuringError::Upstream(format!(
                "Ollama endpoint {} returned 404 (is model '{}' pulled?)",
                self.endpoint(),
                self.model
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StructuringError::Upstream(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            StructuringError::MalformedOutput(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(StructuringError::MalformedOutput(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        parse_fields(&body.response)
    }
}

fn build_prompt(text: &str) -> String {
    let mut prompt = String::with_capacity(PROMPT_PREAMBLE.len() + text.len().min(MAX_PROMPT_CHARS));
    prompt.push_str(PROMPT_PREAMBLE);
    match text.char_indices().nth(MAX_PROMPT_CHARS) {
        Some((cut, _)) => prompt.push_str(&text[..cut]),
        None => prompt.push_str(text),
    }
    prompt
}

fn parse_fields(raw: &str) -> Result<StructuredFields, StructuringError> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StructuringError::MalformedOutput(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
        Err(error) => Err(StructuringError::MalformedOutput(format!(
            "model output is not JSON: {error}"
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
