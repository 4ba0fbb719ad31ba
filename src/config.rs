use std::env;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_STAGING_DIR: &str = "uploads";
const DEFAULT_OUTPUT_PATH: &str = "output.json";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_STRUCTURING_MODEL: &str = "llama3.1";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_STAGING_SWEEP_MINUTES: u64 = 60;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docsift server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origins allowed to call the API from a browser. `None` means any origin.
    pub allowed_origins: Option<Vec<String>>,
    /// Root directory under which uploads are staged per request.
    pub staging_dir: PathBuf,
    /// Location of the transient batch output file.
    pub output_path: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Maximum accepted request body size in bytes.
    pub max_upload_bytes: usize,
    /// Backend used to turn extracted text into structured records.
    pub structuring_provider: StructuringProvider,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Model identifier passed to the structuring provider.
    pub structuring_model: String,
    /// Age after which leftover request directories are swept at startup.
    pub staging_sweep_minutes: u64,
}

/// Supported structuring backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructuringProvider {
    /// Deterministic extractive summary computed in-process.
    None,
    /// Local Ollama runtime in JSON mode.
    Ollama,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allowed_origins: None,
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            server_port: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            structuring_provider: StructuringProvider::None,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            structuring_model: DEFAULT_STRUCTURING_MODEL.to_string(),
            staging_sweep_minutes: DEFAULT_STAGING_SWEEP_MINUTES,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            allowed_origins: load_env_optional("ALLOWED_ORIGINS")
                .map(|value| parse_origins(&value))
                .unwrap_or(defaults.allowed_origins),
            staging_dir: load_env_optional("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            output_path: load_env_optional("OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),
            server_port: parse_optional("SERVER_PORT")?,
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            structuring_provider: load_env_optional("STRUCTURING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("STRUCTURING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(defaults.structuring_provider),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            structuring_model: load_env_optional("STRUCTURING_MODEL")
                .unwrap_or(defaults.structuring_model),
            staging_sweep_minutes: parse_optional("STAGING_SWEEP_MINUTES")?
                .unwrap_or(defaults.staging_sweep_minutes),
        })
    }
}

/// Split a comma separated origin list. A lone `*` (or an empty list) allows any origin.
fn parse_origins(raw: &str) -> Option<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        None
    } else {
        Some(origins)
    }
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl std::str::FromStr for StructuringProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "extractive" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Read `.env` when present, then load configuration from the environment.
pub fn load() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    Config::from_env()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_origin_means_unrestricted() {
        assert_eq!(parse_origins("*"), None);
        assert_eq!(parse_origins(" , "), None);
        assert_eq!(parse_origins("http://a.test, *"), None);
    }

    #[test]
    fn origin_list_is_trimmed() {
        assert_eq!(
            parse_origins("http://a.test , http://b.test"),
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
    }

    #[test]
    fn provider_parses_known_values() {
        assert_eq!(
            "Ollama".parse::<StructuringProvider>(),
            Ok(StructuringProvider::Ollama)
        );
        assert_eq!(
            "none".parse::<StructuringProvider>(),
            Ok(StructuringProvider::None)
        );
        assert!("openai".parse::<StructuringProvider>().is_err());
    }

    #[test]
    fn defaults_use_relative_paths() {
        let config = Config::default();
        assert_eq!(config.staging_dir, PathBuf::from("uploads"));
        assert_eq!(config.output_path, PathBuf::from("output.json"));
        assert!(config.allowed_origins.is_none());
        assert_eq!(config.structuring_provider, StructuringProvider::None);
    }
}
