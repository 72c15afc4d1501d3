//! Configuration types, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Web search settings. Search is disabled when no API key is set.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: Option<SecretString>,
    pub endpoint: String,
    pub timeout: Duration,
    /// Results kept for summarization.
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.tavily.com/search".to_string(),
            timeout: Duration::from_secs(15),
            max_results: 3,
        }
    }
}

/// Image model settings. Image editing is disabled when no API key is set.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub api_key: Option<SecretString>,
    pub endpoint: String,
    /// Models tried in order until one returns an image.
    pub models: Vec<String>,
    pub timeout: Duration,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            models: vec![
                "gemini-2.5-flash-image-preview".to_string(),
                "gemini-2.0-flash-exp".to_string(),
            ],
            timeout: Duration::from_secs(90),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub image: ImageConfig,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    pub port: u16,
    /// Directory for rolling log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build the configuration from `ARTISAN_*` environment variables.
    ///
    /// Only the LLM API key is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match env_or("ARTISAN_LLM_BACKEND", "anthropic").to_lowercase().as_str() {
            "anthropic" => LlmBackend::Anthropic,
            "openai" => LlmBackend::OpenAi,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "ARTISAN_LLM_BACKEND".to_string(),
                    message: format!("unknown backend '{other}' (expected anthropic or openai)"),
                });
            }
        };

        let fallback_key_var = match backend {
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        };
        let api_key = std::env::var("ARTISAN_LLM_API_KEY")
            .or_else(|_| std::env::var(fallback_key_var))
            .map_err(|_| ConfigError::MissingEnvVar("ARTISAN_LLM_API_KEY".to_string()))?;

        let default_model = match backend {
            LlmBackend::Anthropic => "claude-sonnet-4-20250514",
            LlmBackend::OpenAi => "gpt-4o-mini",
        };

        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(api_key),
            model: env_or("ARTISAN_MODEL", default_model),
            timeout: Duration::from_secs(parse_env("ARTISAN_LLM_TIMEOUT_SECS", 30)?),
            max_retries: parse_env("ARTISAN_LLM_MAX_RETRIES", 2)?,
        };

        let mut search = SearchConfig {
            api_key: std::env::var("ARTISAN_SEARCH_API_KEY").ok().map(SecretString::from),
            timeout: Duration::from_secs(parse_env("ARTISAN_SEARCH_TIMEOUT_SECS", 15)?),
            ..SearchConfig::default()
        };
        if let Ok(url) = std::env::var("ARTISAN_SEARCH_URL") {
            search.endpoint = url;
        }

        let mut image = ImageConfig {
            api_key: std::env::var("ARTISAN_IMAGE_API_KEY")
                .or_else(|_| std::env::var("GOOGLE_API_KEY"))
                .ok()
                .map(SecretString::from),
            ..ImageConfig::default()
        };
        if let Ok(models) = std::env::var("ARTISAN_IMAGE_MODELS") {
            let models = split_list(&models);
            if !models.is_empty() {
                image.models = models;
            }
        }

        Ok(Self {
            llm,
            search,
            image,
            db_path: PathBuf::from(env_or("ARTISAN_DB_PATH", "./data/artisan-assist.db")),
            media_dir: PathBuf::from(env_or("ARTISAN_MEDIA_DIR", "./data/media")),
            port: parse_env("ARTISAN_PORT", 8080)?,
            log_dir: std::env::var("ARTISAN_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Split a comma-separated list, dropping blanks.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list(" a, ,b ,,c"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_list("  ").is_empty());
    }

    #[test]
    fn parse_env_uses_default_when_unset() {
        let value: u64 = parse_env("ARTISAN_TEST_UNSET_VARIABLE_XYZ", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn search_defaults_keep_top_three() {
        let search = SearchConfig::default();
        assert_eq!(search.max_results, 3);
        assert!(search.api_key.is_none());
    }

    #[test]
    fn image_defaults_have_fallback_models() {
        let image = ImageConfig::default();
        assert!(image.models.len() >= 2);
    }
}
