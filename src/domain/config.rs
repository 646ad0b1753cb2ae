use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::generation::{ModelEndpoint, SamplingConfig};
use crate::domain::segment::DEFAULT_MAX_CHUNK_CHARS;
use crate::domain::speech::default_voice_markers;
use crate::domain::DomainError;

/// API key that is wiped from memory on drop and never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Enable file logging with rotation.
    pub file_logging: bool,
    /// Maximum number of log files to keep.
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
            max_files: 7,
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// When true, every network request is blocked.
    pub offline: bool,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// User-Agent sent with page fetches.
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            offline: false,
            request_timeout_secs: 60,
            user_agent: "Mozilla/5.0 (compatible; Cogni-Flow/1.0)".to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// API base, without the `/models/...` suffix.
    pub base_url: String,
    /// Model ids in preference order.
    pub endpoints: Vec<String>,
    /// Key stored in the config file. The environment variable wins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKey>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let sampling = SamplingConfig::default();
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            endpoints: vec![
                "gemini-2.5-flash".to_string(),
                "gemini-2.0-flash".to_string(),
                "gemini-2.5-pro".to_string(),
            ],
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: sampling.temperature,
            top_k: sampling.top_k,
            top_p: sampling.top_p,
            max_output_tokens: sampling.max_output_tokens,
        }
    }
}

impl ModelConfig {
    pub fn model_endpoints(&self) -> Vec<ModelEndpoint> {
        self.endpoints
            .iter()
            .map(|model| ModelEndpoint::gemini(&self.base_url, model))
            .collect()
    }

    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// Resolve the API key from the environment, then the config file.
    pub fn resolve_api_key(&self) -> Result<ApiKey, DomainError> {
        let from_env = std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| ApiKey::new(v.trim()));

        from_env
            .or_else(|| self.api_key.clone().filter(|k| !k.expose().trim().is_empty()))
            .ok_or_else(|| {
                DomainError::Config(format!(
                    "No API key configured. Set {} or add api_key under [model] in the config file.",
                    self.api_key_env
                ))
            })
    }
}

/// Generation run tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Pause between artifact kinds, in milliseconds.
    pub kind_delay_ms: u64,
    /// Raw completions shorter than this are rejected before sanitizing.
    pub min_raw_chars: usize,
    /// Sanitized output shorter than this is rejected.
    pub min_clean_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            kind_delay_ms: 1000,
            min_raw_chars: 100,
            min_clean_chars: 50,
        }
    }
}

/// How a proxy returns the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyFormat {
    /// JSON envelope `{ "contents": "<html>" }`; target URL is percent-encoded.
    Json,
    /// Raw page body; target URL is appended as-is.
    Raw,
}

/// A public CORS proxy used when direct fetch fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Prefix the target URL is appended to.
    pub url: String,
    pub format: ProxyFormat,
}

/// Source acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Proxies tried in order after direct fetch.
    pub proxies: Vec<ProxyConfig>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            proxies: vec![
                ProxyConfig {
                    url: "https://api.allorigins.win/get?url=".to_string(),
                    format: ProxyFormat::Json,
                },
                ProxyConfig {
                    url: "https://thingproxy.freeboard.io/fetch/".to_string(),
                    format: ProxyFormat::Raw,
                },
            ],
        }
    }
}

/// Read-aloud configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Longest chunk spoken as one utterance.
    pub max_chunk_chars: usize,
    /// Expected speaking time per character at rate 1.0.
    pub fallback_ms_per_char: u64,
    /// Extra wait added to every fallback timer.
    pub fallback_slack_ms: u64,
    /// Voice-name fragments preferred when choosing a voice.
    pub preferred_voice_markers: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            fallback_ms_per_char: 80,
            fallback_slack_ms: 1500,
            preferred_voice_markers: default_voice_markers(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory exported artifacts are written to. Current directory if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<PathBuf>,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub network: NetworkConfig,
    pub model: ModelConfig,
    pub generation: GenerationConfig,
    pub source: SourceConfig,
    pub speech: SpeechConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Create a new AppConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints_in_priority_order() {
        let config = AppConfig::new();
        let endpoints = config.model.model_endpoints();
        let names: Vec<_> = endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["gemini-2.5-flash", "gemini-2.0-flash", "gemini-2.5-pro"]);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [model]
            endpoints = ["gemini-2.0-flash"]

            [speech]
            rate = 1.25
            "#,
        )
        .unwrap();
        assert_eq!(config.model.endpoints, ["gemini-2.0-flash"]);
        assert_eq!(config.model.top_k, 40);
        assert_eq!(config.speech.rate, 1.25);
        assert_eq!(config.speech.max_chunk_chars, 220);
        assert_eq!(config.generation.min_clean_chars, 50);
        assert_eq!(config.source.proxies.len(), 2);
    }

    #[test]
    fn test_proxy_format_parses() {
        let config: SourceConfig = toml::from_str(
            r#"
            [[proxies]]
            url = "https://proxy.example/raw/"
            format = "raw"
            "#,
        )
        .unwrap();
        assert_eq!(config.proxies[0].format, ProxyFormat::Raw);
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::new("secret-value");
        assert_eq!(format!("{:?}", key), "ApiKey(***)");
        assert_eq!(key.expose(), "secret-value");
    }

    #[test]
    fn test_resolve_api_key_from_config() {
        let config = ModelConfig {
            api_key: Some(ApiKey::new("from-file")),
            api_key_env: "COGNIFLOW_TEST_UNSET_KEY_VAR".to_string(),
            ..ModelConfig::default()
        };
        assert_eq!(config.resolve_api_key().unwrap().expose(), "from-file");
    }

    #[test]
    fn test_resolve_api_key_missing() {
        let config = ModelConfig {
            api_key: None,
            api_key_env: "COGNIFLOW_TEST_UNSET_KEY_VAR".to_string(),
            ..ModelConfig::default()
        };
        let err = config.resolve_api_key().unwrap_err();
        assert!(err.to_string().contains("COGNIFLOW_TEST_UNSET_KEY_VAR"));
    }
}
