use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    pub blob: BlobConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// S3-compatible blob store settings. Credentials come from the
/// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` environment, never from
/// this file.
#[derive(Debug, Deserialize, Clone)]
pub struct BlobConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Key prefix under which transcripts are stored.
    #[serde(default = "default_blob_prefix")]
    pub prefix: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_blob_prefix() -> String {
    "chat-history/anonymous".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Messages-style completion endpoint.
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Environment variable holding the API key. When the variable is
    /// unset, the backend is unconfigured and `fallback_response` is
    /// returned instead of failing.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_fallback_response")]
    pub fallback_response: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            fallback_response: default_fallback_response(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_generation_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}
fn default_api_key_env() -> String {
    "GENERATION_API_KEY".to_string()
}
fn default_fallback_response() -> String {
    "The assistant is not configured yet. Please set up a generation backend.".to_string()
}
fn default_max_tokens() -> u32 {
    500
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Age boundary between the recency window and the relevance window.
    #[serde(default = "default_recency_hours")]
    pub recency_hours: i64,
    #[serde(default = "default_window_limit")]
    pub recency_limit: i64,
    #[serde(default = "default_window_limit")]
    pub relevance_limit: i64,
    /// Hard cap on assembled context, in characters.
    #[serde(default = "default_context_max_chars")]
    pub context_max_chars: usize,
    /// Maximum pinned articles resolved in explicit mode.
    #[serde(default = "default_pinned_limit")]
    pub pinned_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            recency_hours: default_recency_hours(),
            recency_limit: default_window_limit(),
            relevance_limit: default_window_limit(),
            context_max_chars: default_context_max_chars(),
            pinned_limit: default_pinned_limit(),
        }
    }
}

fn default_recency_hours() -> i64 {
    48
}
fn default_window_limit() -> i64 {
    15
}
fn default_context_max_chars() -> usize {
    8000
}
fn default_pinned_limit() -> i64 {
    10
}

/// Per-route rate limits, in requests per minute per client address.
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_chat_per_minute")]
    pub chat_per_minute: u32,
    #[serde(default = "default_write_per_minute")]
    pub write_per_minute: u32,
    #[serde(default = "default_read_per_minute")]
    pub read_per_minute: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            chat_per_minute: default_chat_per_minute(),
            write_per_minute: default_write_per_minute(),
            read_per_minute: default_read_per_minute(),
        }
    }
}

fn default_chat_per_minute() -> u32 {
    20
}
fn default_write_per_minute() -> u32 {
    10
}
fn default_read_per_minute() -> u32 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.blob.bucket.is_empty() {
        anyhow::bail!("blob.bucket must not be empty");
    }

    if config.retrieval.recency_hours < 1 {
        anyhow::bail!("retrieval.recency_hours must be >= 1");
    }

    if config.retrieval.context_max_chars == 0 {
        anyhow::bail!("retrieval.context_max_chars must be > 0");
    }

    if config.limits.chat_per_minute == 0
        || config.limits.write_per_minute == 0
        || config.limits.read_per_minute == 0
    {
        anyhow::bail!("limits.*_per_minute must be > 0");
    }

    Ok(config)
}
