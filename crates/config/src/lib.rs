//! Configuration loading, validation, and management for twinsearch.
//!
//! Loads configuration from `~/.twinsearch/config.toml` (or an explicit
//! path), then a `.env` file in the working directory, then environment
//! variable overrides. Credentials are checked once, at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The question asked when the user submits a blank one.
pub const DEFAULT_QUESTION: &str = "What is the worlds largest dog breed?";

/// The root configuration structure.
///
/// Maps directly to `~/.twinsearch/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the language model (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Language-model provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Question used when the user input is blank
    #[serde(default = "default_question")]
    pub default_question: String,

    /// System prompt seeded at the start of every turn
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Search provider configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Provider-specific overrides for the language model
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4.1".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_question() -> String {
    DEFAULT_QUESTION.into()
}

fn default_system_prompt() -> String {
    concat!(
        "Answer the user question and be concise. Respond with only the essential information. ",
        "Use both the Tavily and Google Search tools to find the answer. ",
        "In your answer, cite both results separately and show their source. ",
        "Your reply should follow the format below:\n",
        "<Answer to the user question>\n",
        "\n",
        "<Answer from Tavily> : source <URL>\n",
        "<Answer from Google Search> : source <URL>\n",
        "\n",
        "If a search tool reports that it returned no result, say so in place of its answer. ",
        "Token usage and answer similarity are appended automatically; do not estimate them."
    )
    .into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("default_question", &self.default_question)
            .field("search", &self.search)
            .field("providers", &self.providers)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Per-call timeout; expiry counts as a search failure
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub tavily: TavilyConfig,

    #[serde(default)]
    pub google: GoogleConfig,
}

fn default_timeout_secs() -> u64 {
    20
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            tavily: TavilyConfig::default(),
            google: GoogleConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TavilyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_tavily_url")]
    pub api_url: String,

    #[serde(default = "default_tavily_results")]
    pub max_results: usize,

    #[serde(default = "default_tavily_topic")]
    pub topic: String,
}

fn default_tavily_url() -> String {
    "https://api.tavily.com".into()
}
fn default_tavily_results() -> usize {
    2
}
fn default_tavily_topic() -> String {
    "general".into()
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_tavily_url(),
            max_results: default_tavily_results(),
            topic: default_tavily_topic(),
        }
    }
}

impl std::fmt::Debug for TavilyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("max_results", &self.max_results)
            .field("topic", &self.topic)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Programmable Search Engine id (`cx`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cse_id: Option<String>,

    #[serde(default = "default_google_url")]
    pub api_url: String,

    #[serde(default = "default_google_results")]
    pub num_results: usize,
}

fn default_google_url() -> String {
    "https://www.googleapis.com".into()
}
fn default_google_results() -> usize {
    5
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            cse_id: None,
            api_url: default_google_url(),
            num_results: default_google_results(),
        }
    }
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("api_key", &redact(&self.api_key))
            .field("cse_id", &self.cse_id)
            .field("api_url", &self.api_url)
            .field("num_results", &self.num_results)
            .finish()
    }
}

impl AppConfig {
    /// Load from `path` (or the default path), then `.env`, then the
    /// process environment.
    ///
    /// Environment variables:
    /// - `OPENAI_API_KEY` / `TWINSEARCH_API_KEY`: language model key
    /// - `TWINSEARCH_PROVIDER`, `TWINSEARCH_MODEL`
    /// - `TAVILY_API_KEY`
    /// - `GOOGLE_API_KEY`, `GOOGLE_CSE_ID`
    pub fn load_with_path(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_dir().join("config.toml"),
        };
        let mut config = Self::load_from(&config_path)?;

        match dotenv::dotenv() {
            Ok(env_path) => tracing::debug!("Loaded environment from {}", env_path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Ignoring unreadable .env file: {e}"),
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Credentials from the environment only fill gaps left by the file;
    /// provider and model selection always override.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api_key.is_none() {
            self.api_key = non_empty("TWINSEARCH_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"));
        }
        if self.search.tavily.api_key.is_none() {
            self.search.tavily.api_key = non_empty("TAVILY_API_KEY");
        }
        if self.search.google.api_key.is_none() {
            self.search.google.api_key = non_empty("GOOGLE_API_KEY");
        }
        if self.search.google.cse_id.is_none() {
            self.search.google.cse_id = non_empty("GOOGLE_CSE_ID");
        }
        if let Some(provider) = non_empty("TWINSEARCH_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = non_empty("TWINSEARCH_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".twinsearch")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.default_model.trim().is_empty() || self.default_model.contains(char::is_whitespace)
        {
            return Err(ConfigError::ValidationError(format!(
                "invalid model id '{}'",
                self.default_model
            )));
        }

        if !(1..=10).contains(&self.search.tavily.max_results) {
            return Err(ConfigError::ValidationError(
                "search.tavily.max_results must be between 1 and 10".into(),
            ));
        }

        if !(1..=10).contains(&self.search.google.num_results) {
            return Err(ConfigError::ValidationError(
                "search.google.num_results must be between 1 and 10".into(),
            ));
        }

        if self.search.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "search.timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// The API key for the language model, preferring a provider override.
    pub fn llm_api_key(&self) -> Option<String> {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Check that every credential needed for a turn is present.
    ///
    /// Reports all missing credentials at once.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();

        if self.default_provider != "ollama" && self.llm_api_key().is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.search.tavily.api_key.is_none() {
            missing.push("TAVILY_API_KEY");
        }
        if self.search.google.api_key.is_none() {
            missing.push("GOOGLE_API_KEY");
        }
        if self.search.google.cse_id.is_none() {
            missing.push("GOOGLE_CSE_ID");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredentials(
                missing.into_iter().map(String::from).collect(),
            ))
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            default_question: default_question(),
            system_prompt: default_system_prompt(),
            search: SearchConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),
}
