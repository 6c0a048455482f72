//! Configuration loading, validation, and management for Stringer.
//!
//! Loads configuration from `~/.stringer/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stringer/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model backend base URL (OpenAI-compatible)
    #[serde(default = "default_model_base_url")]
    pub model_base_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Turn-loop configuration
    #[serde(default, rename = "loop")]
    pub turn_loop: LoopConfig,

    /// Web search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Source-filter retry configuration
    #[serde(default)]
    pub filter: FilterConfig,

    /// Translation configuration
    #[serde(default)]
    pub translate: TranslateConfig,

    /// Image generation configuration
    #[serde(default)]
    pub image: ImageConfig,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_model_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
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
            .field("model_base_url", &self.model_base_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("turn_loop", &self.turn_loop)
            .field("search", &self.search)
            .field("filter", &self.filter)
            .field("translate", &self.translate)
            .field("image", &self.image)
            .finish()
    }
}

/// Turn-loop limits.
///
/// `max_turns` is the single authoritative budget: the loop enforces it and
/// the stream processor warns from it. There is no separate soft cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Maximum simultaneously in-flight tool calls per turn
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Display length for tool-output previews
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_max_turns() -> u32 {
    20
}
fn default_concurrency() -> usize {
    4
}
fn default_preview_chars() -> usize {
    150
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            concurrency: default_concurrency(),
            preview_chars: default_preview_chars(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Default search depth ("standard" | "deep")
    #[serde(default = "default_depth")]
    pub depth: String,

    /// Maximum sites returned by source discovery
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Recency window for local news, in days
    #[serde(default = "default_since_days")]
    pub since_days: u32,
}

fn default_search_base_url() -> String {
    "https://api.linkup.so/v1".into()
}
fn default_depth() -> String {
    "standard".into()
}
fn default_top_n() -> usize {
    10
}
fn default_since_days() -> u32 {
    7
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_search_base_url(),
            depth: default_depth(),
            top_n: default_top_n(),
            since_days: default_since_days(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("depth", &self.depth)
            .field("top_n", &self.top_n)
            .field("since_days", &self.since_days)
            .finish()
    }
}

/// Source-filter (tighten-and-retry) policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Maximum tighten-and-retry attempts per search sub-flow
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Generic/global hosts excluded from local-source searches
    #[serde(default = "default_global_excludes")]
    pub global_excludes: Vec<String>,
}

fn default_max_attempts() -> u32 {
    4
}
fn default_global_excludes() -> Vec<String> {
    [
        "wikipedia.org",
        "britannica.com",
        "quora.com",
        "medium.com",
        "youtube.com",
        "pinterest.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            global_excludes: default_global_excludes(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Translation API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_translate_base_url")]
    pub base_url: String,

    /// Default target language when the model omits one
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
}

fn default_translate_base_url() -> String {
    "https://api-free.deepl.com/v2".into()
}
fn default_target_lang() -> String {
    "EN-US".into()
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_translate_base_url(),
            target_lang: default_target_lang(),
        }
    }
}

impl std::fmt::Debug for TranslateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslateConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("target_lang", &self.target_lang)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image generation API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_image_base_url")]
    pub base_url: String,

    /// Where generated images are saved when the model asks for persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<String>,
}

fn default_image_base_url() -> String {
    "https://api.freepik.com/v1".into()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_image_base_url(),
            save_dir: None,
        }
    }
}

impl std::fmt::Debug for ImageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("save_dir", &self.save_dir)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stringer/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `STRINGER_API_KEY` / `OPENAI_API_KEY` (model)
    /// - `LINKUP_API_KEY` (search)
    /// - `DEEPL_AUTH_KEY` (translation)
    /// - `FREEPIK_API_KEY` (image generation)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("STRINGER_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if config.search.api_key.is_none() {
            config.search.api_key = std::env::var("LINKUP_API_KEY").ok();
        }
        if config.translate.api_key.is_none() {
            config.translate.api_key = std::env::var("DEEPL_AUTH_KEY").ok();
        }
        if config.image.api_key.is_none() {
            config.image.api_key = std::env::var("FREEPIK_API_KEY").ok();
        }

        // Allow env var to override the default model
        if let Ok(model) = std::env::var("STRINGER_MODEL") {
            config.default_model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stringer")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.turn_loop.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "loop.max_turns must be greater than 0".into(),
            ));
        }

        if self.turn_loop.concurrency == 0 || self.turn_loop.concurrency > 8 {
            return Err(ConfigError::ValidationError(
                "loop.concurrency must be between 1 and 8".into(),
            ));
        }

        if self.filter.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "filter.max_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if a model API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_base_url: default_model_base_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            turn_loop: LoopConfig::default(),
            search: SearchConfig::default(),
            filter: FilterConfig::default(),
            translate: TranslateConfig::default(),
            image: ImageConfig::default(),
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
}
