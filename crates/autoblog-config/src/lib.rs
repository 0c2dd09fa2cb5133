use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use autoblog_types::GenerationSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// HTTP backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bearer token required on mutating routes (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Browser origins allowed by CORS; empty allows any origin.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cors_origins: Vec<String>,
    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    4000
}

fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            auth_token: None,
            cors_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Database location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file; `~/.autoblog/autoblog.db` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

/// Gemini content-generation client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key; falls back to `GEMINI_API_KEY`, then `API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_pro_image_model")]
    pub pro_image_model: String,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_text_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_pro_image_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}

fn default_request_timeout_secs() -> u64 {
    90
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            text_model: default_text_model(),
            image_model: default_image_model(),
            pro_image_model: default_pro_image_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GeminiConfig {
    /// The configured key, or the first one found in the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|k| !k.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Pacing and retention knobs for the autopilot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopilotConfig {
    /// Debounce between `start` and the first job.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay used when the persisted next run time is already in the past.
    #[serde(default = "default_fire_soon_delay_ms")]
    pub fire_soon_delay_ms: u64,
    /// Extra wait after local midnight before re-evaluating the quota.
    #[serde(default = "default_rollover_margin_ms")]
    pub rollover_margin_ms: u64,
    /// Pause between articles of a single-session run.
    #[serde(default = "default_inter_job_pause_ms")]
    pub inter_job_pause_ms: u64,
    /// How long a finished single-session run shows `complete`/`error`.
    #[serde(default = "default_complete_cooldown_ms")]
    pub complete_cooldown_ms: u64,
    /// Upper bound for each content-generation call.
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
    /// Author recorded on generated posts.
    #[serde(default = "default_author")]
    pub author: String,
}

fn default_initial_delay_ms() -> u64 {
    2_000
}

fn default_fire_soon_delay_ms() -> u64 {
    5_000
}

fn default_rollover_margin_ms() -> u64 {
    1_000
}

fn default_inter_job_pause_ms() -> u64 {
    5_000
}

fn default_complete_cooldown_ms() -> u64 {
    8_000
}

fn default_generation_timeout_secs() -> u64 {
    120
}

fn default_max_log_entries() -> usize {
    200
}

fn default_author() -> String {
    "automated".to_string()
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            fire_soon_delay_ms: default_fire_soon_delay_ms(),
            rollover_margin_ms: default_rollover_margin_ms(),
            inter_job_pause_ms: default_inter_job_pause_ms(),
            complete_cooldown_ms: default_complete_cooldown_ms(),
            generation_timeout_secs: default_generation_timeout_secs(),
            max_log_entries: default_max_log_entries(),
            author: default_author(),
        }
    }
}

impl AutopilotConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn fire_soon_delay(&self) -> Duration {
        Duration::from_millis(self.fire_soon_delay_ms)
    }

    pub fn rollover_margin(&self) -> Duration {
        Duration::from_millis(self.rollover_margin_ms)
    }

    pub fn inter_job_pause(&self) -> Duration {
        Duration::from_millis(self.inter_job_pause_ms)
    }

    pub fn complete_cooldown(&self) -> Duration {
        Duration::from_millis(self.complete_cooldown_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

/// Top-level autoblog configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoBlogConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub autopilot: AutopilotConfig,
    /// Generation settings used when none are given explicitly.
    #[serde(default)]
    pub defaults: GenerationSettings,
}

impl AutoBlogConfig {
    /// Database path: explicit setting, else `autoblog.db` in the config dir.
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("autoblog.db")),
        }
    }
}

/// Resolve the autoblog config directory (~/.autoblog/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".autoblog"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.autoblog/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<AutoBlogConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<AutoBlogConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(AutoBlogConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: AutoBlogConfig = json5::from_str(&content)?;
    Ok(config)
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Save configuration to the default path.
pub fn save_config(config: &AutoBlogConfig) -> Result<(), ConfigError> {
    let dir = ensure_config_dir()?;
    let path = dir.join("config.json5");
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
