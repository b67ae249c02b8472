//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$BOARDNEWS_CONFIG` (environment variable)
//! 2. `~/.config/boardnews/config.toml` (Linux/macOS)
//!    `%APPDATA%\boardnews\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Inbound article decoding policy.
    pub processor: ProcessorConfig,
    /// Article cache tuning.
    pub cache: CacheConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root of the content store (attachments, cached articles, posts).
    pub data_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// How inbound MIME bodies are decomposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Try UTF-8 for text parts that declare no charset.
    pub try_utf8: bool,
    /// Accept `Content-Transfer-Encoding: binary`.
    pub allow_binary: bool,
    /// Charset assumed for undeclared text that is not valid UTF-8.
    pub empty_charset: String,
    /// Maximum size of the inline message text in bytes.
    pub max_text_len: usize,
    /// Maximum size of the article's top-level header block in bytes.
    pub article_header_limit: usize,
    /// Maximum size of a MIME part header block in bytes.
    pub header_size_limit: usize,
    /// Maximum multipart nesting depth.
    pub max_depth: usize,
}

/// Article cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Copy buffer size used when streaming articles to clients.
    pub read_buffer_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            try_utf8: true,
            allow_binary: false,
            empty_charset: "ISO-8859-1".to_string(),
            max_text_len: (64 << 10) - 1,
            article_header_limit: 64 << 10,
            header_size_limit: 8 << 10,
            max_depth: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 32 * 1024, // 32 KB
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(path)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("BOARDNEWS_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("boardnews").join("config.toml"))
}

/// Return the data directory holding the content store.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boardnews")
}

/// Return the log file directory.
pub fn log_dir(config: &Config) -> PathBuf {
    data_dir(config).join("log")
}
