//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$DOCHARVEST_CONFIG` (environment variable)
//! 2. `~/.config/docharvest/config.toml` (Linux/macOS)
//!    `%APPDATA%\docharvest\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags take precedence over every value here.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::feed::FeedSource;
use crate::fingerprint::DEFAULT_CHUNK_SIZE;

/// Log file written inside [`cache_dir`].
pub const LOG_FILE_NAME: &str = "docharvest.log";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Which attachments count as documents.
    pub documents: DocumentsConfig,
    /// Feed backend settings.
    pub feed: FeedConfig,
    /// Scanner defaults.
    pub scan: ScanConfig,
    /// Bundler defaults.
    pub bundle: BundleConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Target document type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// MIME type that marks an attachment as a document.
    pub mime_type: String,
    /// Filename extension (without dot) accepted when the MIME type is missing or wrong.
    pub extension: String,
}

/// Feed backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Default backend when `--source` is not given.
    pub source: FeedSource,
    /// Base URL of the HTTP message API.
    pub base_url: Option<String>,
    /// Name of the environment variable holding the pre-issued access token.
    pub token_env: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Messages requested per HTTP page.
    pub page_size: usize,
}

/// Scanner defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Root directory for downloaded documents.
    pub out_dir: PathBuf,
    /// Location of the durable download state.
    pub state_file: PathBuf,
    /// How many of the newest downloads to list after a run.
    pub recent_downloads_shown: usize,
}

/// Bundler defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Directory tree scanned for documents.
    pub in_dir: PathBuf,
    /// Bundle output root.
    pub out_dir: PathBuf,
    /// Name of the flat document directory under `out_dir`.
    pub documents_subdir: String,
    /// Read chunk size used while fingerprinting.
    pub hash_chunk_size: usize,
    /// Fingerprint files on all cores.
    pub parallel: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            mime_type: "application/pdf".to_string(),
            extension: "pdf".to_string(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: FeedSource::Mbox,
            base_url: None,
            token_env: "DOCHARVEST_FEED_TOKEN".to_string(),
            timeout_secs: 60,
            page_size: 100,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("downloads/feed_documents"),
            state_file: PathBuf::from("state/downloader_state.json"),
            recent_downloads_shown: 10,
        }
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            in_dir: PathBuf::from("downloads/feed_documents"),
            out_dir: PathBuf::from("upload_bundle"),
            documents_subdir: "pdfs".to_string(),
            hash_chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: true,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

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

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("DOCHARVEST_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("docharvest").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docharvest")
}
