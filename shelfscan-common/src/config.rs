//! Configuration loading for the shelfscan services
//!
//! Resolution priority: compiled defaults → TOML config file →
//! environment variable overrides (`SHELFSCAN_*`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Service configuration for shelfscan-api
///
/// All fields have working defaults so the service starts with no
/// config file present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// SQLite database file; resolved under the platform data dir when unset
    pub database_path: Option<PathBuf>,
    /// Vision inference endpoint (opaque external collaborator)
    pub vision_base_url: String,
    /// API key sent as a bearer token to the vision endpoint
    pub vision_api_key: Option<String>,
    /// Call-level timeout for one vision inference request
    pub vision_timeout_secs: u64,
    /// Maximum accepted image size in bytes; larger uploads are rejected
    pub max_image_bytes: usize,
    /// Maximum photos in one batch scan request
    pub max_batch_photos: usize,
    /// Job record time-to-live; expired records are treated as absent
    pub job_ttl_secs: u64,
    /// How long a terminal job record is kept before hard deletion
    pub terminal_retention_secs: u64,
    /// Interval between readiness polls of the job record
    pub readiness_poll_ms: u64,
    /// Upper bound on the readiness wait; processing proceeds after this
    pub readiness_timeout_ms: u64,
    /// Detections below this confidence are never sent for enrichment
    pub enrichment_confidence_threshold: f64,
    /// Open Library base URL (overridable for tests / self-hosting)
    pub open_library_base_url: String,
    /// Google Books base URL (overridable for tests / self-hosting)
    pub google_books_base_url: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5730,
            database_path: None,
            vision_base_url: "http://127.0.0.1:8787/analyze".to_string(),
            vision_api_key: None,
            vision_timeout_secs: 30,
            max_image_bytes: 10 * 1024 * 1024,
            max_batch_photos: 5,
            job_ttl_secs: 300,
            terminal_retention_secs: 60,
            readiness_poll_ms: 100,
            readiness_timeout_ms: 5000,
            enrichment_confidence_threshold: 0.3,
            open_library_base_url: "https://openlibrary.org".to_string(),
            google_books_base_url: "https://www.googleapis.com/books/v1".to_string(),
        }
    }
}

impl ScanConfig {
    /// Load configuration: defaults, then TOML file, then environment
    pub fn load() -> Self {
        let mut config = match Self::config_file_path() {
            Some(path) if path.exists() => match Self::from_toml_file(&path) {
                Ok(config) => {
                    info!("Configuration loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Ignoring unreadable config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            _ => Self::default(),
        };

        config.apply_env_from(|name| std::env::var(name).ok());
        config
    }

    /// Platform config file location, e.g. `~/.config/shelfscan/shelfscan-api.toml`
    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("shelfscan").join("shelfscan-api.toml"))
    }

    fn from_toml_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply `SHELFSCAN_*` overrides from the supplied variable lookup
    ///
    /// Unparseable values are logged and skipped rather than failing
    /// startup.
    pub fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(host) = get("SHELFSCAN_HOST") {
            self.host = host;
        }
        if let Some(port) = get("SHELFSCAN_PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!("Ignoring unparseable SHELFSCAN_PORT: {}", port),
            }
        }
        if let Some(path) = get("SHELFSCAN_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = get("SHELFSCAN_VISION_URL") {
            self.vision_base_url = url;
        }
        if let Some(key) = get("SHELFSCAN_VISION_API_KEY") {
            if !key.trim().is_empty() {
                self.vision_api_key = Some(key);
            }
        }
        if let Some(value) = get("SHELFSCAN_MAX_IMAGE_BYTES") {
            match value.parse() {
                Ok(bytes) => self.max_image_bytes = bytes,
                Err(_) => warn!("Ignoring unparseable SHELFSCAN_MAX_IMAGE_BYTES: {}", value),
            }
        }
        if let Some(value) = get("SHELFSCAN_JOB_TTL_SECS") {
            match value.parse() {
                Ok(secs) => self.job_ttl_secs = secs,
                Err(_) => warn!("Ignoring unparseable SHELFSCAN_JOB_TTL_SECS: {}", value),
            }
        }
        if let Some(url) = get("SHELFSCAN_OPEN_LIBRARY_URL") {
            self.open_library_base_url = url;
        }
        if let Some(url) = get("SHELFSCAN_GOOGLE_BOOKS_URL") {
            self.google_books_base_url = url;
        }
    }

    /// Resolved database file path, defaulting under the platform data dir
    pub fn database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => path.clone(),
            None => dirs::data_local_dir()
                .map(|d| d.join("shelfscan"))
                .unwrap_or_else(|| PathBuf::from("./shelfscan_data"))
                .join("shelfscan.db"),
        }
    }
}
