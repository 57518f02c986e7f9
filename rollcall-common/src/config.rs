//! Configuration loading
//!
//! Resolution priority per setting: environment variable → TOML config
//! file → compiled default. The TOML file lives at
//! `~/.config/rollcall/rollcall.toml` unless `ROLLCALL_CONFIG` points
//! elsewhere.

use crate::{Error, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Recognition service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Base URL of the batch face-recognition service
    pub base_url: String,
    /// Optional bearer token (public deployments may omit it)
    pub api_token: Option<String>,
    /// Request timeout in seconds. Batch recognition is slow; this is
    /// minutes, not seconds, by default.
    pub timeout_secs: u64,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Base backoff delay in milliseconds (doubles per attempt)
    pub retry_base_ms: u64,
    /// Maximum images accepted per batch
    pub max_images: usize,
    /// Confidence at or above which a match is flagged verified
    pub verify_threshold: f64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7860".to_string(),
            api_token: None,
            timeout_secs: 180,
            max_retries: 5,
            retry_base_ms: 1000,
            max_images: 6,
            verify_threshold: 0.8,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Listen address for the HTTP server
    pub bind_addr: String,
    /// SQLite database file path
    pub database_path: PathBuf,
    /// Hours after creation at which an Open session is forced Locked
    pub lock_window_hours: i64,
    /// Default class duration when a slot has no explicit end time
    pub slot_minutes: u32,
    /// Minutes east of UTC for all date/weekday computations
    /// (default +05:30). Injected everywhere; never derived from locale.
    pub utc_offset_minutes: i32,
    pub recognition: RecognitionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5810".to_string(),
            database_path: default_database_path(),
            lock_window_hours: 36,
            slot_minutes: 50,
            utc_offset_minutes: 330,
            recognition: RecognitionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration: TOML file (if present) with ENV overrides
    pub fn load() -> Result<Self> {
        let path = config_file_path();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("read {} failed: {}", path.display(), e)))?;
            let config: EngineConfig = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("parse {} failed: {}", path.display(), e)))?;
            info!("Loaded config from {}", path.display());
            config
        } else {
            info!("No config file at {}; using defaults", path.display());
            EngineConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ROLLCALL_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = std::env::var("ROLLCALL_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_RECOGNITION_URL") {
            self.recognition.base_url = v;
        }
        if let Ok(v) = std::env::var("ROLLCALL_RECOGNITION_TOKEN") {
            if !v.trim().is_empty() {
                self.recognition.api_token = Some(v);
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_UTC_OFFSET_MINUTES") {
            match v.parse() {
                Ok(n) => self.utc_offset_minutes = n,
                Err(_) => warn!("Ignoring unparseable ROLLCALL_UTC_OFFSET_MINUTES: {:?}", v),
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.lock_window_hours <= 0 {
            return Err(Error::Config(
                "lock_window_hours must be positive".to_string(),
            ));
        }
        if self.slot_minutes == 0 || self.slot_minutes >= 24 * 60 {
            return Err(Error::Config(
                "slot_minutes must be between 1 and 1439".to_string(),
            ));
        }
        if self.utc_offset_minutes.abs() > 14 * 60 {
            return Err(Error::Config(
                "utc_offset_minutes outside valid UTC offset range".to_string(),
            ));
        }
        if self.recognition.max_images == 0 {
            return Err(Error::Config(
                "recognition.max_images must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Timezone for all date/weekday computations
    pub fn timezone(&self) -> FixedOffset {
        // validate() bounds the offset, so this cannot fail
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("UTC offset"))
    }
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = std::env::var("ROLLCALL_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .map(|d| d.join("rollcall").join("rollcall.toml"))
        .unwrap_or_else(|| PathBuf::from("rollcall.toml"))
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rollcall").join("rollcall.db"))
        .unwrap_or_else(|| PathBuf::from("rollcall.db"))
}

/// Ensure the parent directory of a database path exists
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
