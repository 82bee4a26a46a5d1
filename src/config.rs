//! Configuration management for Aegis.
//!
//! Provides persistent settings with schema versioning and migrations.
//! Configuration lives in `~/.aegis/config.json`. Unlike a process-wide
//! cached singleton, `Config` is a plain value loaded once and handed to the
//! per-user session context; the path is injectable so tests can use a
//! temporary directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current config schema version.
const CURRENT_VERSION: u32 = 1;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations.
    pub version: u32,
    /// Location tracking settings.
    pub location: LocationConfig,
    /// Audio capture settings.
    pub audio: AudioConfig,
    /// Voice trigger settings.
    pub voice: VoiceConfig,
    /// Notification dispatch settings.
    pub dispatch: DispatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            location: LocationConfig::default(),
            audio: AudioConfig::default(),
            voice: VoiceConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

/// Location tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Request high-accuracy positioning from the source.
    pub high_accuracy: bool,
    /// Cached observations younger than this are returned without a fetch.
    pub freshness_ms: u64,
    /// Upper bound for a single-shot position fetch.
    pub fetch_timeout_ms: u64,
    /// The continuous subscription accepts observations up to this age;
    /// freshness is traded for reliability.
    pub watch_max_age_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            freshness_ms: 15_000,
            fetch_timeout_ms: 10_000,
            watch_max_age_ms: 30_000,
        }
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// File-name prefix for uploaded recording artifacts.
    pub artifact_prefix: String,
    /// Container extension for recording artifacts.
    pub artifact_extension: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            artifact_prefix: "sos-recording".to_string(),
            artifact_extension: "webm".to_string(),
        }
    }
}

/// Voice trigger engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Whether continuous listening starts with the session context.
    pub enabled: bool,
    /// Pause after a trigger before listening resumes, to avoid
    /// re-triggering on residual audio.
    pub cooldown_ms: u64,
    /// Delay before restarting a recognition session that ended or failed.
    pub restart_backoff_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cooldown_ms: 5_000,
            restart_backoff_ms: 1_500,
        }
    }
}

/// Notification dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Base URL for per-session live-audio stream links.
    pub stream_base_url: String,
    /// Base URL for location map links; `lat,lng` is appended.
    pub map_link_base: String,
    /// Message used when an activation carries none.
    pub default_message: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            stream_base_url: "https://live.aegis.app/stream".to_string(),
            map_link_base: "https://maps.google.com/?q=".to_string(),
            default_message: "Emergency! I need help.".to_string(),
        }
    }
}

/// Get the path to the config file (~/.aegis/config.json).
pub fn default_config_path() -> PathBuf {
    aegis_dir().join("config.json")
}

/// Get the Aegis data directory (~/.aegis).
pub fn aegis_dir() -> PathBuf {
    home_dir_or_fallback().join(".aegis")
}

/// Get the home directory, falling back to /tmp if unavailable.
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, String> {
        Self::load_from(&default_config_path())
    }

    /// Load configuration from a specific path, applying migrations.
    ///
    /// A missing file yields the defaults; a corrupt file is an error so the
    /// caller can decide whether to fall back.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        let contents =
            fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse config: {}", e))?;

        let migrated = migrate_config(config, path)?;
        Ok(migrated)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&default_config_path())
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create config directory: {}", e))?;
            }
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialise config: {}", e))?;

        fs::write(path, contents).map_err(|e| format!("Failed to write config file: {}", e))?;

        tracing::info!("Config saved to {}", path.display());
        Ok(())
    }
}

/// Migrate configuration from older schema versions.
fn migrate_config(mut config: Config, path: &Path) -> Result<Config, String> {
    let original_version = config.version;

    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
        config.save_to(path)?;
    }

    Ok(config)
}

/// Apply a single migration step.
fn apply_migration(config: Config) -> Result<Config, String> {
    match config.version {
        // Version 0 -> 1: initial migration
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        v => Err(format!("Unknown config version: {}", v)),
    }
}
