//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\quaver\config.toml
//! - macOS: ~/Library/Application Support/quaver/config.toml
//! - Linux: ~/.config/quaver/config.toml
//!
//! The config file is human-readable and editable. Settings are loaded at
//! startup; credentials never have baked-in defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::paths::{DEFAULT_FILE_TEMPLATE, DEFAULT_FOLDER_TEMPLATE};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API credentials (keep separate for potential future encryption)
    pub credentials: Credentials,

    /// Download behavior
    pub download: DownloadConfig,

    /// Network deadlines and endpoints
    pub network: NetworkConfig,
}

/// Catalog API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Registered application id
    pub app_id: String,

    /// Shared secret used to sign stream-url requests
    pub app_secret: String,

    /// Authenticated user token
    pub user_auth_token: String,
}

/// Download behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root directory downloads land under
    pub directory: PathBuf,

    /// Folder layout template under the root
    pub folder_template: String,

    /// File name template (extension appended automatically)
    pub file_template: String,

    /// How many jobs may run concurrently
    pub concurrency: usize,

    /// Embed cover art into the container
    pub embed_covers: bool,

    /// Also write the cover as cover.jpg in the album folder
    pub save_cover_file: bool,

    /// Look up lyrics and write .lrc sidecars for synced results
    pub save_lyrics: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: dirs::audio_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("quaver"),
            folder_template: DEFAULT_FOLDER_TEMPLATE.to_string(),
            file_template: DEFAULT_FILE_TEMPLATE.to_string(),
            concurrency: 3,
            embed_covers: true,
            save_cover_file: false,
            save_lyrics: true,
        }
    }
}

/// Network endpoints and deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Catalog API base URL
    pub api_base_url: String,

    /// Deadline for record lookups and stream-url requests, in seconds
    pub metadata_timeout_secs: u64,

    /// Deadline for a full media transfer, in seconds
    pub transfer_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.qobuz.com/api.json/0.2".to_string(),
            metadata_timeout_secs: 15,
            transfer_timeout_secs: 900,
        }
    }
}

impl NetworkConfig {
    pub fn metadata_deadline(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn transfer_deadline(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("quaver"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    // Ensure directory exists
    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
