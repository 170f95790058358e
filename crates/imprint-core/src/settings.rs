//! Persistent user settings for Imprint
//!
//! Settings are stored in a TOML configuration file at:
//! - Linux: `~/.config/imprint/imprint_config.toml`
//! - macOS: `~/Library/Application Support/imprint/imprint_config.toml`
//! - Windows: `%APPDATA%\imprint\imprint_config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! [write]
//! chunk_size = "1M"
//! sync_on_complete = true
//! sync_writes = true
//!
//! [verify]
//! algorithm = "sha256"
//! block_size = "1M"
//! ```

use crate::checker::VerifyConfig;
use crate::checksum::{ChecksumAlgorithm, MAX_VERIFY_BLOCK_SIZE, MIN_VERIFY_BLOCK_SIZE};
use crate::device::RawDeviceAccess;
use crate::error::{Error, Result};
use crate::writer::{WriteConfig, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration file name
const CONFIG_FILE_NAME: &str = "imprint_config.toml";

/// Application name for config directory
const APP_NAME: &str = "imprint";

/// Default chunk and block size string
const DEFAULT_SIZE_STR: &str = "1M";

/// User settings loaded from configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Write pipeline settings
    pub write: WriteSettings,

    /// Verify pipeline settings
    pub verify: VerifySettings,
}

/// Settings for write operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WriteSettings {
    /// Chunk size (e.g., "1M", "4M", "512K")
    pub chunk_size: String,

    /// Whether to sync the device after the last chunk
    pub sync_on_complete: bool,

    /// Whether to open devices for synchronous writes
    pub sync_writes: bool,
}

/// Settings for verify operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerifySettings {
    /// Checksum algorithm
    pub algorithm: String,

    /// Read block size (e.g., "1M")
    pub block_size: String,
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_SIZE_STR.to_string(),
            sync_on_complete: true,
            sync_writes: true,
        }
    }
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            algorithm: "sha256".to_string(),
            block_size: DEFAULT_SIZE_STR.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the configuration file
    ///
    /// Returns default settings if the file doesn't exist or can't be parsed
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => {
                    tracing::debug!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save settings to the configuration file
    pub fn save(&self) -> std::result::Result<PathBuf, SettingsError> {
        self.save_to_path(Self::config_path())
    }

    /// Save settings to a specific path
    pub fn save_to_path(&self, path: Option<PathBuf>) -> std::result::Result<PathBuf, SettingsError> {
        let path = path.ok_or(SettingsError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(SettingsError::Serialize)?;

        std::fs::write(&path, contents).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE_NAME))
    }

    /// Get the path to the configuration directory
    pub fn config_dir() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_NAME))
    }

    /// Check if a configuration file exists
    pub fn config_exists() -> bool {
        Self::config_path().is_some_and(|p| p.exists())
    }

    /// Generate a default configuration file content as a string
    pub fn default_config_string() -> String {
        let default = Self::default();
        toml::to_string_pretty(&default)
            .unwrap_or_else(|_| String::from("# Failed to generate default config"))
    }

    /// Runtime configuration for the write pipeline
    pub fn write_config(&self) -> Result<WriteConfig> {
        let chunk_size = parse_size_in_range(
            "chunk_size",
            &self.write.chunk_size,
            MIN_CHUNK_SIZE,
            MAX_CHUNK_SIZE,
        )?;

        Ok(WriteConfig::new()
            .chunk_size(chunk_size)
            .sync_on_complete(self.write.sync_on_complete))
    }

    /// Runtime configuration for the verify pipeline
    pub fn verify_config(&self) -> Result<VerifyConfig> {
        let algorithm: ChecksumAlgorithm = self.verify.algorithm.parse()?;
        let block_size = parse_size_in_range(
            "block_size",
            &self.verify.block_size,
            MIN_VERIFY_BLOCK_SIZE,
            MAX_VERIFY_BLOCK_SIZE,
        )?;

        Ok(VerifyConfig::new()
            .algorithm(algorithm)
            .block_size(block_size))
    }

    /// Device access layer configured from these settings
    pub fn device_access(&self) -> RawDeviceAccess {
        RawDeviceAccess::new().sync_writes(self.write.sync_writes)
    }
}

/// Parse a size string like "512", "64K", "1M", "1G" into bytes
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidConfig("empty size".to_string()));
    }

    let split_pos = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map_or(s.len(), |(i, _)| i);
    let (num_str, suffix) = s.split_at(split_pos);

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("invalid size: {}", s)))?;

    let multiplier: u64 = match suffix.to_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        _ => return Err(Error::InvalidConfig(format!("invalid size suffix: {}", s))),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| Error::InvalidConfig(format!("{} is too large", s)))
}

fn parse_size_in_range(name: &str, s: &str, min: usize, max: usize) -> Result<usize> {
    let size = parse_size(s)?;
    if size < min as u64 || size > max as u64 {
        return Err(Error::InvalidConfig(format!(
            "{} must be between {} and {} bytes, got {}",
            name, min, max, s
        )));
    }
    Ok(size as usize)
}

/// Errors that can occur when working with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No configuration directory available
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Failed to read or write config file
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path that caused the error
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Failed to serialize settings
    #[error("Failed to serialize settings: {0}")]
    Serialize(toml::ser::Error),
}
