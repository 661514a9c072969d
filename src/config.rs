//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\bpm-sorter\config.toml
//! - macOS: ~/Library/Application Support/bpm-sorter/config.toml
//! - Linux: ~/.config/bpm-sorter/config.toml
//!
//! The Spotify app credentials may also come from the `CLIENT_ID` and
//! `CLIENT_SECRET` environment variables, which take precedence over the file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::DEFAULT_CACHE_FILE;
use crate::spotify::auth::DEFAULT_REDIRECT_URI;
use crate::tempo::DEFAULT_TAP_COUNT;

/// Environment variable holding the Spotify client ID
pub const CLIENT_ID_ENV: &str = "CLIENT_ID";
/// Environment variable holding the Spotify client secret
pub const CLIENT_SECRET_ENV: &str = "CLIENT_SECRET";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Spotify app credentials
    pub credentials: Credentials,

    /// Defaults offered by the session prompts
    pub session: SessionConfig,
}

/// Spotify app credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Must match a redirect URI registered for the Spotify app
    pub redirect_uri: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }
}

/// Session defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Taps collected per track
    pub tap_count: u32,

    /// Playback starts this many seconds into the track
    pub head_start_secs: u32,

    /// Pause between tracks, in milliseconds
    pub rest_ms: u64,

    /// Tempo cache location
    pub cache_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tap_count: DEFAULT_TAP_COUNT,
            head_start_secs: 30,
            rest_ms: 500,
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
        }
    }
}

impl Config {
    /// Let environment credentials override the file.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(id) = lookup(CLIENT_ID_ENV).filter(|v| !v.is_empty()) {
            self.credentials.client_id = Some(id);
        }
        if let Some(secret) = lookup(CLIENT_SECRET_ENV).filter(|v| !v.is_empty()) {
            self.credentials.client_secret = Some(secret);
        }
        self
    }

    /// Basic sanity checks on loaded settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.session.tap_count < 2 {
            return Err("session.tap_count must be >= 2".to_string());
        }
        if self.credentials.redirect_uri.is_empty() {
            return Err("credentials.redirect_uri must not be empty".to_string());
        }
        Ok(())
    }

    /// Client ID and secret, if both are configured.
    pub fn client_credentials(&self) -> Option<(&str, &str)> {
        match (&self.credentials.client_id, &self.credentials.client_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bpm-sorter"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk, then apply environment overrides.
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    load_file().with_env_overrides(|key| std::env::var(key).ok())
}

fn load_file() -> Config {
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
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(path)
}

/// Write a default config file on first run so the settings are discoverable.
///
/// Credentials from the environment are deliberately left out of the file.
pub fn ensure_exists() -> Result<Option<PathBuf>, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    if path.exists() {
        return Ok(None);
    }
    save(&Config::default()).map(Some)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[credentials]"));
        assert!(toml.contains("[session]"));
        assert!(toml.contains("tap_count = 8"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.credentials.client_id = Some("id-123".to_string());
        config.session.head_start_secs = 45;
        config.session.cache_path = PathBuf::from("/tmp/tempos.json");

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.credentials.client_id, Some("id-123".to_string()));
        assert_eq!(parsed.session.head_start_secs, 45);
        assert_eq!(parsed.session.cache_path, PathBuf::from("/tmp/tempos.json"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[session]
tap_count = 12
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.session.tap_count, 12);
        assert_eq!(config.session.head_start_secs, 30);
        assert_eq!(config.session.rest_ms, 500);
        assert_eq!(config.session.cache_path, PathBuf::from(DEFAULT_CACHE_FILE));
        assert_eq!(config.credentials.redirect_uri, DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn test_env_overrides_file_credentials() {
        let mut config = Config::default();
        config.credentials.client_id = Some("from-file".to_string());

        let config = config.with_env_overrides(|key| match key {
            CLIENT_ID_ENV => Some("from-env".to_string()),
            CLIENT_SECRET_ENV => Some("secret".to_string()),
            _ => None,
        });

        assert_eq!(config.client_credentials(), Some(("from-env", "secret")));
    }

    #[test]
    fn test_empty_env_does_not_override() {
        let mut config = Config::default();
        config.credentials.client_id = Some("from-file".to_string());
        let config = config.with_env_overrides(|_| Some(String::new()));
        assert_eq!(config.credentials.client_id.as_deref(), Some("from-file"));
        assert_eq!(config.client_credentials(), None);
    }

    #[test]
    fn test_validate_rejects_single_tap() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        config.session.tap_count = 1;
        assert!(config.validate().is_err());
    }
}
