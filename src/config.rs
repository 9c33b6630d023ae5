//! Application config file
//!
//! JSON file under the user config directory. Every field has a serde default
//! so older or hand-edited files keep loading; a default file is written on
//! first run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::constants::{config, timing};
use crate::settings::JsonFileSettingStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Used when LOG_LEVEL is not set
    pub log_level: String,

    /// Bus socket; the runtime dir default applies when unset
    pub socket_path: Option<PathBuf>,

    /// Setting store directory; `<config_dir>/screen-sync/settings` when unset
    pub settings_dir: Option<PathBuf>,

    /// How long an inbound scroll suppresses local scroll echo
    pub scroll_mute_ms: u64,

    /// Screens created on a fresh install with nothing persisted or showing
    pub initial_screens: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            socket_path: None,
            settings_dir: None,
            scroll_mute_ms: timing::SCROLL_MUTE_MS,
            initial_screens: 1,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(config::APP_DIR);
        path.push(config::FILENAME);
        path
    }

    /// Load from the default location, writing a default file when missing
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`; an unreadable or invalid file falls back to defaults
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(mut config) => {
                    config.validate_and_clamp();
                    config
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "No config file found, generating default");
                let config = Self::default();
                if let Err(e) = config.save_to(path) {
                    warn!(error = %e, "Failed to write default config");
                }
                config
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        fs::write(path, contents)
            .context(format!("Failed to write config file to {}", path.display()))?;
        Ok(())
    }

    fn validate_and_clamp(&mut self) {
        const MAX_SCROLL_MUTE_MS: u64 = 60_000;
        const MAX_INITIAL_SCREENS: u32 = 16;

        if self.scroll_mute_ms > MAX_SCROLL_MUTE_MS {
            warn!(scroll_mute_ms = self.scroll_mute_ms, max = MAX_SCROLL_MUTE_MS, "scroll_mute_ms exceeds maximum, clamping");
            self.scroll_mute_ms = MAX_SCROLL_MUTE_MS;
        }
        if self.initial_screens > MAX_INITIAL_SCREENS {
            warn!(initial_screens = self.initial_screens, max = MAX_INITIAL_SCREENS, "initial_screens exceeds maximum, clamping");
            self.initial_screens = MAX_INITIAL_SCREENS;
        }
    }

    pub fn scroll_mute(&self) -> Duration {
        Duration::from_millis(self.scroll_mute_ms)
    }

    /// Command line override, then config file, then the runtime dir default
    pub fn resolve_socket_path(&self, cli: Option<&Path>) -> Result<PathBuf> {
        match cli.map(Path::to_path_buf).or_else(|| self.socket_path.clone()) {
            Some(path) => Ok(path),
            None => crate::ipc::default_socket_path(),
        }
    }

    pub fn resolve_settings_dir(&self, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| self.settings_dir.clone())
            .unwrap_or_else(JsonFileSettingStore::default_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen-sync/config.json");

        let config = AppConfig::load_from(&path);
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
        assert_eq!(AppConfig::load_from(&path), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"log_level": "debug", "initial_screens": 2}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.initial_screens, 2);
        assert_eq!(config.scroll_mute_ms, timing::SCROLL_MUTE_MS);
        assert_eq!(config.socket_path, None);
    }

    #[test]
    fn test_invalid_file_falls_back_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"scroll_mute_ms": 999999, "initial_screens": 500}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.scroll_mute_ms, 60_000);
        assert_eq!(config.initial_screens, 16);
    }

    #[test]
    fn test_cli_overrides_config_paths() {
        let config = AppConfig {
            socket_path: Some(PathBuf::from("/tmp/from-config.sock")),
            settings_dir: Some(PathBuf::from("/tmp/from-config")),
            ..AppConfig::default()
        };

        assert_eq!(
            config.resolve_socket_path(Some(Path::new("/tmp/cli.sock"))).unwrap(),
            PathBuf::from("/tmp/cli.sock")
        );
        assert_eq!(
            config.resolve_socket_path(None).unwrap(),
            PathBuf::from("/tmp/from-config.sock")
        );
        assert_eq!(config.resolve_settings_dir(None), PathBuf::from("/tmp/from-config"));
        assert_eq!(
            config.resolve_settings_dir(Some(Path::new("/tmp/cli"))),
            PathBuf::from("/tmp/cli")
        );
    }
}
