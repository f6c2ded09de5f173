//! Configuration management for the coldvault CLI

use backup_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Result;

/// CLI configuration: store roots plus the engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Root directory of the primary store
    pub primary_root: PathBuf,

    /// Root directory of the offsite store
    pub offsite_root: PathBuf,

    /// Backup engine settings
    pub engine: EngineConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            primary_root: PathBuf::from("/var/lib/coldvault/primary"),
            offsite_root: PathBuf::from("/var/lib/coldvault/offsite"),
            engine: EngineConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load configuration from an explicit path, or from the default
    /// location, falling back to defaults when no file exists.
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::config_path(),
        };

        if let Some(path) = path {
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                let config: Self = toml::from_str(&content)?;
                config.engine.validate()?;
                return Ok(config);
            }
            if explicit.is_some() {
                anyhow::bail!("config file not found: {}", path.display());
            }
        }

        Ok(Self::default())
    }

    /// Default config path.
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("coldvault").join("config.toml"))
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_validates() {
        let config = CliConfig::default();
        assert!(config.engine.validate().is_ok());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = CliConfig::default();
        config.primary_root = PathBuf::from("/tmp/primary");
        config.engine.database = "appdb".to_string();
        config.engine.retention.daily_keep = 14;
        config.save_to(&path).unwrap();

        let loaded = CliConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.primary_root, PathBuf::from("/tmp/primary"));
        assert_eq!(loaded.engine.database, "appdb");
        assert_eq!(loaded.engine.retention.daily_keep, 14);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let result = CliConfig::load(Some("/nonexistent/coldvault.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "primary_root = \"/data/near\"\n").unwrap();

        let loaded = CliConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.primary_root, PathBuf::from("/data/near"));
        assert_eq!(loaded.engine.retention.weekly_keep, 4);
    }

    #[test]
    fn invalid_engine_settings_are_rejected_at_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\ndatabase = \"\"\n").unwrap();

        let result = CliConfig::load(Some(path.to_str().unwrap()));
        assert!(result.is_err());
    }
}
