use std::path::{Path, PathBuf};

use tracing::{debug, info};
use trails_common::{Error, Result};

use crate::model::AppConfig;

const CONFIG_FILE_NAMES: &[&str] = &["config.yml", "config.yaml", "config.toml"];

/// Resolves the config directory and loads `AppConfig` from it.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Use `~/.trails` as the config directory.
    pub fn new() -> Self {
        let config_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trails");
        Self { config_dir }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load the first config file found in the config directory, or defaults
    /// when there is none, then apply environment overrides.
    pub fn load(&self) -> Result<AppConfig> {
        let found = CONFIG_FILE_NAMES
            .iter()
            .map(|name| self.config_dir.join(name))
            .find(|path| path.is_file());

        let mut config = match found {
            Some(path) => Self::load_file(&path)?,
            None => {
                debug!(
                    "no config file in {}, using defaults",
                    self.config_dir.display()
                );
                AppConfig::default()
            }
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load an explicitly named config file, then apply environment overrides.
    pub fn load_explicit(path: &Path) -> Result<AppConfig> {
        let mut config = Self::load_file(path)?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a specific YAML or TOML file, chosen by extension.
    pub fn load_file(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match ext {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}")))?,
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("TOML parse error: {e}")))?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension: {other}"
                )));
            }
        };

        info!("config loaded from {}", path.display());
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_env_overrides(
    config: &mut AppConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(dir) = var("TRAILS_DATA_DIR").filter(|v| !v.is_empty()) {
        config.data_dir = Some(PathBuf::from(dir));
    }
    if let Some(host) = var("TRAILS_HOST").filter(|v| !v.is_empty()) {
        config.gateway.host = host;
    }
    if let Some(port) = var("TRAILS_PORT").filter(|v| !v.is_empty()) {
        config.gateway.port = port
            .parse()
            .map_err(|_| Error::Config(format!("TRAILS_PORT is not a port number: {port}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| match key {
            "TRAILS_DATA_DIR" => Some("/srv/trails".into()),
            "TRAILS_PORT" => Some("9100".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/trails")));
        assert_eq!(config.gateway.port, 9100);
        assert_eq!(config.gateway.host, "127.0.0.1");
    }

    #[test]
    fn bad_port_override_is_a_config_error() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, |key| {
            (key == "TRAILS_PORT").then(|| "eighty".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
