use super::types::RawExposeConfig;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use expose_core::ExposeConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (defaults, then user, then project)
    pub fn load() -> Result<ExposeConfig> {
        let mut raw = RawExposeConfig::default();

        if let Some(user_path) = Self::user_config_path() {
            raw = raw.merge(Self::read_layer(&user_path)?);
        }
        raw = raw.merge(Self::read_layer(&Self::project_config_path())?);

        Ok(raw.finalize())
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "expose").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with EXPOSE_PROJECT_CONFIG_DIR env var (useful for isolated e2e tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("EXPOSE_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".expose/config.toml")
        }
    }

    /// A missing file is an empty layer
    fn read_layer(path: &Path) -> Result<RawExposeConfig> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file");
            return Ok(RawExposeConfig::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let layer = toml::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        debug!(path = %path.display(), "Loaded configuration layer");
        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expose_core::LocalProtocol;
    use serial_test::serial;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn missing_layer_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let raw = ConfigLoader::read_layer(&temp_dir.path().join("nope.toml")).unwrap();
        assert_eq!(raw, RawExposeConfig::default());
    }

    #[test]
    fn invalid_layer_names_the_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = ConfigLoader::read_layer(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    #[serial]
    fn project_layer_is_applied_on_top() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("config.toml"),
            "domain = \"skead.fr\"\nprotocol = \"tcp\"\n\n[cloudflared]\ncommand_timeout = \"90s\"\n",
        )
        .unwrap();

        // SAFETY: serialized with the other tests touching this variable
        unsafe { std::env::set_var("EXPOSE_PROJECT_CONFIG_DIR", temp_dir.path()) };
        let config = ConfigLoader::load();
        unsafe { std::env::remove_var("EXPOSE_PROJECT_CONFIG_DIR") };

        let config = config.unwrap();
        assert_eq!(config.domain, "skead.fr");
        assert_eq!(config.protocol, LocalProtocol::Tcp);
        assert_eq!(config.cloudflared.command_timeout, Duration::from_secs(90));
    }

    #[test]
    #[serial]
    fn project_config_path_defaults_to_dot_expose() {
        let path = ConfigLoader::project_config_path();
        assert_eq!(path, PathBuf::from(".expose/config.toml"));
    }

    #[test]
    fn user_config_path_names_expose() {
        let path = ConfigLoader::user_config_path().unwrap();
        assert!(path.to_string_lossy().contains("expose"));
        assert!(path.ends_with("config.toml"));
    }
}
