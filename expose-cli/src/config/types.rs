use std::path::PathBuf;
use std::time::Duration;

use expose_core::{CloudflaredConfig, ExposeConfig, LocalProtocol};
use serde::Deserialize;

/// One configuration file as written; unset keys stay `None` so layers merge
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawExposeConfig {
    pub domain: Option<String>,
    pub host: Option<String>,
    pub protocol: Option<LocalProtocol>,
    pub store_path: Option<PathBuf>,
    pub cloudflared: RawCloudflaredConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawCloudflaredConfig {
    pub binary: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub command_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub terminate_grace: Option<Duration>,
}

impl RawExposeConfig {
    /// Keys set in `overlay` win over `self`
    pub fn merge(self, overlay: RawExposeConfig) -> RawExposeConfig {
        RawExposeConfig {
            domain: overlay.domain.or(self.domain),
            host: overlay.host.or(self.host),
            protocol: overlay.protocol.or(self.protocol),
            store_path: overlay.store_path.or(self.store_path),
            cloudflared: RawCloudflaredConfig {
                binary: overlay.cloudflared.binary.or(self.cloudflared.binary),
                config_dir: overlay.cloudflared.config_dir.or(self.cloudflared.config_dir),
                command_timeout: overlay
                    .cloudflared
                    .command_timeout
                    .or(self.cloudflared.command_timeout),
                terminate_grace: overlay
                    .cloudflared
                    .terminate_grace
                    .or(self.cloudflared.terminate_grace),
            },
        }
    }

    /// Fill unset keys with defaults
    pub fn finalize(self) -> ExposeConfig {
        let defaults = ExposeConfig::default();
        let cloudflared = CloudflaredConfig::default();
        ExposeConfig {
            domain: self.domain.unwrap_or(defaults.domain),
            host: self.host,
            protocol: self.protocol.unwrap_or(defaults.protocol),
            store_path: self.store_path,
            cloudflared: CloudflaredConfig {
                binary: self.cloudflared.binary.unwrap_or(cloudflared.binary),
                config_dir: self.cloudflared.config_dir,
                command_timeout: self
                    .cloudflared
                    .command_timeout
                    .unwrap_or(cloudflared.command_timeout),
                terminate_grace: self
                    .cloudflared
                    .terminate_grace
                    .unwrap_or(cloudflared.terminate_grace),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let raw: RawExposeConfig = toml::from_str(
            r#"
protocol = "https"

[cloudflared]
terminate_grace = "10s"
"#,
        )
        .unwrap();
        assert_eq!(raw.protocol, Some(LocalProtocol::Https));
        assert_eq!(raw.domain, None);
        assert_eq!(
            raw.cloudflared.terminate_grace,
            Some(Duration::from_secs(10))
        );
        assert_eq!(raw.cloudflared.command_timeout, None);
    }

    #[test]
    fn overlay_overrides_only_what_it_sets() {
        let base = RawExposeConfig {
            domain: Some("base.dev".to_string()),
            host: Some("devbox".to_string()),
            cloudflared: RawCloudflaredConfig {
                command_timeout: Some(Duration::from_secs(30)),
                ..Default::default()
            },
            ..Default::default()
        };
        let overlay = RawExposeConfig {
            domain: Some("project.dev".to_string()),
            cloudflared: RawCloudflaredConfig {
                binary: Some(PathBuf::from("/opt/cloudflared")),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(overlay);
        assert_eq!(merged.domain.as_deref(), Some("project.dev"));
        assert_eq!(merged.host.as_deref(), Some("devbox"));
        assert_eq!(
            merged.cloudflared.command_timeout,
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            merged.cloudflared.binary,
            Some(PathBuf::from("/opt/cloudflared"))
        );
    }

    #[test]
    fn finalize_applies_defaults() {
        let config = RawExposeConfig::default().finalize();
        assert_eq!(config, ExposeConfig::default());
    }
}
