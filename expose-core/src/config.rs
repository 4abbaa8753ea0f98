//! Configuration for tunnel naming, the status store and the vendor CLI.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tunnel::LocalProtocol;

/// Top-level expose configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExposeConfig {
    /// DNS zone public hostnames are created under
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Overrides the machine hostname used in tunnel names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Origin scheme used when `start` is not given one
    #[serde(default)]
    pub protocol: LocalProtocol,

    /// Overrides the status store location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    #[serde(default)]
    pub cloudflared: CloudflaredConfig,
}

/// Settings for invoking cloudflared
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudflaredConfig {
    /// Path or name of the cloudflared binary.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Directory holding credentials and runner configurations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,

    /// Upper bound for every control-plane command.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    /// How long a terminated runner gets to exit.
    #[serde(default = "default_terminate_grace", with = "humantime_serde")]
    pub terminate_grace: Duration,
}

fn default_domain() -> String {
    "example.com".to_string()
}

fn default_binary() -> PathBuf {
    PathBuf::from("cloudflared")
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_terminate_grace() -> Duration {
    Duration::from_secs(5)
}

impl Default for ExposeConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            host: None,
            protocol: LocalProtocol::default(),
            store_path: None,
            cloudflared: CloudflaredConfig::default(),
        }
    }
}

impl Default for CloudflaredConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            config_dir: None,
            command_timeout: default_command_timeout(),
            terminate_grace: default_terminate_grace(),
        }
    }
}

impl ExposeConfig {
    /// Status store path, falling back to the XDG data directory
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(expose_paths::status_store_path)
    }
}

impl CloudflaredConfig {
    /// Credentials directory, falling back to `~/.cloudflared`
    pub fn resolved_config_dir(&self) -> PathBuf {
        self.config_dir
            .clone()
            .unwrap_or_else(expose_paths::cloudflared_dir)
    }

    /// Executable name used when matching runner processes
    pub fn binary_name(&self) -> String {
        self.binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cloudflared".to_string())
    }
}
