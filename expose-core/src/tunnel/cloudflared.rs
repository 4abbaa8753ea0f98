//! Cloudflared CLI wrapper and output parsing

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use super::state::IdentityHandle;
use crate::command::CommandRunner;
use crate::config::CloudflaredConfig;
use crate::error::ProvisionError;

/// Result of checking cloudflared installation
#[derive(Debug, Clone)]
pub struct CloudflaredInfo {
    pub version: String,
    pub path: String,
}

/// Control-plane operations of the tunnel vendor.
///
/// Every call runs one external command to completion. None of them is
/// retried: creating an identity twice is not assumed to be safe.
#[async_trait]
pub trait TunnelProvisioner: Send + Sync {
    /// Fails when the vendor tooling is unusable
    async fn ensure_available(&self) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn create_identity(&self, name: &str) -> Result<IdentityHandle, ProvisionError>;

    async fn register_route(&self, identity: &str, hostname: &str) -> Result<(), ProvisionError>;

    async fn delete_route(&self, hostname: &str) -> Result<(), ProvisionError>;

    async fn cleanup_identity(&self, name: &str) -> Result<(), ProvisionError>;

    async fn delete_identity(&self, name: &str) -> Result<(), ProvisionError>;
}

/// [`TunnelProvisioner`] backed by the `cloudflared tunnel` subcommands
#[derive(Debug, Clone)]
pub struct CloudflaredProvisioner {
    runner: CommandRunner,
    credentials_dir: PathBuf,
}

impl CloudflaredProvisioner {
    pub fn new(config: &CloudflaredConfig) -> Self {
        Self {
            runner: CommandRunner::new(config.binary.clone(), config.command_timeout),
            credentials_dir: config.resolved_config_dir(),
        }
    }

    pub fn with_runner(runner: CommandRunner, credentials_dir: PathBuf) -> Self {
        Self {
            runner,
            credentials_dir,
        }
    }

    /// Check if cloudflared is installed and get version
    pub async fn check_installation(&self) -> Option<CloudflaredInfo> {
        let path = which::which(self.runner.program()).ok()?;
        let output = self.runner.run(["--version"]).await.ok()?;
        let version = parse_version(&output.stdout).unwrap_or_else(|| "unknown".to_string());
        Some(CloudflaredInfo {
            version,
            path: path.to_string_lossy().to_string(),
        })
    }
}

#[async_trait]
impl TunnelProvisioner for CloudflaredProvisioner {
    async fn ensure_available(&self) -> Result<(), ProvisionError> {
        let info = self
            .check_installation()
            .await
            .ok_or(ProvisionError::CloudflaredNotInstalled)?;
        debug!(version = %info.version, path = %info.path, "Using cloudflared");
        Ok(())
    }

    async fn create_identity(&self, name: &str) -> Result<IdentityHandle, ProvisionError> {
        info!(tunnel = name, "Creating tunnel");
        let output = self.runner.run(["tunnel", "create", name]).await?;
        parse_credentials_path(name, &output.stdout, &self.credentials_dir)
    }

    async fn register_route(&self, identity: &str, hostname: &str) -> Result<(), ProvisionError> {
        info!(tunnel = identity, hostname, "Routing DNS");
        self.runner
            .run(["tunnel", "route", "dns", identity, hostname])
            .await?;
        Ok(())
    }

    async fn delete_route(&self, hostname: &str) -> Result<(), ProvisionError> {
        info!(hostname, "Deleting DNS route");
        self.runner
            .run(["tunnel", "route", "delete", hostname])
            .await?;
        Ok(())
    }

    async fn cleanup_identity(&self, name: &str) -> Result<(), ProvisionError> {
        info!(tunnel = name, "Cleaning up tunnel connections");
        self.runner.run(["tunnel", "cleanup", name]).await?;
        Ok(())
    }

    async fn delete_identity(&self, name: &str) -> Result<(), ProvisionError> {
        info!(tunnel = name, "Deleting tunnel");
        self.runner.run(["tunnel", "delete", name]).await?;
        Ok(())
    }
}

static CREDENTIALS_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<path>(?:\S*[/\\])?(?P<id>[0-9a-fA-F][0-9a-fA-F-]*)\.json)")
        .expect("credentials file pattern is valid")
});

/// Recover the credentials file written by `tunnel create`.
///
/// cloudflared prints something like:
/// "Tunnel credentials written to /home/user/.cloudflared/<uuid>.json. ..."
/// This is the only place that depends on that wording. A bare file name is
/// resolved against `credentials_dir`.
pub fn parse_credentials_path(
    name: &str,
    output: &str,
    credentials_dir: &Path,
) -> Result<IdentityHandle, ProvisionError> {
    let captures = CREDENTIALS_FILE
        .captures(output)
        .ok_or_else(|| ProvisionError::ConfigParseFailed {
            name: name.to_string(),
            output: output.trim().to_string(),
        })?;

    let raw = PathBuf::from(&captures["path"]);
    let credentials_path = if raw.is_absolute() {
        raw
    } else {
        credentials_dir.join(raw)
    };

    Ok(IdentityHandle {
        name: name.to_string(),
        id: captures["id"].to_string(),
        credentials_path,
    })
}

/// Parse version from cloudflared --version output.
/// Example: "cloudflared version 2024.1.0 (built 2024-01-15-1234)"
fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .nth(2)
        .map(String::from)
}
