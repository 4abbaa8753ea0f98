//! Error types for expose-core

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for expose-core
#[derive(Error, Debug)]
pub enum ExposeError {
    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Process error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Status store error: {0}")]
    Store(#[from] StoreError),

    #[error("Runner configuration error: {0}")]
    RunnerConfig(#[from] RunnerConfigError),
}

/// Errors from the tunnel vendor control plane
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("`{command}` exited with {code}: {stderr}")]
    Failed {
        command: String,
        code: String,
        stderr: String,
    },

    #[error("`{command}` did not finish within {timeout:?}")]
    NotResponding { command: String, timeout: Duration },

    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `tunnel create` succeeded, so the tunnel `name` exists
    #[error("Could not find credentials file in `tunnel create {name}` output")]
    ConfigParseFailed { name: String, output: String },

    #[error("cloudflared is not installed")]
    CloudflaredNotInstalled,
}

/// Errors from launching or terminating tunnel runner processes
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn tunnel runner: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Tunnel runner {pid} for '{tunnel_name}' still alive after {grace:?}")]
    NotResponding {
        pid: u32,
        tunnel_name: String,
        grace: Duration,
    },
}

/// Errors from the port status store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize status store: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from writing or removing runner configuration files
#[derive(Error, Debug)]
pub enum RunnerConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize runner configuration: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Result type alias for expose-core operations
pub type Result<T> = std::result::Result<T, ExposeError>;
