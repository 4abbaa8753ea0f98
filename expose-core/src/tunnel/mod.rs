//! Cloudflare Tunnel lifecycle for exposed ports

pub mod cloudflared;
pub mod config;
pub mod manager;
pub mod state;

pub use cloudflared::{
    CloudflaredInfo, CloudflaredProvisioner, TunnelProvisioner, parse_credentials_path,
};
pub use config::{RunnerConfig, TunnelNaming, remove_runner_config};
pub use manager::{DeleteOutcome, LifecycleController, StopOutcome};
pub use state::{IdentityHandle, InvalidPort, LocalProtocol, Port, ServiceRecord, ServiceStatus};
