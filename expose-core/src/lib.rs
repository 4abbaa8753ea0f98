//! expose-core - Port tunnel lifecycle management
//!
//! This crate maps local ports to Cloudflare tunnels:
//!
//! - [`store::StatusStore`]: persisted port → [`tunnel::ServiceRecord`] mapping
//! - [`tunnel::TunnelProvisioner`]: tunnel identities and DNS routes
//! - [`supervisor::ProcessSupervisor`]: background tunnel runner processes
//! - [`tunnel::LifecycleController`]: start/stop/restart/delete/list verbs

pub mod command;
pub mod config;
pub mod error;
pub mod services;
pub mod store;
pub mod supervisor;
pub mod tunnel;

pub use config::{CloudflaredConfig, ExposeConfig};
pub use error::{
    ExposeError, ProvisionError, Result, RunnerConfigError, StoreError, SupervisorError,
};
pub use services::ServiceCatalog;
pub use store::{StatusMap, StatusStore, StoreLock};
pub use supervisor::{ProcessSupervisor, RunnerLaunch, SystemSupervisor};
pub use tunnel::{
    CloudflaredProvisioner, DeleteOutcome, IdentityHandle, LifecycleController, LocalProtocol,
    Port, ServiceRecord, ServiceStatus, StopOutcome, TunnelNaming, TunnelProvisioner,
};
