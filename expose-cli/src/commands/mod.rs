pub mod config;
pub mod lifecycle;
pub mod list;

use anyhow::Result;
use expose_core::{CloudflaredProvisioner, LifecycleController, SystemSupervisor};

use crate::config::ConfigLoader;

pub type Controller = LifecycleController<CloudflaredProvisioner, SystemSupervisor>;

/// Controller built from the merged configuration
pub fn controller() -> Result<Controller> {
    let config = ConfigLoader::load()?;
    Ok(LifecycleController::from_config(&config))
}
