//! Lifecycle controller for exposed ports
//!
//! Every verb takes the store lock, loads the mapping, talks to the
//! provisioner and supervisor, and saves the mapping back if it changed.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::cloudflared::{CloudflaredProvisioner, TunnelProvisioner};
use super::config::{RunnerConfig, TunnelNaming, remove_runner_config};
use super::state::{IdentityHandle, LocalProtocol, Port, ServiceRecord, ServiceStatus};
use crate::config::ExposeConfig;
use crate::error::{ProvisionError, Result};
use crate::services::ServiceCatalog;
use crate::store::{StatusMap, StatusStore};
use crate::supervisor::{ProcessSupervisor, RunnerLaunch, SystemSupervisor};

/// Result of `stop`
#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    pub port: Port,
    /// A runner process was found and terminated
    pub terminated: bool,
    /// The record after stopping; `None` for a port that was never started
    pub record: Option<ServiceRecord>,
}

/// Result of `delete`
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub port: Port,
    /// A record existed and was removed
    pub removed: bool,
}

impl DeleteOutcome {
    /// Always [`ServiceStatus::Deleted`]; the status is never stored
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus::Deleted
    }
}

/// Side effects of an unfinished `start`, undone if it fails
#[derive(Debug, Default)]
struct Rollback {
    route: Option<String>,
    runner_config: Option<PathBuf>,
    identity: Option<String>,
}

/// A generation that was launched successfully
struct Generation {
    hostname: String,
    runner_config: PathBuf,
}

/// Drives start/stop/restart/delete/list for ports
pub struct LifecycleController<P, S> {
    store: StatusStore,
    provisioner: P,
    supervisor: S,
    naming: TunnelNaming,
    runner_dir: PathBuf,
    services: ServiceCatalog,
    default_protocol: LocalProtocol,
}

impl LifecycleController<CloudflaredProvisioner, SystemSupervisor> {
    /// Controller talking to the real cloudflared binary and process table
    pub fn from_config(config: &ExposeConfig) -> Self {
        Self::new(
            StatusStore::new(config.resolved_store_path()),
            CloudflaredProvisioner::new(&config.cloudflared),
            SystemSupervisor::new(&config.cloudflared),
            TunnelNaming::detect(config.host.as_deref(), &config.domain),
            config.cloudflared.resolved_config_dir(),
        )
        .with_services(ServiceCatalog::load())
        .with_default_protocol(config.protocol)
    }
}

impl<P: TunnelProvisioner, S: ProcessSupervisor> LifecycleController<P, S> {
    pub fn new(
        store: StatusStore,
        provisioner: P,
        supervisor: S,
        naming: TunnelNaming,
        runner_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            provisioner,
            supervisor,
            naming,
            runner_dir,
            services: ServiceCatalog::builtin(),
            default_protocol: LocalProtocol::default(),
        }
    }

    pub fn with_services(mut self, services: ServiceCatalog) -> Self {
        self.services = services;
        self
    }

    pub fn with_default_protocol(mut self, protocol: LocalProtocol) -> Self {
        self.default_protocol = protocol;
        self
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn naming(&self) -> &TunnelNaming {
        &self.naming
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    /// Start (or re-start) exposing `port` under a fresh public hostname.
    ///
    /// `protocol` defaults to the one stored for the port, then to the
    /// configured default.
    pub async fn start(&self, port: Port, protocol: Option<LocalProtocol>) -> Result<ServiceRecord> {
        let _lock = self.store.lock()?;
        let mut map = self.store.load();
        let before = map.clone();
        let result = self.start_locked(&mut map, port, protocol).await;
        self.persist(&before, &map)?;
        result
    }

    /// Terminate the runner of `port`. Succeeds when nothing is running.
    pub async fn stop(&self, port: Port) -> Result<StopOutcome> {
        let _lock = self.store.lock()?;
        let mut map = self.store.load();
        let before = map.clone();
        let result = self.stop_locked(&mut map, port).await;
        self.persist(&before, &map)?;
        result
    }

    /// Stop then start under a single lock, keeping the stored protocol
    pub async fn restart(&self, port: Port) -> Result<ServiceRecord> {
        let _lock = self.store.lock()?;
        let mut map = self.store.load();
        let before = map.clone();
        let result = match self.stop_locked(&mut map, port).await {
            Ok(_) => self.start_locked(&mut map, port, None).await,
            Err(e) => Err(e),
        };
        self.persist(&before, &map)?;
        result
    }

    /// Stop the port and remove its routes, identity, runner config and record
    pub async fn delete(&self, port: Port) -> Result<DeleteOutcome> {
        let _lock = self.store.lock()?;
        let mut map = self.store.load();
        let before = map.clone();
        let result = self.delete_locked(&mut map, port).await;
        self.persist(&before, &map)?;
        result
    }

    /// All records, started first, then by creation time
    pub fn list(&self) -> Vec<ServiceRecord> {
        let mut records: Vec<ServiceRecord> = self.store.load().into_values().collect();
        records.sort_by(|a, b| {
            a.status
                .priority()
                .cmp(&b.status.priority())
                .then(a.created_at.cmp(&b.created_at))
                .then(a.port.cmp(&b.port))
        });
        records
    }

    /// Stop every started port
    pub async fn stop_all(&self) -> Result<Vec<StopOutcome>> {
        let _lock = self.store.lock()?;
        let mut map = self.store.load();
        let before = map.clone();

        let started: Vec<Port> = map
            .values()
            .filter(|r| r.is_started())
            .map(|r| r.port)
            .collect();

        let mut outcomes = Vec::with_capacity(started.len());
        let mut result = Ok(());
        for port in started {
            match self.stop_locked(&mut map, port).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        self.persist(&before, &map)?;
        result.map(|()| outcomes)
    }

    /// Public URLs of every record that has been assigned a hostname
    pub fn public_urls(&self) -> Vec<(Port, String)> {
        self.store
            .load()
            .values()
            .filter_map(|r| r.public_url().map(|url| (r.port, url)))
            .collect()
    }

    fn persist(&self, before: &StatusMap, after: &StatusMap) -> Result<()> {
        if before != after {
            self.store.save(after)?;
        }
        Ok(())
    }

    async fn start_locked(
        &self,
        map: &mut StatusMap,
        port: Port,
        protocol: Option<LocalProtocol>,
    ) -> Result<ServiceRecord> {
        self.provisioner.ensure_available().await?;

        let protocol = protocol
            .or_else(|| map.get(&port).map(|r| r.protocol))
            .unwrap_or(self.default_protocol);

        // A started port gets a new generation; the old runner goes first.
        if let Some(record) = map.get_mut(&port)
            && record.is_started()
        {
            info!(port = %port, tunnel = record.tunnel_name(), "Terminating current generation");
            self.supervisor
                .find_and_terminate(record.tunnel_name())
                .await?;
            record.mark_stopped();
        }

        let mut rollback = Rollback::default();
        let identity = match map.get(&port) {
            Some(record) => record.identity.clone(),
            None => {
                let name = self.naming.tunnel_name(port);
                match self.provisioner.create_identity(&name).await {
                    Ok(identity) => {
                        rollback.identity = Some(identity.name.clone());
                        identity
                    }
                    // The tunnel was created even though its credentials were not found
                    Err(ProvisionError::ConfigParseFailed { name, output }) => {
                        warn!(port = %port, tunnel = %name, "Removing tunnel with unknown credentials");
                        rollback.identity = Some(name.clone());
                        self.roll_back(rollback).await;
                        return Err(ProvisionError::ConfigParseFailed { name, output }.into());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let generation = match self
            .launch_generation(port, &identity, protocol, &mut rollback)
            .await
        {
            Ok(generation) => generation,
            Err(e) => {
                warn!(port = %port, error = %e, "Start failed, rolling back");
                self.roll_back(rollback).await;
                return Err(e);
            }
        };

        let record = map
            .entry(port)
            .or_insert_with(|| ServiceRecord::new(port, identity, protocol));
        let previous_config =
            record.begin_generation(generation.hostname, generation.runner_config, protocol);
        record.service_name = self.services.lookup(port).map(str::to_string);

        if let Some(previous) = previous_config
            && let Err(e) = remove_runner_config(&previous)
        {
            warn!(path = %previous.display(), error = %e, "Failed to remove previous runner config");
        }

        info!(
            port = %port,
            tunnel = record.tunnel_name(),
            hostname = record.public_hostname.as_deref().unwrap_or_default(),
            "Port exposed"
        );
        Ok(record.clone())
    }

    async fn launch_generation(
        &self,
        port: Port,
        identity: &IdentityHandle,
        protocol: LocalProtocol,
        rollback: &mut Rollback,
    ) -> Result<Generation> {
        let label = self.naming.generation_label(port);
        let hostname = self.naming.public_hostname(&label);

        let runner_config =
            RunnerConfig::new(identity, protocol, port).write(&self.runner_dir, &label)?;
        rollback.runner_config = Some(runner_config.clone());

        self.provisioner
            .register_route(&identity.name, &hostname)
            .await?;
        rollback.route = Some(hostname.clone());

        self.supervisor
            .spawn_background(&RunnerLaunch {
                tunnel_name: identity.name.clone(),
                config_path: runner_config.clone(),
            })
            .await?;

        Ok(Generation {
            hostname,
            runner_config,
        })
    }

    async fn roll_back(&self, rollback: Rollback) {
        if let Some(hostname) = rollback.route
            && let Err(e) = self.provisioner.delete_route(&hostname).await
        {
            warn!(hostname = %hostname, error = %e, "Failed to delete route during rollback");
        }

        if let Some(path) = rollback.runner_config
            && let Err(e) = remove_runner_config(&path)
        {
            warn!(path = %path.display(), error = %e, "Failed to remove runner config during rollback");
        }

        if let Some(name) = rollback.identity {
            if let Err(e) = self.provisioner.cleanup_identity(&name).await {
                warn!(tunnel = %name, error = %e, "Failed to clean up tunnel during rollback");
            }
            if let Err(e) = self.provisioner.delete_identity(&name).await {
                warn!(tunnel = %name, error = %e, "Failed to delete tunnel during rollback");
            }
        }
    }

    async fn stop_locked(&self, map: &mut StatusMap, port: Port) -> Result<StopOutcome> {
        let tunnel_name = map
            .get(&port)
            .map(|r| r.tunnel_name().to_string())
            .unwrap_or_else(|| self.naming.tunnel_name(port));

        let terminated = self.supervisor.find_and_terminate(&tunnel_name).await?;
        if !terminated {
            debug!(port = %port, tunnel = %tunnel_name, "No runner to stop");
        }

        let record = map.get_mut(&port).map(|record| {
            if record.status != ServiceStatus::Stopped {
                record.mark_stopped();
            }
            record.clone()
        });

        info!(port = %port, terminated, "Port stopped");
        Ok(StopOutcome {
            port,
            terminated,
            record,
        })
    }

    async fn delete_locked(&self, map: &mut StatusMap, port: Port) -> Result<DeleteOutcome> {
        self.stop_locked(map, port).await?;

        let Some(record) = map.get_mut(&port) else {
            info!(port = %port, "Nothing to delete");
            return Ok(DeleteOutcome {
                port,
                removed: false,
            });
        };

        // Routes that are gone are dropped from the record at once so a
        // failed delete can be re-run.
        if let Some(hostname) = record.public_hostname.clone() {
            self.provisioner.delete_route(&hostname).await?;
            record.public_hostname = None;
        }

        for hostname in std::mem::take(&mut record.retired_hostnames) {
            if let Err(e) = self.provisioner.delete_route(&hostname).await {
                warn!(hostname = %hostname, error = %e, "Failed to delete route of an earlier generation");
            }
        }

        let name = record.tunnel_name().to_string();
        self.provisioner.cleanup_identity(&name).await?;
        self.provisioner.delete_identity(&name).await?;

        if let Some(path) = record.runner_config.take()
            && let Err(e) = remove_runner_config(&path)
        {
            warn!(path = %path.display(), error = %e, "Failed to remove runner config");
        }

        map.remove(&port);
        info!(port = %port, tunnel = %name, "Port deleted");
        Ok(DeleteOutcome {
            port,
            removed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn delete_outcome_reports_deleted() {
        let outcome = DeleteOutcome {
            port: Port::new(8080).unwrap(),
            removed: true,
        };
        assert_eq!(outcome.status(), ServiceStatus::Deleted);
        assert_eq!(outcome.status().to_string(), "Deleted");
    }

    #[test]
    fn list_orders_started_before_stopped_then_by_creation() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path().join("status.json"));

        let identity = |port: u16| IdentityHandle {
            name: format!("devbox-{port}"),
            id: format!("id-{port}"),
            credentials_path: PathBuf::from(format!("/creds/id-{port}.json")),
        };
        let base = Utc::now();
        let mut map = StatusMap::new();
        for (offset, (n, started)) in [(3000u16, false), (22, true), (8080, true), (5432, false)]
            .into_iter()
            .enumerate()
        {
            let port = Port::new(n).unwrap();
            let mut record = ServiceRecord::new(port, identity(n), LocalProtocol::Http);
            record.created_at = base + Duration::seconds(offset as i64);
            if started {
                record.status = ServiceStatus::Started;
            }
            map.insert(port, record);
        }
        store.save(&map).unwrap();

        let controller = LifecycleController::from_config(&ExposeConfig {
            store_path: Some(store.path().to_path_buf()),
            ..Default::default()
        });
        let order: Vec<u16> = controller.list().iter().map(|r| r.port.get()).collect();
        assert_eq!(order, vec![22, 8080, 3000, 5432]);
    }
}
