//! Tunnel runner process supervision
//!
//! Runners are launched detached and never tracked by pid. They are found
//! again by scanning the process table for the runner binary with the tunnel
//! name as one of its arguments.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System, UpdateKind};
use tracing::{debug, info, warn};

use crate::config::CloudflaredConfig;
use crate::error::SupervisorError;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What to launch for one tunnel generation
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerLaunch {
    pub tunnel_name: String,
    pub config_path: PathBuf,
}

/// Launches and terminates tunnel runners
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Start a detached runner; returns its pid for logging only
    async fn spawn_background(&self, launch: &RunnerLaunch) -> Result<u32, SupervisorError>;

    /// Terminate the first runner serving `tunnel_name`.
    ///
    /// `Ok(false)` means no runner was found, which callers treat as success.
    async fn find_and_terminate(&self, tunnel_name: &str) -> Result<bool, SupervisorError>;
}

/// [`ProcessSupervisor`] over the real OS process table
#[derive(Debug, Clone)]
pub struct SystemSupervisor {
    binary: PathBuf,
    binary_name: String,
    terminate_grace: Duration,
}

impl SystemSupervisor {
    pub fn new(config: &CloudflaredConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            binary_name: config.binary_name(),
            terminate_grace: config.terminate_grace,
        }
    }

    /// Supervisor for an arbitrary binary (used by tests)
    pub fn for_binary(binary: impl Into<PathBuf>, terminate_grace: Duration) -> Self {
        let binary = binary.into();
        let binary_name = binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            binary,
            binary_name,
            terminate_grace,
        }
    }

    fn find_runner(&self, system: &System, tunnel_name: &str) -> Option<Pid> {
        system
            .processes()
            .iter()
            .filter(|(_, p)| p.status() != ProcessStatus::Zombie)
            .find(|(_, p)| is_runner_process(p.name(), p.cmd(), &self.binary_name, tunnel_name))
            .map(|(pid, _)| *pid)
    }

    async fn wait_for_exit(&self, system: &mut System, pid: Pid) -> bool {
        let deadline = Instant::now() + self.terminate_grace;
        loop {
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::nothing(),
            );
            match system.process(pid) {
                None => return true,
                Some(p) if p.status() == ProcessStatus::Zombie => return true,
                Some(_) => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ProcessSupervisor for SystemSupervisor {
    async fn spawn_background(&self, launch: &RunnerLaunch) -> Result<u32, SupervisorError> {
        let mut cmd = std::process::Command::new(&self.binary);
        cmd.arg("tunnel")
            .arg("--config")
            .arg(&launch.config_path)
            .arg("run")
            .arg(&launch.tunnel_name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut cmd);

        let child = cmd.spawn().map_err(SupervisorError::SpawnFailed)?;
        let pid = child.id();
        info!(pid, tunnel = %launch.tunnel_name, "Spawned tunnel runner");
        Ok(pid)
    }

    async fn find_and_terminate(&self, tunnel_name: &str) -> Result<bool, SupervisorError> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        let Some(pid) = self.find_runner(&system, tunnel_name) else {
            debug!(tunnel = tunnel_name, "No running tunnel runner found");
            return Ok(false);
        };

        if let Some(process) = system.process(pid) {
            let delivered = process.kill_with(Signal::Term).unwrap_or_else(|| process.kill());
            if !delivered {
                warn!(pid = pid.as_u32(), tunnel = tunnel_name, "Failed to signal tunnel runner");
            }
        }

        if self.wait_for_exit(&mut system, pid).await {
            info!(pid = pid.as_u32(), tunnel = tunnel_name, "Terminated tunnel runner");
            Ok(true)
        } else {
            Err(SupervisorError::NotResponding {
                pid: pid.as_u32(),
                tunnel_name: tunnel_name.to_string(),
                grace: self.terminate_grace,
            })
        }
    }
}

/// Executable name contains the runner binary name and one argument is
/// exactly the tunnel name. Exact comparison keeps `host-80` from matching
/// the runner of `host-8080`.
pub fn is_runner_process(
    name: &OsStr,
    cmd: &[OsString],
    binary_name: &str,
    tunnel_name: &str,
) -> bool {
    name.to_string_lossy().contains(binary_name) && cmd.iter().any(|arg| arg == tunnel_name)
}

/// Run the child in its own session so it outlives this process.
#[cfg(unix)]
fn detach(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid is async-signal-safe and is called between fork and exec.
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn detach(_cmd: &mut std::process::Command) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn matches_runner_by_exact_tunnel_argument() {
        let cmd = args(&["cloudflared", "tunnel", "--config", "/c/devbox-8080-x.yml", "run", "devbox-8080"]);
        assert!(is_runner_process(OsStr::new("cloudflared"), &cmd, "cloudflared", "devbox-8080"));
        assert!(!is_runner_process(OsStr::new("cloudflared"), &cmd, "cloudflared", "devbox-80"));
        assert!(!is_runner_process(OsStr::new("bash"), &cmd, "cloudflared", "devbox-8080"));
    }

    #[cfg(unix)]
    fn spawn_marked_shell(script: &str, marker: &str) -> std::process::Child {
        let child = std::process::Command::new("sh")
            .args(["-c", script, marker])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));
        child
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn find_and_terminate_without_match_is_not_an_error() {
        let supervisor = SystemSupervisor::for_binary("cloudflared", Duration::from_secs(1));
        let found = supervisor
            .find_and_terminate("expose-test-no-such-tunnel-7a9c")
            .await
            .unwrap();
        assert!(!found);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn find_and_terminate_stops_matching_process() {
        let marker = format!("expose-test-{}", std::process::id());
        let mut child = spawn_marked_shell("sleep 5; :", &marker);

        let supervisor = SystemSupervisor::for_binary("sh", Duration::from_secs(3));
        let found = supervisor.find_and_terminate(&marker).await.unwrap();
        assert!(found);
        child.wait().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runner_ignoring_sigterm_is_not_responding() {
        let marker = format!("expose-test-stubborn-{}", std::process::id());
        let mut child = spawn_marked_shell("trap '' TERM; sleep 3; :", &marker);

        let supervisor = SystemSupervisor::for_binary("sh", Duration::from_millis(300));
        let err = supervisor.find_and_terminate(&marker).await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotResponding { .. }));

        child.kill().unwrap();
        child.wait().unwrap();
    }
}
