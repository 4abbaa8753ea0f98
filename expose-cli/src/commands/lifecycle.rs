//! start / stop / restart / delete / stop-all

use std::io::IsTerminal;

use anyhow::{Context, Result, bail};
use clap::Args;
use dialoguer::Confirm;
use expose_core::{LocalProtocol, Port, ServiceRecord};
use tracing::debug;

use crate::output::{print_step, print_success};

#[derive(Args)]
pub struct StartArgs {
    /// Local port to expose
    pub port: Port,

    /// Scheme of the local service (http, https, tcp, ssh, rdp)
    #[arg(short, long)]
    pub protocol: Option<LocalProtocol>,
}

#[derive(Args)]
pub struct PortArgs {
    /// Local port
    pub port: Port,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Local port
    pub port: Port,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn start(args: StartArgs) -> Result<()> {
    let controller = super::controller()?;
    print_step(&format!("Starting service on port {}...", args.port));
    let record = controller
        .start(args.port, args.protocol)
        .await
        .with_context(|| format!("Failed to start port {}", args.port))?;
    print_success(&exposed_message(&record));
    Ok(())
}

pub async fn stop(args: PortArgs) -> Result<()> {
    let controller = super::controller()?;
    print_step(&format!("Stopping service on port {}...", args.port));
    let outcome = controller
        .stop(args.port)
        .await
        .with_context(|| format!("Failed to stop port {}", args.port))?;

    if outcome.terminated {
        print_success(&format!("Port {} stopped", args.port));
    } else {
        print_success(&format!("Port {} was not running", args.port));
    }
    Ok(())
}

pub async fn restart(args: PortArgs) -> Result<()> {
    let controller = super::controller()?;
    print_step(&format!("Restarting service on port {}...", args.port));
    let record = controller
        .restart(args.port)
        .await
        .with_context(|| format!("Failed to restart port {}", args.port))?;
    print_success(&exposed_message(&record));
    Ok(())
}

pub async fn delete(args: DeleteArgs) -> Result<()> {
    if !args.yes && !confirm_delete(args.port)? {
        println!("Aborted");
        return Ok(());
    }

    let controller = super::controller()?;
    print_step(&format!("Deleting service on port {}...", args.port));
    let outcome = controller
        .delete(args.port)
        .await
        .with_context(|| format!("Failed to delete port {}", args.port))?;

    if outcome.removed {
        print_success(&format!("Port {} {}", outcome.port, outcome.status()));
    } else {
        print_success(&format!("Port {} has nothing to delete", outcome.port));
    }
    Ok(())
}

pub async fn stop_all() -> Result<()> {
    let controller = super::controller()?;
    print_step("Stopping all services...");
    let outcomes = controller
        .stop_all()
        .await
        .context("Failed to stop all ports")?;

    let ports: Vec<String> = outcomes.iter().map(|o| o.port.to_string()).collect();
    if ports.is_empty() {
        print_success("No port was started");
    } else {
        print_success(&format!("Stopped {}", ports.join(", ")));
    }
    Ok(())
}

fn exposed_message(record: &ServiceRecord) -> String {
    match record.public_url() {
        Some(url) => format!("Port {} is exposed at {}", record.port, url),
        None => format!("Port {} started", record.port),
    }
}

fn confirm_delete(port: Port) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        bail!("Refusing to delete port {port} without confirmation; pass --yes");
    }
    let confirmed = Confirm::new()
        .with_prompt(format!(
            "Delete the tunnel, DNS routes and record of port {port}?"
        ))
        .default(false)
        .interact()?;
    debug!(port = %port, confirmed, "Delete confirmation answered");
    Ok(confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expose_core::IdentityHandle;
    use std::path::PathBuf;

    #[test]
    fn exposed_message_includes_url() {
        let port = Port::new(8080).unwrap();
        let mut record = ServiceRecord::new(
            port,
            IdentityHandle {
                name: "devbox-8080".to_string(),
                id: "abc".to_string(),
                credentials_path: PathBuf::from("/creds/abc.json"),
            },
            LocalProtocol::Http,
        );
        assert_eq!(exposed_message(&record), "Port 8080 started");

        record.begin_generation(
            "devbox-8080-k3j9x2.example.com".to_string(),
            PathBuf::from("/creds/devbox-8080-k3j9x2.yml"),
            LocalProtocol::Http,
        );
        assert_eq!(
            exposed_message(&record),
            "Port 8080 is exposed at https://devbox-8080-k3j9x2.example.com"
        );
    }
}
