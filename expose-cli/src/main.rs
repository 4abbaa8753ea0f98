use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "expose", about = "Expose local ports through Cloudflare tunnels")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Expose a local port under a fresh public hostname
    Start(commands::lifecycle::StartArgs),
    /// Stop the tunnel of a port, keeping its identity
    Stop(commands::lifecycle::PortArgs),
    /// Stop then start a port with a new hostname
    Restart(commands::lifecycle::PortArgs),
    /// Stop a port and remove its tunnel, routes and record
    Delete(commands::lifecycle::DeleteArgs),
    /// List exposed ports
    List,
    /// Print the public URL of every exposed port
    Urls,
    /// Stop every started port
    StopAll,
    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Start(args) => commands::lifecycle::start(args).await,
        Commands::Stop(args) => commands::lifecycle::stop(args).await,
        Commands::Restart(args) => commands::lifecycle::restart(args).await,
        Commands::Delete(args) => commands::lifecycle::delete(args).await,
        Commands::List => commands::list::list(),
        Commands::Urls => commands::list::urls(),
        Commands::StopAll => commands::lifecycle::stop_all().await,
        Commands::Config(args) => commands::config::run(args),
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the level picked by `--verbose`.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
