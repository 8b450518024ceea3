//! # Oblivion Main Entry Point
//!
//! File: cli/src/main.rs
//!
//! ## Overview
//!
//! Entry point of the `oblivion` CLI, a single-host deployment orchestrator.
//! It handles:
//! - Command-line argument parsing using Clap
//! - Setting up the logging system based on verbosity flags
//! - Loading `~/.oblivion.toml` (or `--config`)
//! - Installing the Ctrl-C handler that cancels in-flight work
//! - Routing execution to the service command handlers
//!
//! ## Architecture
//!
//! - Each service group (`postgres`, `kuma`, ...) is a variant of `Commands`
//!   mapped to a handler in its module under `commands/`.
//! - Dispatch errors (bad config, engine or secret store unreachable) reach
//!   this level and exit with status 1. A service that fails to come up is
//!   logged by its handler and does not change the exit status.
//!
//! ## Examples
//!
//! ```bash
//! # Create the shared networks, then the database tier
//! oblivion networks up
//! oblivion -v postgres up
//!
//! # Use another configuration file
//! oblivion --config ./staging.toml observer up
//! ```
//!
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

mod commands; // One module per managed service group
mod common; // Docker orchestration, build contexts, secrets, processes
mod core; // Config, errors, templating, command resources

/// Top-level command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "oblivion",
    about = "oblivion: bring up the services of a single host",
    long_about = "Idempotently creates the networks, volumes, images and containers of a\n\
                  fixed service topology (postgres, dragonfly, uptime kuma, static files,\n\
                  observability) on the local Docker engine.",
    propagate_version = true,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Configuration file (default: ~/.oblivion.toml).
    #[arg(long, global = true, env = "OBLIVION_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

/// All available top-level commands.
#[derive(Parser, Debug)]
enum Commands {
    /// Shared bridge networks.
    Networks(commands::networks::NetworksArgs),
    /// PostgreSQL primary, replica and pgbouncer.
    Postgres(commands::postgres::PostgresArgs),
    /// Dragonfly cache.
    Redis(commands::redis::RedisArgs),
    /// Uptime Kuma monitor.
    Kuma(commands::kuma::KumaArgs),
    /// nginx static file server.
    Static(commands::static_site::StaticArgs),
    /// Metrics, dashboards and log shipping.
    Observer(commands::observer::ObserverArgs),
    /// Tool and Docker versions.
    Version(commands::version::VersionArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    tracing::debug!("Parsed CLI arguments: {:?}", cli);

    let command_result = run(cli).await;

    if let Err(e) = command_result {
        tracing::error!("Command execution failed: {:?}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = crate::core::config::load_config(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Networks(args) => commands::networks::handle_networks(args, &cfg, cancel).await,
        Commands::Postgres(args) => commands::postgres::handle_postgres(args, &cfg, cancel).await,
        Commands::Redis(args) => commands::redis::handle_redis(args, &cfg, cancel).await,
        Commands::Kuma(args) => commands::kuma::handle_kuma(args, &cfg, cancel).await,
        Commands::Static(args) => commands::static_site::handle_static(args, &cfg, cancel).await,
        Commands::Observer(args) => commands::observer::handle_observer(args, &cfg, cancel).await,
        Commands::Version(args) => commands::version::handle_version(args, &cfg, cancel).await,
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["oblivion", "kuma", "up", "-vv", "--config", "/tmp/o.toml"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/o.toml")));
        assert!(matches!(cli.command, Commands::Kuma(_)));
    }
}
