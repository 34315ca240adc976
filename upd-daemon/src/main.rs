//! upd Daemon (`upd`)
//!
//! Runs the heartbeat journal against handshakes read from stdin, and offers
//! maintenance commands for the journal and the peer list.

mod commands;
mod config_commands;
mod run;
mod uptime_commands;

use anyhow::Context;
use clap::Parser;
use commands::{Args, Command};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use upd_node::DataDir;

fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.verbose);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let result = runtime.block_on(dispatch(args));
    // A pending stdin read would otherwise hold shutdown open
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn dispatch(args: Args) -> anyhow::Result<()> {
    let data_dir = match args.data_dir {
        Some(path) => DataDir::new(path),
        None => DataDir::default_location().context("Cannot determine home directory")?,
    };

    match args.command {
        Command::Run {
            local_key,
            sweep_secs,
            threshold_secs,
            window_ms,
            notifier,
        } => {
            let opts = run::RunOptions {
                local_key,
                sweep_secs,
                threshold_secs,
                window_ms,
                notifier,
            };
            run::run(&data_dir, opts).await
        }
        Command::Uptime { subcommand } => uptime_commands::handle(&data_dir, subcommand),
        Command::Config { subcommand } => config_commands::handle(&data_dir, subcommand),
    }
}

fn init_tracing(verbosity: u8) {
    let mut filter = EnvFilter::from_default_env();

    // Only apply defaults if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        if let Ok(directive) = level.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
