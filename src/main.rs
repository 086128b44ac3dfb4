// src/main.rs
//! snapd-seed-glue - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use snapd_seed_glue::{
    channel, Collaborators, Downloader, HttpTransport, Reconciler, RemoteStore, SeedLayout,
    SnapCommand, SnapRequest, TabReporter, Xdelta3Applier,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snapd-seed-glue")]
#[command(version)]
#[command(about = "Prepare a snap seed directory for offline first boot", long_about = None)]
struct Cli {
    /// Seed directory to reconcile
    #[arg(long, default_value = "/var/lib/snapd/seed")]
    seed: PathBuf,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,

    /// Snaps to include in the seed
    #[arg(value_name = "SNAP[=CHANNEL]")]
    snaps: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let requests: Vec<SnapRequest> = cli
        .snaps
        .iter()
        .map(|arg| SnapRequest::parse(arg))
        .collect();

    let default_channel =
        channel::default_channel().context("failed to determine default channel")?;

    let collaborators = Collaborators {
        store: Box::new(RemoteStore::new()?),
        assertions: Box::new(RemoteStore::new()?),
        downloader: Downloader::new(Box::new(HttpTransport::new()?)),
        applier: Box::new(Xdelta3Applier),
        snap_cli: Box::new(SnapCommand),
    };

    let mut reconciler = Reconciler::new(
        SeedLayout::new(cli.seed),
        default_channel,
        cli.verbose,
        collaborators,
        Box::new(TabReporter),
    );
    reconciler.run(&requests)?;
    Ok(())
}
