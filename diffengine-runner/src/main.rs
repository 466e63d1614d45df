//! diffengine-runner — headless job-graph scheduler for structured
//! changesets.
//!
//! Entry point for the `diffengine-runner` binary. Wires together the
//! config loader, the `tracing-subscriber` logger, the git/highlight/pubsub
//! adapters, and the `Runner` supervisor loop against a WAL-mode SQLite
//! database.
//!
//! # Startup sequence
//!
//! 1. `tracing_subscriber` init — first, so every later step is logged.
//! 2. `register_sigterm()` — returns an `Arc<AtomicBool>`-backed watch
//!    channel polled by the runner loop, same mechanism as the teacher's
//!    TUI but without a terminal to restore on exit.
//! 3. Config load (`--config`, overridden by `--db`/`--repo`/`--workers`).
//! 4. `open_db()` before the first poll — no "loading" state to manage.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use diffengine_core::db::Persistence;
use diffengine_runner::config::DiffEngineConfig;
use diffengine_runner::{git, highlight, pubsub, runner};
use signal_hook::consts::SIGTERM;
use signal_hook::flag::register;

#[derive(Parser, Debug)]
#[command(name = "diffengine-runner", about = "Resumable changeset difference engine")]
struct Cli {
    /// Path to a TOML config file. Missing file falls back to defaults.
    #[arg(long, default_value = "diffengine.toml")]
    config: PathBuf,
    /// Overrides the configured database path.
    #[arg(long)]
    db: Option<PathBuf>,
    /// Overrides the configured repository path.
    #[arg(long)]
    repo: Option<PathBuf>,
    /// Overrides the configured worker pool size.
    #[arg(long)]
    workers: Option<usize>,
}

fn register_sigterm() -> Arc<AtomicBool> {
    let term = Arc::new(AtomicBool::new(false));
    register(SIGTERM, Arc::clone(&term)).expect("failed to register SIGTERM handler");
    term
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut cfg = DiffEngineConfig::load(&cli.config)?;
    if let Some(db) = cli.db {
        cfg.database = db;
    }
    if let Some(repo) = cli.repo {
        cfg.repository = repo;
    }
    if let Some(workers) = cli.workers {
        cfg.workers = workers;
    }

    tracing::info!(?cfg, "starting diffengine-runner");

    let term_flag = register_sigterm();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let db = Persistence::open(&cfg.database.to_string_lossy()).await?;
    let git = Arc::new(git::Git2RepositoryReader::open(cfg.repository.clone())?);
    let highlighter = Arc::new(highlight::SyntectHighlighter::new());
    let (publisher, mut notifications) = pubsub::ChannelPublisher::new();
    let publisher = Arc::new(publisher);

    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            tracing::debug!(?notification, "changeset notification");
        }
    });

    // repository_id is 1 for the single repository this binary serves; a
    // multi-repository deployment would resolve it from `--repo`.
    let mut runner = runner::Runner::new(
        db,
        git,
        highlighter,
        publisher,
        1,
        std::time::Duration::from_secs(cfg.poll_interval_secs),
        cfg.workers,
    );

    let runner_handle = tokio::spawn(async move {
        runner.run(shutdown_rx).await;
    });

    loop {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        if term_flag.load(Ordering::Relaxed) {
            break;
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = runner_handle.await;
    tracing::info!("diffengine-runner shut down cleanly");
    Ok(())
}
