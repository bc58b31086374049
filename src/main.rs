use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use gamedash::bus::EventBus;
use gamedash::config::DashboardConfig;
use gamedash::console::Console;
use gamedash::storage;
use gamedash::store::RecordStore;
use gamedash::Dashboard;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Overrides RUST_LOG, e.g. "debug" or "info,gamedash=trace".
    #[clap(long, global = true)]
    log_level: Option<String>,

    #[clap(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Clone, Debug)]
enum Mode {
    /// Load a catalog and explore it interactively.
    Repl {
        #[clap(long)]
        data: PathBuf,

        /// Treat --data as a binary snapshot written by `pack`.
        #[clap(long)]
        snapshot: bool,
    },
    /// Validate a JSON catalog and write it as a binary snapshot.
    Pack {
        #[clap(long)]
        data: PathBuf,

        #[clap(long)]
        out: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,gamedash=info")),
    };
    tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_level(true)
    .with_writer(io::stderr)
    .init();

    let config = DashboardConfig::default();
    config.log_summary();

    // Loading is the only async work; the REPL itself is synchronous.
    let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("failed to start runtime")?;

    match args.command {
        Mode::Repl { data, snapshot } => {
            let store = runtime.block_on(load(&data, snapshot, &config))?;
            drop(runtime);

            let bus = Arc::new(EventBus::new());
            let dashboard = Dashboard::new(Arc::new(store), bus, config);
            dashboard.attach();

            let console = Console::new(dashboard, Arc::new(Mutex::new(io::stdout())));
            console.run(io::stdin().lock()).context("console I/O failed")?;
            info!("Shutting down.");
        }
        Mode::Pack { data, out } => {
            runtime.block_on(async {
                let store = load(&data, false, &config).await?;
                storage::write_snapshot(&out, store.records())
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;
                info!(records = store.len(), out = %out.display(), "snapshot written");
                anyhow::Ok(())
            })?;
        }
    }
    Ok(())
}

async fn load(path: &Path, snapshot: bool, config: &DashboardConfig) -> anyhow::Result<RecordStore> {
    let store = if snapshot {
        RecordStore::load_snapshot(path, config.duration_log_divisor).await
    } else {
        RecordStore::load_json(path, config.duration_log_divisor).await
    };
    store.with_context(|| format!("failed to load {}", path.display()))
}
