//! EmberKV server entry point.
//!
//! Parses the command line, seeds the store from the snapshot file (if one is
//! configured), then accepts connections until Ctrl+C.

use clap::Parser;
use emberkv::snapshot::{self, SnapshotError};
use emberkv::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
use emberkv::{server, Dispatcher, ServerConfig};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// EmberKV - a minimal Redis-compatible in-memory cache
#[derive(Parser, Debug)]
#[command(name = "emberkv")]
#[command(version)]
struct Args {
    /// Directory holding the snapshot file
    #[arg(long)]
    dir: Option<String>,

    /// Snapshot file name inside --dir
    #[arg(long)]
    dbfilename: Option<String>,

    /// Host to bind to
    #[arg(long, default_value = emberkv::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = emberkv::DEFAULT_PORT)]
    port: u16,

    /// Periodically sweep expired keys instead of relying on lazy eviction only
    #[arg(long)]
    active_expiry: bool,
}

impl Args {
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_banner(bind_address: &str) {
    println!(
        r#"
EmberKV v{} - Minimal Redis-Compatible In-Memory Cache
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        emberkv::VERSION,
        bind_address
    );
}

/// Loads the snapshot into `storage`. Never fails startup.
fn load_snapshot(path: &Path, storage: &StorageEngine) {
    match snapshot::load_file(path, storage) {
        Ok(report) => {
            for e in &report.errors {
                warn!(error = %e, "Snapshot was only partially loaded");
            }
        }
        Err(SnapshotError::Io { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            info!(path = %path.display(), "No snapshot file, starting empty");
        }
        Err(e) => {
            warn!(error = %e, "Snapshot not loaded, starting empty");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let bind_address = args.bind_address();

    let config = Arc::new(ServerConfig::new(args.dir, args.dbfilename));

    let storage = Arc::new(StorageEngine::new());
    info!("Storage engine initialized with 64 shards");

    // Must finish before the first connection is accepted
    if let Some(path) = config.snapshot_path() {
        load_snapshot(&path, &storage);
    }
    info!(key_count = storage.len(), "Key space ready");

    let _sweeper = args
        .active_expiry
        .then(|| ExpirySweeper::start(Arc::clone(&storage), ExpiryConfig::default()));

    let listener = TcpListener::bind(&bind_address).await?;
    print_banner(&bind_address);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    server::serve(listener, Dispatcher::new(storage, config), shutdown).await;

    info!("Server shutdown complete");
    Ok(())
}
