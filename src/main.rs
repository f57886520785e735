use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use pagebook::config;
use pagebook::handlers::{self, AppState};
use pagebook::import::Importer;
use pagebook::store::FsPageStore;

#[derive(Debug, Parser)]
#[command(author, version, about = "Serve the page store and its import endpoints")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    if cfg.server.shared_secret.trim().is_empty() {
        bail!("server.shared_secret must be set before the server is exposed");
    }

    let data_dir = cfg.app.resolved_data_dir();
    let store = Arc::new(FsPageStore::new(&data_dir));
    let importer = Arc::new(Importer::from_config(&cfg, store.clone())?);

    let state = AppState {
        store,
        importer,
        shared_secret: cfg.server.shared_secret.trim().to_string(),
    };
    let app = handlers::router(state, cfg.server.max_upload_mb * 1024 * 1024);

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.bind))?;
    info!(bind = %cfg.server.bind, %data_dir, "starting page server");
    axum::serve(listener, app).await?;

    Ok(())
}
