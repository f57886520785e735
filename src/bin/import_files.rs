use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use pagebook::config;
use pagebook::import::Importer;
use pagebook::ingest::ingest_files;
use pagebook::model::{normalize_filename, UploadedFile};
use pagebook::store::FsPageStore;

#[derive(Debug, Parser)]
#[command(about = "Import local files into the page store and print the JSON report")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Extra conversion instructions forwarded to the model
    #[arg(long)]
    instructions: Option<String>,

    /// Create pages directly from CSV, PDF and Markdown files without the model
    #[arg(long)]
    direct: bool,

    /// Files to import
    #[arg(required = true)]
    files: Vec<PathBuf>,
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

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        files.push(UploadedFile::new(
            normalize_filename(&path.to_string_lossy()),
            bytes,
        ));
    }

    let store = Arc::new(FsPageStore::new(cfg.app.resolved_data_dir()));
    let output = if args.direct {
        let results = ingest_files(store.as_ref(), &files).await;
        serde_json::to_string_pretty(&results)?
    } else {
        let importer = Importer::from_config(&cfg, store)?;
        let report = importer.import(files, args.instructions.as_deref()).await?;
        serde_json::to_string_pretty(&report)?
    };
    println!("{}", output);
    Ok(())
}
