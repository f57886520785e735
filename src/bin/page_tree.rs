use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use pagebook::config;
use pagebook::store::{FsPageStore, PageNode};

#[derive(Debug, Parser)]
#[command(about = "Print the page tree of the data directory")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print slugs instead of names
    #[arg(long)]
    slugs: bool,
}

fn print_nodes(nodes: &[PageNode], depth: usize, slugs: bool) {
    for node in nodes {
        let label = if slugs { &node.slug } else { &node.name };
        println!("{}{}", "  ".repeat(depth), label);
        print_nodes(&node.children, depth + 1, slugs);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let store = FsPageStore::new(cfg.app.resolved_data_dir());
    let pages = store.list_pages().await?;
    if pages.is_empty() {
        println!("(no pages)");
    }
    print_nodes(&pages, 0, args.slugs);
    Ok(())
}
