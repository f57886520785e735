//! Page storage: one directory per page, `content.md` inside, nesting by
//! subdirectory.
//!
//! - `model`: slug validation and the page tree returned by listings.
//! - `fs`: the filesystem-backed `PageStore`.
//!
//! The import pipeline only needs `PageStore`; the rest of the lifecycle
//! (rename, move, delete, listing) lives on `FsPageStore`.

use async_trait::async_trait;
use thiserror::Error;

pub mod fs;
pub mod model;

pub use fs::FsPageStore;
pub use model::{PageNode, CONTENT_FILE};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid page path: {0}")]
    InvalidPath(String),
    #[error("page not found: {0}")]
    NotFound(String),
    #[error("page already exists: {0}")]
    AlreadyExists(String),
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Operations the import pipeline performs against page storage.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Ensure the page directory and its content file exist. Never truncates.
    async fn create_page(&self, slug: &str) -> Result<(), StoreError>;

    /// Overwrite the page's markdown content.
    async fn save_page_content(&self, slug: &str, content: &str) -> Result<(), StoreError>;

    /// Write a binary asset next to the page's content.
    async fn save_asset(&self, slug: &str, filename: &str, bytes: &[u8]) -> Result<(), StoreError>;
}
