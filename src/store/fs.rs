use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

use super::model::{check_asset_name, normalize_slug, page_dir, slug_segments, PageNode, CONTENT_FILE};
use super::{PageStore, StoreError};

/// Filesystem page store rooted at the data directory.
#[derive(Debug, Clone)]
pub struct FsPageStore {
    root: PathBuf,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

impl FsPageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn existing_page_dir(&self, slug: &str) -> Result<PathBuf, StoreError> {
        let dir = page_dir(&self.root, slug)?;
        if !exists(&dir.join(CONTENT_FILE)).await {
            return Err(StoreError::NotFound(slug.to_string()));
        }
        Ok(dir)
    }

    #[instrument(skip(self))]
    pub async fn read_page_content(&self, slug: &str) -> Result<String, StoreError> {
        let file = self.existing_page_dir(slug).await?.join(CONTENT_FILE);
        fs::read_to_string(&file).await.map_err(io_err(&file))
    }

    pub async fn read_asset(&self, slug: &str, filename: &str) -> Result<Vec<u8>, StoreError> {
        check_asset_name(filename)?;
        let file = page_dir(&self.root, slug)?.join(filename);
        if !exists(&file).await {
            return Err(StoreError::NotFound(format!("{}/{}", slug, filename)));
        }
        fs::read(&file).await.map_err(io_err(&file))
    }

    /// Pages under the root, sorted by name at every level.
    pub async fn list_pages(&self) -> Result<Vec<PageNode>, StoreError> {
        if !exists(&self.root).await {
            return Ok(Vec::new());
        }
        self.list_dir(&self.root, "").await
    }

    fn list_dir<'a>(
        &'a self,
        dir: &'a Path,
        prefix: &'a str,
    ) -> futures::future::BoxFuture<'a, Result<Vec<PageNode>, StoreError>> {
        Box::pin(async move {
            let mut entries = fs::read_dir(dir).await.map_err(io_err(dir))?;
            let mut nodes = Vec::new();
            while let Some(entry) = entries.next_entry().await.map_err(io_err(dir))? {
                let file_type = entry.file_type().await.map_err(io_err(dir))?;
                if !file_type.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let slug = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                let path = entry.path();
                let children = self.list_dir(&path, &slug).await?;
                if exists(&path.join(CONTENT_FILE)).await || !children.is_empty() {
                    nodes.push(PageNode {
                        name,
                        slug,
                        children,
                    });
                }
            }
            nodes.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(nodes)
        })
    }

    /// Rename a page in place. Returns the new slug.
    #[instrument(skip(self))]
    pub async fn rename_page(&self, slug: &str, new_name: &str) -> Result<String, StoreError> {
        let segments = slug_segments(slug)?;
        if slug_segments(new_name)?.len() != 1 {
            return Err(StoreError::InvalidPath(new_name.to_string()));
        }
        let parent = &segments[..segments.len() - 1];
        let target = if parent.is_empty() {
            new_name.trim_matches('/').to_string()
        } else {
            format!("{}/{}", parent.join("/"), new_name.trim_matches('/'))
        };
        self.relocate(slug, &target).await
    }

    /// Move a page (with its subtree) under `new_parent`, or to the root when `None`.
    #[instrument(skip(self))]
    pub async fn move_page(&self, slug: &str, new_parent: Option<&str>) -> Result<String, StoreError> {
        let segments = slug_segments(slug)?;
        let leaf = segments[segments.len() - 1];
        let target = match new_parent {
            Some(parent) => format!("{}/{}", normalize_slug(parent)?, leaf),
            None => leaf.to_string(),
        };
        self.relocate(slug, &target).await
    }

    async fn relocate(&self, slug: &str, target: &str) -> Result<String, StoreError> {
        let from_slug = normalize_slug(slug)?;
        let to_slug = normalize_slug(target)?;
        if to_slug == from_slug {
            return Ok(to_slug);
        }
        if to_slug.starts_with(&format!("{}/", from_slug)) {
            return Err(StoreError::InvalidPath(format!(
                "cannot move {} into its own subtree",
                from_slug
            )));
        }
        let from = self.existing_page_dir(&from_slug).await?;
        let to = page_dir(&self.root, &to_slug)?;
        if exists(&to).await {
            return Err(StoreError::AlreadyExists(to_slug));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }
        fs::rename(&from, &to).await.map_err(io_err(&from))?;
        info!(from = %from_slug, to = %to_slug, "page relocated");
        Ok(to_slug)
    }

    /// Remove a page and everything below it.
    #[instrument(skip(self))]
    pub async fn delete_page(&self, slug: &str) -> Result<(), StoreError> {
        let dir = page_dir(&self.root, slug)?;
        if !exists(&dir).await {
            return Err(StoreError::NotFound(slug.to_string()));
        }
        fs::remove_dir_all(&dir).await.map_err(io_err(&dir))?;
        info!(slug, "page deleted");
        Ok(())
    }
}

#[async_trait]
impl PageStore for FsPageStore {
    async fn create_page(&self, slug: &str) -> Result<(), StoreError> {
        let dir = page_dir(&self.root, slug)?;
        fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;
        let file = dir.join(CONTENT_FILE);
        if !exists(&file).await {
            fs::write(&file, b"").await.map_err(io_err(&file))?;
        }
        Ok(())
    }

    async fn save_page_content(&self, slug: &str, content: &str) -> Result<(), StoreError> {
        let dir = page_dir(&self.root, slug)?;
        fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;
        let file = dir.join(CONTENT_FILE);
        fs::write(&file, content).await.map_err(io_err(&file))
    }

    async fn save_asset(&self, slug: &str, filename: &str, bytes: &[u8]) -> Result<(), StoreError> {
        check_asset_name(filename)?;
        let dir = page_dir(&self.root, slug)?;
        fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;
        let file = dir.join(filename);
        fs::write(&file, bytes).await.map_err(io_err(&file))
    }
}
