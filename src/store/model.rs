//! Slug handling and listing models for page storage.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};

use super::StoreError;

/// Name of the markdown file inside every page directory.
pub const CONTENT_FILE: &str = "content.md";

/// A page in the listing tree.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageNode {
    pub name: String,
    pub slug: String,
    pub children: Vec<PageNode>,
}

/// Validate a `/`-separated slug and return its segments.
pub fn slug_segments(slug: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = slug.trim_matches('/');
    if trimmed.is_empty() || trimmed.contains('\\') {
        return Err(StoreError::InvalidPath(slug.to_string()));
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    for segment in &segments {
        if segment.is_empty() || *segment == "." || *segment == ".." {
            return Err(StoreError::InvalidPath(slug.to_string()));
        }
    }
    Ok(segments)
}

/// Directory of `slug` under `root`.
pub fn page_dir(root: &Path, slug: &str) -> Result<PathBuf, StoreError> {
    let mut dir = root.to_path_buf();
    for segment in slug_segments(slug)? {
        dir.push(segment);
    }
    Ok(dir)
}

/// Canonical form of a slug: segments joined by `/`, no outer slashes.
pub fn normalize_slug(slug: &str) -> Result<String, StoreError> {
    Ok(slug_segments(slug)?.join("/"))
}

/// An asset filename must be one plain path component and not the content file.
pub fn check_asset_name(filename: &str) -> Result<(), StoreError> {
    let mut components = Path::new(filename).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single_normal || filename.contains('\\') || filename == CONTENT_FILE {
        return Err(StoreError::InvalidPath(filename.to_string()));
    }
    Ok(())
}
