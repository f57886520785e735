//! Partition a flat upload into import units by filename-prefix matching.
//!
//! An asset belongs to a document when its base name equals the document's
//! base name or starts with `base-` / `base_`. Matching is case-sensitive and
//! every matching document claims the asset; there is no tie-break.
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::model::{base_name, extension_of, AssetReference, ImportUnit, UploadedFile};

pub const DOCUMENT_EXTENSIONS: &[&str] = &["html", "htm"];
pub const ASSET_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Document,
    Asset,
    Ignored,
}

#[derive(Debug, Default)]
pub struct Grouping {
    pub units: Vec<ImportUnit>,
    pub unmatched_assets: Vec<String>,
}

pub fn classify(filename: &str) -> FileRole {
    match extension_of(filename) {
        Some(ext) if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) => FileRole::Document,
        Some(ext) if ASSET_EXTENSIONS.contains(&ext.as_str()) => FileRole::Asset,
        _ => FileRole::Ignored,
    }
}

/// Whitespace runs become a single hyphen, leading and trailing runs included.
pub fn slugify(name: &str) -> String {
    WHITESPACE.replace_all(name, "-").into_owned()
}

/// Whether an asset's base name falls in the prefix family of `document_base`.
pub fn asset_matches(document_base: &str, asset_base: &str) -> bool {
    if asset_base == document_base {
        return true;
    }
    match asset_base.strip_prefix(document_base) {
        Some(rest) => rest.starts_with('-') || rest.starts_with('_'),
        None => false,
    }
}

/// Group uploaded files. Units follow document upload order; assets within a
/// unit and the unmatched list follow asset upload order.
pub fn group_files(files: &[UploadedFile]) -> Grouping {
    let mut documents = Vec::new();
    let mut assets = Vec::new();
    for file in files {
        match classify(&file.filename) {
            FileRole::Document => documents.push(file),
            FileRole::Asset => assets.push(file),
            FileRole::Ignored => debug!(filename = %file.filename, "ignoring upload"),
        }
    }

    let mut claimed = vec![false; assets.len()];
    let mut units = Vec::with_capacity(documents.len());
    for doc in documents {
        let name = base_name(&doc.filename).to_string();
        let slug = slugify(&name);
        let mut unit_assets = Vec::new();
        for (idx, asset) in assets.iter().enumerate() {
            if asset_matches(&name, base_name(&asset.filename)) {
                claimed[idx] = true;
                unit_assets.push(AssetReference::from_upload(asset));
            }
        }
        units.push(ImportUnit {
            name,
            slug,
            primary_document: Some((*doc).clone()),
            assets: unit_assets,
        });
    }

    let unmatched_assets = assets
        .iter()
        .zip(claimed)
        .filter(|(_, claimed)| !claimed)
        .map(|(asset, _)| asset.filename.clone())
        .collect();

    Grouping {
        units,
        unmatched_assets,
    }
}
