use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::sniff::{self, ImageType};

/// One file as received from an upload (multipart part or local file).
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// An asset file claimed by an import unit.
#[derive(Debug, Clone)]
pub struct AssetReference {
    pub filename: String,
    pub bytes: Bytes,
    pub declared_extension: Option<String>,
}

impl AssetReference {
    pub fn from_upload(file: &UploadedFile) -> Self {
        Self {
            filename: file.filename.clone(),
            bytes: file.bytes.clone(),
            declared_extension: extension_of(&file.filename),
        }
    }

    /// Type from content bytes, if the signature is recognised.
    pub fn sniffed_type(&self) -> Option<ImageType> {
        sniff::sniff_image(&self.bytes)
    }

    /// Sniffed MIME type, else the extension guess, else `application/octet-stream`.
    pub fn media_type(&self) -> &'static str {
        sniff::resolve_media_type(&self.bytes, self.declared_extension.as_deref())
    }
}

/// One logical document to be created as a page.
#[derive(Debug, Clone)]
pub struct ImportUnit {
    pub name: String,
    pub slug: String,
    pub primary_document: Option<UploadedFile>,
    pub assets: Vec<AssetReference>,
}

/// Outcome of materialising one unit (or ingesting one file).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportResult {
    pub name: String,
    pub slug: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportResult {
    pub fn ok(name: &str, slug: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: slug.to_string(),
            success: true,
            error: None,
        }
    }

    pub fn failed(name: &str, slug: &str, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            slug: slug.to_string(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Full batch outcome returned to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportReport {
    pub results: Vec<ImportResult>,
    pub unmatched_assets: Vec<String>,
}

impl ImportReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Last path component of an uploaded filename. Browsers may send relative
/// paths for directory uploads; only the final name is kept.
pub fn normalize_filename(raw: &str) -> String {
    raw.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(raw)
        .to_string()
}

/// Filename without its final extension.
pub fn base_name(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

/// Lowercased final extension, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_last_extension_only() {
        assert_eq!(base_name("Report.html"), "Report");
        assert_eq!(base_name("archive.tar.gz"), "archive.tar");
        assert_eq!(base_name("README"), "README");
        assert_eq!(base_name(".hidden"), ".hidden");
    }

    #[test]
    fn normalize_filename_keeps_last_component() {
        assert_eq!(normalize_filename("export/site/Report.html"), "Report.html");
        assert_eq!(normalize_filename("C:\\Users\\me\\a.png"), "a.png");
        assert_eq!(normalize_filename("plain.png"), "plain.png");
        assert_eq!(normalize_filename("dir/ Report .html"), " Report .html");
    }

    #[test]
    fn asset_media_type_prefers_content() {
        let file = UploadedFile::new("mislabeled.jpg", vec![0x89, 0x50, 0x4E, 0x47, 0x0D]);
        let asset = AssetReference::from_upload(&file);
        assert_eq!(asset.declared_extension.as_deref(), Some("jpg"));
        assert_eq!(asset.media_type(), "image/png");
    }

    #[test]
    fn report_counts() {
        let report = ImportReport {
            results: vec![
                ImportResult::ok("A", "A"),
                ImportResult::failed("B", "B", "boom"),
            ],
            unmatched_assets: vec![],
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn failed_result_serializes_error() {
        let json = serde_json::to_value(ImportResult::failed("B", "B", "no document")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "no document");
        let ok = serde_json::to_value(ImportResult::ok("A", "A")).unwrap();
        assert!(ok.get("error").is_none());
    }
}
