//! Image format detection from leading magic bytes.
//!
//! Uploaded files are often mislabeled, so the content signature is
//! authoritative and the filename extension only a fallback.
use serde::Serialize;

const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47];
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF: &[u8] = &[0x47, 0x49, 0x46, 0x38];
const RIFF: &[u8] = &[0x52, 0x49, 0x46, 0x46];
const WEBP: &[u8] = &[0x57, 0x45, 0x42, 0x50];

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ImageType {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageType {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
            ImageType::Gif => "image/gif",
            ImageType::Webp => "image/webp",
        }
    }
}

/// Classify `bytes` by signature. Short or unrecognised buffers yield `None`.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageType> {
    if bytes.starts_with(PNG) {
        return Some(ImageType::Png);
    }
    if bytes.starts_with(JPEG) {
        return Some(ImageType::Jpeg);
    }
    if bytes.starts_with(GIF) {
        return Some(ImageType::Gif);
    }
    if bytes.len() >= 12 && bytes.starts_with(RIFF) && &bytes[8..12] == WEBP {
        return Some(ImageType::Webp);
    }
    None
}

/// MIME type guessed from a lowercase extension (no leading dot).
pub fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "md" | "markdown" => Some("text/markdown; charset=utf-8"),
        "txt" => Some("text/plain; charset=utf-8"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// Content signature first, then the extension, then `application/octet-stream`.
pub fn resolve_media_type(bytes: &[u8], declared_extension: Option<&str>) -> &'static str {
    if let Some(kind) = sniff_image(bytes) {
        return kind.mime();
    }
    declared_extension
        .and_then(media_type_for_extension)
        .unwrap_or(OCTET_STREAM)
}
