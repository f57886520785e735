//! Direct single-file ingestion (no model call): CSV tables, PDF text and
//! plain markdown/text become pages.
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::grouping::slugify;
use crate::model::{base_name, extension_of, ImportResult, UploadedFile};
use crate::store::{PageStore, StoreError};
use crate::tabular::csv_to_markdown;

static BLANK_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*){2,}").expect("valid blank-line regex"));

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestKind {
    Csv,
    Pdf,
    Markdown,
}

pub fn ingest_kind(filename: &str) -> Option<IngestKind> {
    match extension_of(filename)?.as_str() {
        "csv" => Some(IngestKind::Csv),
        "pdf" => Some(IngestKind::Pdf),
        "md" | "markdown" | "txt" => Some(IngestKind::Markdown),
        _ => None,
    }
}

/// Collapse three or more consecutive blank lines into one blank line.
pub fn tidy_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n");
    BLANK_RUNS.replace_all(unified.trim(), "\n\n").into_owned()
}

async fn extract_pdf_text(bytes: Vec<u8>) -> Result<String, IngestError> {
    let joined = tokio::task::spawn_blocking(move || {
        // pdf-extract panics on some malformed fonts
        std::panic::catch_unwind(|| {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| e.to_string())
        })
    })
    .await
    .map_err(|e| IngestError::Pdf(e.to_string()))?;
    match joined {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(IngestError::Pdf(err)),
        Err(_) => Err(IngestError::Pdf("extractor panicked on malformed input".into())),
    }
}

/// Render the page body for one file.
pub async fn render_page(file: &UploadedFile) -> Result<String, IngestError> {
    let name = base_name(&file.filename);
    match ingest_kind(&file.filename) {
        Some(IngestKind::Csv) => {
            let text = String::from_utf8_lossy(&file.bytes);
            Ok(format!("# {}\n\n{}", name, csv_to_markdown(&text)))
        }
        Some(IngestKind::Pdf) => {
            let text = extract_pdf_text(file.bytes.to_vec()).await?;
            Ok(format!("# {}\n\n{}\n", name, tidy_text(&text)))
        }
        Some(IngestKind::Markdown) => Ok(String::from_utf8_lossy(&file.bytes).into_owned()),
        None => Err(IngestError::Unsupported(file.filename.clone())),
    }
}

/// Create one page from `file`; returns its slug.
#[instrument(skip_all, fields(filename = %file.filename))]
pub async fn ingest_file(store: &dyn PageStore, file: &UploadedFile) -> Result<String, IngestError> {
    let slug = slugify(base_name(&file.filename));
    let content = render_page(file).await?;
    store.create_page(&slug).await?;
    store.save_page_content(&slug, &content).await?;
    info!(%slug, bytes = content.len(), "file ingested");
    Ok(slug)
}

/// Ingest each file independently; one result per file, in input order.
pub async fn ingest_files(store: &dyn PageStore, files: &[UploadedFile]) -> Vec<ImportResult> {
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let name = base_name(&file.filename).to_string();
        let result = match ingest_file(store, file).await {
            Ok(slug) => ImportResult::ok(&name, &slug),
            Err(err) => {
                warn!(filename = %file.filename, %err, "ingest failed");
                ImportResult::failed(&name, &slugify(&name), err.to_string())
            }
        };
        results.push(result);
    }
    results
}
