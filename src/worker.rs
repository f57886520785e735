//! Conversion of one import unit into a stored page via the model service.
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::anthropic::model::{ContentBlock, ImageSource, Message, MessageRequest};
use crate::anthropic::ModelService;
use crate::diagnostics::DiagnosticSink;
use crate::model::{AssetReference, ImportResult, ImportUnit};
use crate::retry::{with_rate_limit_retry, RetryPolicy};
use crate::store::PageStore;

/// Error text for a unit without a primary document.
pub const NO_DOCUMENT: &str = "no document";

/// Route prefix under which stored assets are served.
pub const ASSET_ROUTE: &str = "/api/assets";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const CONVERSION_RULES: &str = "\
Convert the HTML document below into richly styled Markdown.

Rules:
- Order posts in reverse chronological order: newest first.
- Embed every provided image with descriptive alt text, at the position in the text where it is most relevant, using the URL listed for it.
- Use headings, **bold**, tables, > blockquotes, --- horizontal rules and lists wherever they fit the content.
- Drop navigation, scripts, styles and other page chrome.
- Reply with the Markdown only, without code fences or commentary.";

/// Model and request settings shared by every unit in a batch.
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
}

/// Everything a worker needs; cheap to share across units.
#[derive(Clone)]
pub struct Converter {
    pub model: Arc<dyn ModelService>,
    pub store: Arc<dyn PageStore>,
    pub log: Arc<dyn DiagnosticSink>,
    pub settings: ConversionSettings,
}

/// URL at which an asset of `slug` will be served once stored.
pub fn asset_url(slug: &str, filename: &str) -> String {
    let slug_path: Vec<String> = slug
        .split('/')
        .map(|s| utf8_percent_encode(s, PATH_SEGMENT).to_string())
        .collect();
    format!(
        "{}/{}/{}",
        ASSET_ROUTE,
        slug_path.join("/"),
        utf8_percent_encode(filename, PATH_SEGMENT)
    )
}

/// The single text block sent after the image attachments.
pub fn build_prompt(
    slug: &str,
    document: &str,
    assets: &[AssetReference],
    instructions: Option<&str>,
) -> String {
    let mut prompt = String::from(CONVERSION_RULES);

    if let Some(extra) = instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("\n\nAdditional instructions from the user:\n");
        prompt.push_str(extra);
    }

    prompt.push_str("\n\nImages (attached above, in this order):\n");
    if assets.is_empty() {
        prompt.push_str("(none)\n");
    }
    for asset in assets {
        prompt.push_str(&format!("- {}: {}\n", asset.filename, asset_url(slug, &asset.filename)));
    }

    prompt.push_str("\nSource HTML:\n");
    prompt.push_str(document);
    prompt
}

pub fn build_request(
    settings: &ConversionSettings,
    slug: &str,
    document: &str,
    assets: &[AssetReference],
    instructions: Option<&str>,
) -> MessageRequest {
    let mut content: Vec<ContentBlock> = assets
        .iter()
        .map(|asset| ContentBlock::Image {
            source: ImageSource::base64(asset.media_type(), STANDARD.encode(&asset.bytes)),
        })
        .collect();
    content.push(ContentBlock::Text {
        text: build_prompt(slug, document, assets, instructions),
    });

    MessageRequest {
        model: settings.model.clone(),
        max_tokens: settings.max_tokens,
        messages: vec![Message::user(content)],
    }
}

impl Converter {
    /// Convert one unit. Never returns an error: every failure becomes a
    /// failed `ImportResult`.
    #[instrument(skip_all, fields(slug = %unit.slug))]
    pub async fn run(
        &self,
        unit: &ImportUnit,
        index: usize,
        total: usize,
        instructions: Option<&str>,
    ) -> ImportResult {
        let label = format!("[{}/{}] {}", index + 1, total, unit.name);
        if unit.primary_document.is_none() {
            self.log.record(&format!("{} failed: {}", label, NO_DOCUMENT));
            return ImportResult::failed(&unit.name, &unit.slug, NO_DOCUMENT);
        }

        self.log.record(&format!(
            "{} start slug={} assets={}",
            label,
            unit.slug,
            unit.assets.len()
        ));
        match self.convert(unit, &label, instructions).await {
            Ok(()) => {
                self.log.record(&format!("{} success", label));
                info!(index, total, "unit converted");
                ImportResult::ok(&unit.name, &unit.slug)
            }
            Err(err) => {
                let message = format!("{:#}", err);
                self.log.record(&format!("{} failed: {}", label, message));
                warn!(index, total, error = %message, "unit failed");
                ImportResult::failed(&unit.name, &unit.slug, message)
            }
        }
    }

    async fn convert(&self, unit: &ImportUnit, label: &str, instructions: Option<&str>) -> Result<()> {
        let document = unit
            .primary_document
            .as_ref()
            .ok_or_else(|| anyhow!(NO_DOCUMENT))?;
        let html = String::from_utf8_lossy(&document.bytes);

        let request = build_request(&self.settings, &unit.slug, &html, &unit.assets, instructions);

        let started = Instant::now();
        let response = with_rate_limit_retry(&self.settings.retry, label, || {
            self.model.create_message(&request)
        })
        .await
        .context("model conversion failed")?;
        self.log.record(&format!(
            "{} model responded in {} ms stop_reason={}",
            label,
            started.elapsed().as_millis(),
            response.stop_reason.as_deref().unwrap_or("-")
        ));

        let markdown = response.first_text();
        if markdown.is_empty() {
            self.log.record(&format!("{} model returned no text block", label));
        }

        self.store
            .create_page(&unit.slug)
            .await
            .with_context(|| format!("failed to create page {}", unit.slug))?;
        self.store
            .save_page_content(&unit.slug, &markdown)
            .await
            .with_context(|| format!("failed to save content for {}", unit.slug))?;
        for asset in &unit.assets {
            self.store
                .save_asset(&unit.slug, &asset.filename, &asset.bytes)
                .await
                .with_context(|| format!("failed to save asset {}", asset.filename))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UploadedFile;
    use std::time::Duration;

    fn settings() -> ConversionSettings {
        ConversionSettings {
            model: "claude-test".into(),
            max_tokens: 2048,
            retry: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
            },
        }
    }

    fn png(name: &str) -> AssetReference {
        AssetReference::from_upload(&UploadedFile::new(name, vec![0x89, 0x50, 0x4E, 0x47, 1, 2]))
    }

    #[test]
    fn asset_url_encodes_segments() {
        assert_eq!(asset_url("My-Trip", "photo 1.png"), "/api/assets/My-Trip/photo%201.png");
        assert_eq!(asset_url("a/b", "x#y.png"), "/api/assets/a/b/x%23y.png");
    }

    #[test]
    fn prompt_contains_rules_instructions_urls_and_source() {
        let assets = vec![png("Report-1.png")];
        let prompt = build_prompt("Report", "<p>hi</p>", &assets, Some("  keep it short "));
        assert!(prompt.contains("newest first"));
        assert!(prompt.contains("Additional instructions from the user:\nkeep it short"));
        assert!(prompt.contains("- Report-1.png: /api/assets/Report/Report-1.png"));
        assert!(prompt.ends_with("Source HTML:\n<p>hi</p>"));
    }

    #[test]
    fn blank_instructions_are_omitted() {
        let prompt = build_prompt("R", "x", &[], Some("   "));
        assert!(!prompt.contains("Additional instructions"));
        assert!(prompt.contains("(none)"));
    }

    #[test]
    fn request_puts_images_before_text() {
        let assets = vec![png("a.jpg"), png("b.png")];
        let req = build_request(&settings(), "R", "<p/>", &assets, None);
        assert_eq!(req.model, "claude-test");
        assert_eq!(req.max_tokens, 2048);
        let content = &req.messages[0].content;
        assert_eq!(content.len(), 3);
        match &content[0] {
            ContentBlock::Image { source } => {
                // sniffed PNG wins over the .jpg name
                assert_eq!(source.media_type, "image/png");
                assert_eq!(source.data, STANDARD.encode([0x89, 0x50, 0x4E, 0x47, 1, 2]));
            }
            other => panic!("expected image, got {:?}", other),
        }
        assert!(matches!(content[2], ContentBlock::Text { .. }));
    }
}
