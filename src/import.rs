//! Import orchestration: group uploads, convert units with bounded
//! concurrency, and report one result per unit.
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::anthropic::{AnthropicClient, ModelService};
use crate::config::Config;
use crate::diagnostics::{DiagnosticSink, FileSink, NullSink};
use crate::grouping::group_files;
use crate::model::{ImportReport, ImportResult, UploadedFile};
use crate::scheduler::run_indexed;
use crate::store::PageStore;
use crate::worker::{ConversionSettings, Converter};

/// Batch-level rejections, detected before any unit is processed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("no files were uploaded")]
    NoFiles,
    #[error("model API key is not configured")]
    MissingCredential,
}

pub struct Importer {
    model: Option<Arc<dyn ModelService>>,
    store: Arc<dyn PageStore>,
    log: Arc<dyn DiagnosticSink>,
    settings: ConversionSettings,
    concurrency: usize,
}

impl Importer {
    /// `model` is `None` when no API key is configured; imports are then
    /// rejected with `ImportError::MissingCredential`.
    pub fn new(
        model: Option<Arc<dyn ModelService>>,
        store: Arc<dyn PageStore>,
        log: Arc<dyn DiagnosticSink>,
        settings: ConversionSettings,
        concurrency: usize,
    ) -> Self {
        Self {
            model,
            store,
            log,
            settings,
            concurrency: concurrency.max(1),
        }
    }

    /// Wire the importer from configuration: the Anthropic client when a key
    /// is available and the diagnostic file sink when `app.log_file` is set.
    pub fn from_config(cfg: &Config, store: Arc<dyn PageStore>) -> anyhow::Result<Self> {
        let model = match cfg.api_key() {
            Some(key) => {
                let client = AnthropicClient::new(key, cfg.anthropic.version.clone())?;
                Some(Arc::new(client) as Arc<dyn ModelService>)
            }
            None => {
                warn!("no model API key configured; imports will be rejected");
                None
            }
        };
        let log: Arc<dyn DiagnosticSink> = match cfg.app.resolved_log_file() {
            Some(path) => Arc::new(FileSink::new(path)),
            None => Arc::new(NullSink),
        };
        let settings = ConversionSettings {
            model: cfg.anthropic.model.clone(),
            max_tokens: cfg.anthropic.max_tokens,
            retry: cfg.retry_policy(),
        };
        Ok(Self::new(model, store, log, settings, cfg.app.concurrency))
    }

    #[instrument(skip_all, fields(files = files.len()))]
    pub async fn import(
        &self,
        files: Vec<UploadedFile>,
        instructions: Option<&str>,
    ) -> Result<ImportReport, ImportError> {
        if files.is_empty() {
            return Err(ImportError::NoFiles);
        }
        let model = self.model.clone().ok_or(ImportError::MissingCredential)?;

        let batch = Uuid::new_v4();
        let started = Instant::now();
        let grouping = group_files(&files);
        self.log.record(&format!(
            "batch {} received {} files: {} units, {} unmatched assets",
            batch,
            files.len(),
            grouping.units.len(),
            grouping.unmatched_assets.len()
        ));
        for unit in &grouping.units {
            let names: Vec<&str> = unit.assets.iter().map(|a| a.filename.as_str()).collect();
            self.log.record(&format!(
                "batch {} unit {} <- [{}]",
                batch,
                unit.slug,
                names.join(", ")
            ));
        }
        if !grouping.unmatched_assets.is_empty() {
            self.log.record(&format!(
                "batch {} unmatched: {}",
                batch,
                grouping.unmatched_assets.join(", ")
            ));
        }

        let converter = Converter {
            model,
            store: self.store.clone(),
            log: self.log.clone(),
            settings: self.settings.clone(),
        };
        let units = &grouping.units;
        let total = units.len();
        let converter = &converter;

        let results = run_indexed(total, self.concurrency, |index| async move {
            let unit = &units[index];
            match AssertUnwindSafe(converter.run(unit, index, total, instructions))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(slug = %unit.slug, %message, "unit conversion panicked");
                    self.log
                        .record(&format!("batch {} unit {} panicked: {}", batch, unit.slug, message));
                    ImportResult::failed(&unit.name, &unit.slug, message)
                }
            }
        })
        .await;

        let report = ImportReport {
            results,
            unmatched_assets: grouping.unmatched_assets.clone(),
        };
        let elapsed = started.elapsed();
        self.log.record(&format!(
            "batch {} finished in {} ms: {} succeeded, {} failed",
            batch,
            elapsed.as_millis(),
            report.succeeded(),
            report.failed()
        ));
        info!(
            %batch,
            units = total,
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = elapsed.as_millis() as u64,
            "import finished"
        );
        Ok(report)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("conversion panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("conversion panicked: {}", s)
    } else {
        "conversion panicked".to_string()
    }
}
