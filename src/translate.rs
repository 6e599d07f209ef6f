//! Translation entry points: one call per input file.
//!
//! ## Flow per family
//!
//! ```text
//! spreadsheet ─▶ extract ─▶ translate ─▶ reassemble ─▶ reconcile ─▶ validate
//! word        ─▶ extract ─▶ translate ─▶ generate
//! pdf         ─▶ render  ─▶ analyze (per page) ─▶ generate
//! image       ─▶ decode  ─▶ analyze ─▶ generate
//! ```
//!
//! Every job owns one [`TranslationEngine`], so cache and terminology are
//! shared across all fragments, pages and passes of that job and nothing
//! else. Model calls are made one at a time.

use crate::archive::{self, ReconcileReport, ValidationReport};
use crate::config::TranslatorConfig;
use crate::docgen::DocxGenerator;
use crate::engine::TranslationEngine;
use crate::error::TranslateError;
use crate::extract::{translate_document, SpreadsheetCounters, SpreadsheetDocument, WordDocument};
use crate::model::{LlmModelClient, ModelClient};
use crate::page::PageStructure;
use crate::pipeline::encode::{encode_image_file, encode_page};
use crate::pipeline::input::{default_output_path, is_url, resolve_input, FileFamily, ResolvedInput};
use crate::pipeline::render::render_pages;
use crate::pipeline::vision::analyze_page;
use crate::progress::{ProgressCallback, Stage};
use crate::session::SessionStats;
use edgequake_llm::ImageData;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Per-document counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentStats {
    /// Fragments enumerated for translation (container families).
    pub fragments: usize,
    /// Positions rewritten in the container.
    pub positions_written: usize,
    /// Spreadsheet breakdown of `positions_written`.
    pub spreadsheet: Option<SpreadsheetCounters>,
    /// Members restored from the original container by reconciliation.
    pub restored_members: usize,
    /// Drawing/chart/VML text runs translated by reconciliation.
    pub drawing_runs: usize,
    /// Runs rewritten by the validation pass.
    pub validation_fixes: usize,
    /// Set when validation stopped early.
    pub validation_error: Option<String>,
    /// Pages whose vision reply had to be degraded to one paragraph.
    pub degraded_pages: usize,
    /// Strings the residual pass re-translated after vision.
    pub residual_fixes: usize,
    /// Items that ended in the force-English substitution.
    pub forced_fallbacks: u64,
    /// The forced share exceeded the configured review threshold.
    pub needs_review: bool,
}

/// Result of one translation job.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationOutput {
    pub output_path: PathBuf,
    pub family: FileFamily,
    /// Sheets for spreadsheets, rendered pages otherwise.
    pub pages: usize,
    pub document: DocumentStats,
    pub session: SessionStats,
    pub duration_ms: u64,
}

/// Translate a file or URL to English, writing next to the input
/// (`<stem><suffix>.<xlsx|docx>`).
pub async fn translate_file(
    input: &str,
    config: &TranslatorConfig,
) -> Result<TranslationOutput, TranslateError> {
    precheck(input)?;
    let client: Arc<dyn ModelClient> = Arc::new(LlmModelClient::from_config(config)?);
    translate_file_with_client(input, None, client, config).await
}

/// Translate a file or URL to English, writing to `output`.
pub async fn translate_file_to(
    input: &str,
    output: &Path,
    config: &TranslatorConfig,
) -> Result<TranslationOutput, TranslateError> {
    precheck(input)?;
    let client: Arc<dyn ModelClient> = Arc::new(LlmModelClient::from_config(config)?);
    translate_file_with_client(input, Some(output), client, config).await
}

/// Synchronous wrapper around [`translate_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn translate_file_sync(
    input: &str,
    config: &TranslatorConfig,
) -> Result<TranslationOutput, TranslateError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TranslateError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(translate_file(input, config))
}

/// Translate with an explicit model client. `output` defaults to
/// [`default_output_path`]; for URL inputs the default lands in the current
/// directory.
///
/// Fails before any model call when the input is missing or its extension
/// is not supported.
pub async fn translate_file_with_client(
    input: &str,
    output: Option<&Path>,
    client: Arc<dyn ModelClient>,
    config: &TranslatorConfig,
) -> Result<TranslationOutput, TranslateError> {
    let start = Instant::now();
    let resolved = resolve_input(input, config.download_timeout_secs).await?;
    let input_path = resolved.path().to_path_buf();
    let family = FileFamily::classify(&input_path)?;
    let output_path = match output {
        Some(p) => p.to_path_buf(),
        None => default_output(&resolved, family, &config.output_suffix),
    };
    info!(
        "Translating {} ({}) → {}",
        input_path.display(),
        family,
        output_path.display()
    );

    let job = Job {
        engine: TranslationEngine::from_config(client, config),
        config,
        progress: config.progress_callback.clone(),
        stats: DocumentStats::default(),
    };
    job.notify(|cb| cb.on_job_start(&input_path, family.as_str()));

    let (engine, mut stats, pages) = match family {
        FileFamily::Spreadsheet => job.spreadsheet(&input_path, &output_path).await?,
        FileFamily::WordProcessor => job.word(&input_path, &output_path).await?,
        FileFamily::Pdf => job.pdf(&input_path, &output_path).await?,
        FileFamily::Image => job.image(&input_path, &output_path).await?,
    };

    let session = engine.stats();
    stats.forced_fallbacks = session.forced_fallbacks;
    stats.needs_review = needs_review(&session, config.review_threshold);
    if stats.needs_review {
        warn!(
            "{} of {} translations fell back to placeholder substitution; {} needs review",
            session.forced_fallbacks,
            session.translations,
            output_path.display()
        );
    }

    if let Some(cb) = &config.progress_callback {
        cb.on_job_complete(&output_path);
    }
    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Translation complete: {} model calls, {} cache hits, {}ms",
        session.model_calls, session.cache_hits, duration_ms
    );

    Ok(TranslationOutput {
        output_path,
        family,
        pages,
        document: stats,
        session,
        duration_ms,
    })
}

/// Local inputs are checked before a provider is resolved, so a missing or
/// unsupported file fails without needing credentials.
fn precheck(input: &str) -> Result<(), TranslateError> {
    if is_url(input) {
        return Ok(());
    }
    let path = Path::new(input);
    if !path.is_file() {
        return Err(TranslateError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    FileFamily::classify(path).map(|_| ())
}

/// Whether the share of forced items exceeds `threshold`.
pub fn needs_review(session: &SessionStats, threshold: f64) -> bool {
    if session.forced_fallbacks == 0 {
        return false;
    }
    let share = session.forced_fallbacks as f64 / session.translations.max(1) as f64;
    share > threshold
}

fn default_output(resolved: &ResolvedInput, family: FileFamily, suffix: &str) -> PathBuf {
    let path = resolved.path();
    if resolved.is_download() {
        let name = path.file_name().map(PathBuf::from).unwrap_or_default();
        default_output_path(&name, family, suffix)
    } else {
        default_output_path(path, family, suffix)
    }
}

/// Legacy binary formats carry no zip container.
fn reject_legacy(path: &Path, legacy: &str) -> Result<(), TranslateError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if ext.eq_ignore_ascii_case(legacy) {
        return Err(TranslateError::InvalidDocument {
            path: path.to_path_buf(),
            detail: format!("legacy binary .{legacy} is not supported; save it as .{legacy}x"),
        });
    }
    Ok(())
}

struct Job<'a> {
    engine: TranslationEngine,
    config: &'a TranslatorConfig,
    progress: Option<ProgressCallback>,
    stats: DocumentStats,
}

type JobResult = Result<(TranslationEngine, DocumentStats, usize), TranslateError>;

impl Job<'_> {
    fn notify(&self, f: impl FnOnce(&ProgressCallback)) {
        if let Some(cb) = &self.progress {
            f(cb);
        }
    }

    fn finish(&self, stage: Stage, items: usize) {
        self.notify(|cb| cb.on_stage_complete(stage, items));
    }

    async fn spreadsheet(mut self, input: &Path, output: &Path) -> JobResult {
        reject_legacy(input, "xls")?;

        self.notify(|cb| cb.on_stage_start(Stage::Extract));
        let mut doc = SpreadsheetDocument::open(input)?;
        let sheets = doc.sheet_names().len();
        info!("Workbook has {} sheets", sheets);

        self.notify(|cb| cb.on_stage_start(Stage::Translate));
        let (fragments, written) = translate_document(&mut doc, &mut self.engine).await?;
        self.stats.fragments = fragments;
        self.stats.positions_written = written;
        self.stats.spreadsheet = Some(doc.counters());
        self.finish(Stage::Translate, fragments);

        self.notify(|cb| cb.on_stage_start(Stage::Reassemble));
        doc.save(output)?;
        self.finish(Stage::Reassemble, written);

        self.notify(|cb| cb.on_stage_start(Stage::Reconcile));
        let ReconcileReport {
            restored_members,
            translated_runs,
            ..
        } = archive::reconcile(input, output, &mut self.engine).await?;
        self.stats.restored_members = restored_members;
        self.stats.drawing_runs = translated_runs;
        self.finish(Stage::Reconcile, restored_members + translated_runs);

        self.notify(|cb| cb.on_stage_start(Stage::Validate));
        let ValidationReport { fixes, error, .. } = archive::validate(output, &mut self.engine).await;
        self.stats.validation_fixes = fixes;
        self.stats.validation_error = error;
        self.finish(Stage::Validate, fixes);

        Ok((self.engine, self.stats, sheets))
    }

    async fn word(mut self, input: &Path, output: &Path) -> JobResult {
        reject_legacy(input, "doc")?;

        self.notify(|cb| cb.on_stage_start(Stage::Extract));
        let mut doc = WordDocument::open(input)?;

        self.notify(|cb| cb.on_stage_start(Stage::Translate));
        let (fragments, written) = translate_document(&mut doc, &mut self.engine).await?;
        self.stats.fragments = fragments;
        self.stats.positions_written = written;
        self.finish(Stage::Translate, fragments);

        let pages = [doc.into_page()];
        self.generate(input, output, &pages)?;
        Ok((self.engine, self.stats, 1))
    }

    async fn pdf(mut self, input: &Path, output: &Path) -> JobResult {
        self.notify(|cb| cb.on_stage_start(Stage::Render));
        let rendered = render_pages(
            input,
            self.config.dpi,
            self.config.max_rendered_pixels,
            self.config.password.as_deref(),
        )
        .await?;
        let total = rendered.len();
        self.finish(Stage::Render, total);

        self.notify(|cb| cb.on_stage_start(Stage::Analyze));
        let mut pages = Vec::with_capacity(total);
        for (idx, image) in rendered.iter().enumerate() {
            let data = encode_page(image).map_err(|e| TranslateError::RasterisationFailed {
                page: idx + 1,
                detail: format!("Image encoding failed: {}", e),
            })?;
            pages.push(self.analyze(data, idx + 1, total).await?);
        }
        self.finish(Stage::Analyze, total);

        self.generate(input, output, &pages)?;
        Ok((self.engine, self.stats, total))
    }

    async fn image(mut self, input: &Path, output: &Path) -> JobResult {
        self.notify(|cb| cb.on_stage_start(Stage::Render));
        let data = encode_image_file(input).await?;
        self.finish(Stage::Render, 1);

        self.notify(|cb| cb.on_stage_start(Stage::Analyze));
        let page = self.analyze(data, 1, 1).await?;
        self.finish(Stage::Analyze, 1);

        self.generate(input, output, &[page])?;
        Ok((self.engine, self.stats, 1))
    }

    async fn analyze(
        &mut self,
        image: ImageData,
        page_num: usize,
        total: usize,
    ) -> Result<PageStructure, TranslateError> {
        self.notify(|cb| cb.on_page_start(page_num, total));
        let analyzed = analyze_page(&mut self.engine, image).await?;
        if analyzed.degraded {
            self.stats.degraded_pages += 1;
            self.notify(|cb| cb.on_page_degraded(page_num, total));
        }
        self.stats.residual_fixes += analyzed.residual_fixes;
        let items = analyzed.page.item_count();
        info!("Page {}/{}: {} items", page_num, total, items);
        self.notify(|cb| cb.on_page_complete(page_num, total, items));
        Ok(analyzed.page)
    }

    fn generate(&self, input: &Path, output: &Path, pages: &[PageStructure]) -> Result<(), TranslateError> {
        self.notify(|cb| cb.on_stage_start(Stage::Generate));
        DocxGenerator::new(input).write(pages, output)?;
        self.finish(Stage::Generate, pages.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(translations: u64, forced: u64) -> SessionStats {
        SessionStats {
            translations,
            forced_fallbacks: forced,
            ..SessionStats::default()
        }
    }

    #[test]
    fn review_threshold() {
        assert!(!needs_review(&stats(10, 0), 0.0));
        assert!(needs_review(&stats(10, 1), 0.0));
        assert!(!needs_review(&stats(10, 1), 0.2));
        assert!(needs_review(&stats(10, 3), 0.2));
    }

    #[test]
    fn precheck_needs_no_provider() {
        assert!(matches!(
            precheck("/definitely/not/here.xlsx"),
            Err(TranslateError::FileNotFound { .. })
        ));
        let dir = tempfile::TempDir::new().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "hi").unwrap();
        assert!(matches!(
            precheck(notes.to_str().unwrap()),
            Err(TranslateError::UnsupportedFormat { .. })
        ));
        assert!(precheck("https://example.com/a.pdf").is_ok());
    }

    #[test]
    fn legacy_formats_are_rejected() {
        assert!(matches!(
            reject_legacy(Path::new("old.XLS"), "xls"),
            Err(TranslateError::InvalidDocument { .. })
        ));
        assert!(reject_legacy(Path::new("new.xlsx"), "xls").is_ok());
    }

    #[test]
    fn local_inputs_default_next_to_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"x").unwrap();
        let local = ResolvedInput::Local(path.clone());
        assert_eq!(
            default_output(&local, FileFamily::Image, "_en"),
            dir.path().join("scan_en.docx")
        );
    }
}
