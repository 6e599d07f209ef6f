//! Progress-callback trait for translation events.
//!
//! Inject an [`Arc<dyn TranslationProgressCallback>`] via
//! [`crate::config::TranslatorConfigBuilder::progress_callback`] to receive
//! events as a job moves through its stages and, for PDFs and images, through
//! each page.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doctrans::{Stage, TranslationProgressCallback, TranslatorConfig};
//! use std::sync::Arc;
//!
//! struct StderrProgress;
//!
//! impl TranslationProgressCallback for StderrProgress {
//!     fn on_stage_complete(&self, stage: Stage, items: usize) {
//!         eprintln!("{stage}: {items} items");
//!     }
//! }
//!
//! let config = TranslatorConfig::builder()
//!     .progress_callback(Arc::new(StderrProgress))
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Coarse phases of a translation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Enumerating fragments from a container.
    Extract,
    /// Batch translation of extracted fragments.
    Translate,
    /// Writing translations back into the container.
    Reassemble,
    /// Restoring dropped members and translating embedded drawing text.
    Reconcile,
    /// Final containment sweep over the produced container.
    Validate,
    /// Rasterising PDF pages / decoding images.
    Render,
    /// Vision analysis of page images.
    Analyze,
    /// Writing the generated word-processor document.
    Generate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Extract => "extract",
            Stage::Translate => "translate",
            Stage::Reassemble => "reassemble",
            Stage::Reconcile => "reconcile",
            Stage::Validate => "validate",
            Stage::Render => "render",
            Stage::Analyze => "analyze",
            Stage::Generate => "generate",
        };
        f.write_str(s)
    }
}

/// Called by the translation pipeline as it works.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events are emitted from the job's own task, one at a
/// time; implementations still need to be `Send + Sync` so a config can be
/// shared between jobs.
pub trait TranslationProgressCallback: Send + Sync {
    /// Called once the input has been resolved and classified.
    fn on_job_start(&self, input: &Path, family: &str) {
        let _ = (input, family);
    }

    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// `items` is stage specific: fragments translated, members restored,
    /// fixes applied, pages rendered.
    fn on_stage_complete(&self, stage: Stage, items: usize) {
        let _ = (stage, items);
    }

    /// Called just before the vision request is sent for a page (1-indexed).
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page has been analysed and translated.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, blocks: usize) {
        let _ = (page_num, total_pages, blocks);
    }

    /// Called when the vision reply could not be parsed and the page was
    /// degraded to a single paragraph.
    fn on_page_degraded(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called once after the output file has been written.
    fn on_job_complete(&self, output: &Path) {
        let _ = output;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TranslationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TranslatorConfig`].
pub type ProgressCallback = Arc<dyn TranslationProgressCallback>;
