//! # edgequake-doctrans
//!
//! Translate spreadsheets, Word documents, PDFs and images into English with
//! Large Language Models, keeping the layout of the source.
//!
//! ## Why this crate?
//!
//! Translating an office document is not "send the text, get text back".
//! Spreadsheets carry merged regions, rich shared strings, header/footer
//! codes, comments and drawing parts that a naive rewrite silently drops;
//! models answer in the wrong script, wrap replies in prose, or return
//! malformed JSON. This crate decides what needs translating, batches it
//! with a per-job cache and terminology store, checks that every result is
//! really English, and writes each translation back to the exact position it
//! came from. Pages without a text layer (PDFs, images) go through a vision
//! model that returns a structured, already-translated page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input (path / URL) ─▶ classify
//!  │
//!  ├─ spreadsheet  fragments ─▶ batch translate ─▶ write back
//!  │               ─▶ reconcile with original ─▶ validate        ─▶ .xlsx
//!  ├─ word         fragments ─▶ batch translate ─▶ page ─▶ generate ─▶ .docx
//!  ├─ pdf          render ─▶ vision (per page) ─▶ generate          ─▶ .docx
//!  └─ image        decode ─▶ vision ─▶ generate                     ─▶ .docx
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doctrans::{translate_file, TranslatorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = TranslatorConfig::default();
//!     let output = translate_file("报价单.xlsx", &config).await?;
//!     println!("wrote {}", output.output_path.display());
//!     eprintln!("{} model calls, {} cache hits",
//!         output.session.model_calls,
//!         output.session.cache_hits);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doctrans` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-doctrans = { version = "0.1", default-features = false }
//! ```
//!
//! ## What "done" means
//!
//! The hard guarantee is character-set compliance, not translation
//! completeness: every string the crate writes passes
//! [`contains_non_english`] as `false`. Text the model cannot translate ends
//! in a placeholder substitution, counted in
//! [`DocumentStats::forced_fallbacks`] and surfaced as
//! [`DocumentStats::needs_review`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod config;
pub mod docgen;
pub mod engine;
pub mod error;
pub mod extract;
pub mod language;
pub mod model;
pub mod page;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod session;
pub mod translate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{TranslatorConfig, TranslatorConfigBuilder};
pub use engine::{EngineSettings, TranslationEngine};
pub use error::{ModelError, TranslateError};
pub use language::{contains_non_english, force_english, should_skip};
pub use model::{LlmModelClient, ModelClient, ModelRequest};
pub use page::{BlockKind, BlockStyle, FormField, PageStructure, Table, TextBlock};
pub use pipeline::input::FileFamily;
pub use progress::{NoopProgressCallback, ProgressCallback, Stage, TranslationProgressCallback};
pub use retry::RetryPolicy;
pub use session::SessionStats;
pub use translate::{
    translate_file, translate_file_sync, translate_file_to, translate_file_with_client,
    DocumentStats, TranslationOutput,
};
