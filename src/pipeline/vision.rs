//! Vision page analysis: one page image in, one translated
//! [`PageStructure`] out.
//!
//! The model is asked to decompose the page and translate it in the same
//! round-trip. The reply is parsed defensively; an unparseable reply degrades
//! to a single paragraph instead of failing the page. Strings that come back
//! still non-English are sent through the batch engine before the page is
//! handed to the generator.

use crate::engine::reply::parse_page_reply;
use crate::engine::TranslationEngine;
use crate::error::TranslateError;
use crate::language::contains_non_english;
use crate::model::ModelRequest;
use crate::page::PageStructure;
use crate::prompts::{VISION_SYSTEM_PROMPT, VISION_USER_PROMPT};
use edgequake_llm::ImageData;
use std::time::Instant;
use tracing::{debug, warn};

/// Context hint for the residual pass over a vision reply.
pub const CONTEXT: &str = "document page";

/// Result of analysing one page.
#[derive(Debug, Clone)]
pub struct AnalyzedPage {
    pub page: PageStructure,
    /// The vision reply was not a usable JSON object.
    pub degraded: bool,
    /// Strings re-translated by the residual pass.
    pub residual_fixes: usize,
}

/// Analyse and translate one page image.
///
/// The vision call runs under the engine's vision retry policy; exhausting
/// it propagates as [`TranslateError::RetriesExhausted`].
pub async fn analyze_page(
    engine: &mut TranslationEngine,
    image: ImageData,
) -> Result<AnalyzedPage, TranslateError> {
    let start = Instant::now();
    let settings = engine.settings();
    let policy = settings.vision_retry;
    let request = ModelRequest::text(
        VISION_SYSTEM_PROMPT,
        VISION_USER_PROMPT,
        settings.temperature,
        settings.max_tokens,
    )
    .with_image(image);

    let raw = engine.call_with(policy, "vision", &request).await?;
    let reply = parse_page_reply(&raw);
    let degraded = reply.is_fallback();
    if degraded {
        warn!("vision reply was not a page object; keeping it as one paragraph");
    }
    let mut page = reply.into_structure();

    let residual_fixes = translate_residue(engine, &mut page).await?;
    debug!(
        "page analysed in {}ms: {} items, {} residual fixes",
        start.elapsed().as_millis(),
        page.item_count(),
        residual_fixes
    );

    Ok(AnalyzedPage {
        page,
        degraded,
        residual_fixes,
    })
}

/// Batch-translate every string of `page` that still fails the containment
/// check, writing results back in place.
async fn translate_residue(
    engine: &mut TranslationEngine,
    page: &mut PageStructure,
) -> Result<usize, TranslateError> {
    let mut slots = page.texts_mut();
    let pending: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter(|(_, s)| contains_non_english(s))
        .map(|(i, _)| i)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let texts: Vec<String> = pending.iter().map(|&i| slots[i].clone()).collect();
    debug!("residual pass over {} strings", texts.len());
    let translated = engine.translate_batch(&texts, Some(CONTEXT)).await?;
    for (&i, text) in pending.iter().zip(translated) {
        *slots[i] = text;
    }
    Ok(pending.len())
}
