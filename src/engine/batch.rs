//! Batch translation path.
//!
//! ```text
//! texts ──▶ partition (skip / cache / terminology / work set)
//!             │
//!             ▼
//!         adaptive chunks ──▶ one JSON request per chunk
//!             │                   │ malformed / failed
//!             │                   ▼
//!             │           individual translation of unresolved items
//!             ▼
//!         results[i] ↔ texts[i]
//! ```
//!
//! Identical texts share one work item, so a label repeated across a sheet
//! costs one slot in one request.

use super::reply::{clean_translation, parse_batch_reply, BatchReply};
use super::{split_edges, TranslationEngine};
use crate::error::TranslateError;
use crate::language::{contains_non_english, detect_languages, should_skip, Language};
use crate::model::ModelRequest;
use crate::prompts::{batch_user_prompt, translation_system_prompt};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Target characters per batch request.
const CHARS_PER_REQUEST: usize = 10_000;

/// Smallest adaptive chunk, before the configured cap is applied.
const MIN_CHUNK: usize = 5;

/// Chunk size for a work set whose average fragment length is `avg_chars`:
/// `max(5, 10000 / (avg_chars + 1))`, capped at `max_chunk`.
pub fn chunk_size(avg_chars: usize, max_chunk: usize) -> usize {
    (CHARS_PER_REQUEST / (avg_chars + 1))
        .max(MIN_CHUNK)
        .min(max_chunk)
        .max(1)
}

fn rewrap(original: &str, translated: &str) -> String {
    let (lead, _, trail) = split_edges(original);
    format!("{lead}{translated}{trail}")
}

impl TranslationEngine {
    /// Translate many fragments, preserving order and length.
    ///
    /// `result[i]` always corresponds to `texts[i]`, whichever path resolved
    /// it. Items a chunk reply omits, garbles or leaves non-English are
    /// translated individually; when a whole chunk fails its retries, every
    /// unresolved item of that chunk is translated individually. Only a
    /// failure of an individual call propagates.
    pub async fn translate_batch<S: AsRef<str>>(
        &mut self,
        texts: &[S],
        context: Option<&str>,
    ) -> Result<Vec<String>, TranslateError> {
        let mut results: Vec<Option<String>> = vec![None; texts.len()];

        // ── Phase 1: partition ───────────────────────────────────────────
        let mut work: Vec<String> = Vec::new();
        let mut slots: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, text) in texts.iter().enumerate() {
            let text = text.as_ref();
            if should_skip(text) {
                results[i] = Some(text.to_string());
                continue;
            }
            let (_, core, _) = split_edges(text);
            if let Some(hit) = self.session.cached(core).or_else(|| self.session.term(core)) {
                results[i] = Some(rewrap(text, &hit));
                continue;
            }
            slots
                .entry(core.to_string())
                .or_insert_with(|| {
                    work.push(core.to_string());
                    Vec::new()
                })
                .push(i);
        }

        if !work.is_empty() {
            let mut langs = BTreeSet::new();
            for core in &work {
                langs.extend(detect_languages(core));
            }
            self.session.record_languages(&langs);

            // ── Phase 2: adaptive chunking ───────────────────────────────
            let total_chars: usize = work.iter().map(|t| t.chars().count()).sum();
            let size = chunk_size(total_chars / work.len(), self.settings.batch_size);
            info!(
                "batch: {} inputs, {} to translate in chunks of {}",
                texts.len(),
                work.len(),
                size
            );

            // ── Phase 3: per chunk ───────────────────────────────────────
            for chunk in work.chunks(size) {
                let translated = self.translate_chunk(chunk, context, &langs).await?;
                for (core, translation) in chunk.iter().zip(translated) {
                    for &i in slots.get(core).into_iter().flatten() {
                        results[i] = Some(rewrap(texts[i].as_ref(), &translation));
                    }
                }
            }
        }

        Ok(results
            .into_iter()
            .zip(texts)
            .map(|(r, t)| r.unwrap_or_else(|| t.as_ref().to_string()))
            .collect())
    }

    /// One chunk: a single JSON request, then individual fallback for every
    /// slot the reply did not resolve.
    async fn translate_chunk(
        &mut self,
        chunk: &[String],
        context: Option<&str>,
        langs: &BTreeSet<Language>,
    ) -> Result<Vec<String>, TranslateError> {
        let mut out: Vec<Option<String>> = vec![None; chunk.len()];
        let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
        let request = ModelRequest::text(
            translation_system_prompt(langs),
            batch_user_prompt(&refs, context, langs),
            self.settings.temperature,
            self.settings.max_tokens,
        );

        match self.call("translate_batch", &request).await {
            Ok(raw) => match parse_batch_reply(&raw) {
                BatchReply::Items(items) => {
                    for item in items {
                        let Some(local) = item.id.checked_sub(1).filter(|&l| l < chunk.len())
                        else {
                            debug!("batch reply: ignoring out-of-range id {}", item.id);
                            continue;
                        };
                        if out[local].is_some() {
                            continue;
                        }
                        let source = &chunk[local];
                        let cleaned = clean_translation(&item.text, source);
                        let value = if contains_non_english(&cleaned) {
                            debug!("batch item {} still non-English; escalating", item.id);
                            self.translate_single(source, context).await?
                        } else {
                            self.session.remember(source, &cleaned);
                            cleaned
                        };
                        out[local] = Some(value);
                    }
                }
                BatchReply::Malformed { reason } => {
                    warn!(
                        "batch reply malformed ({}); translating {} items individually",
                        reason,
                        chunk.len()
                    );
                }
            },
            Err(e) => {
                warn!(
                    "batch chunk failed ({}); translating {} items individually",
                    e,
                    chunk.len()
                );
            }
        }

        let missing = out.iter().filter(|s| s.is_none()).count();
        if missing > 0 {
            debug!("{} chunk items resolved individually", missing);
        }
        let mut resolved = Vec::with_capacity(chunk.len());
        for (source, slot) in chunk.iter().zip(out) {
            let value = match slot {
                Some(v) => v,
                None => self.translate_single(source, context).await?,
            };
            resolved.push(value);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::ScriptedModel;
    use super::super::{EngineSettings, TranslationEngine};
    use super::*;
    use crate::error::ModelError;
    use crate::retry::RetryPolicy;
    use std::sync::Arc;

    const DICT: &[(&str, &str)] = &[
        ("价格", "Price"),
        ("重量", "Weight"),
        ("型号", "Model"),
        ("颜色", "Color"),
        ("数量", "Quantity"),
    ];

    /// Answers single-item prompts from `DICT`; batch prompts are scripted.
    fn single_from_dict(req: &ModelRequest) -> Result<String, ModelError> {
        let text = req
            .user
            .rsplit("Translate to English:\n\n")
            .next()
            .unwrap_or_default();
        DICT.iter()
            .find(|(src, _)| *src == text)
            .map(|(_, en)| en.to_string())
            .ok_or_else(|| ModelError::Provider(format!("unexpected request: {text}")))
    }

    fn engine(model: &Arc<ScriptedModel>, batch_size: usize) -> TranslationEngine {
        TranslationEngine::new(
            model.clone(),
            EngineSettings {
                batch_size,
                retry: RetryPolicy::immediate(3),
                ..EngineSettings::default()
            },
        )
    }

    #[test]
    fn chunk_size_adapts_to_length() {
        assert_eq!(chunk_size(10, 20), 20);
        assert_eq!(chunk_size(999, 20), 10);
        assert_eq!(chunk_size(5000, 20), 5);
        assert_eq!(chunk_size(5000, 3), 3);
        assert_eq!(chunk_size(0, 0), 1);
    }

    #[tokio::test]
    async fn empty_input() {
        let model = Arc::new(ScriptedModel::new(single_from_dict));
        let mut e = engine(&model, 20);
        let out = e.translate_batch::<&str>(&[], None).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn order_preserved_across_resolution_paths() {
        let model = Arc::new(
            ScriptedModel::new(single_from_dict)
                .then(Ok(r#"[{"id": 1, "text": "Weight"}, {"id": 2, "text": "Model"}]"#)),
        );
        let mut e = engine(&model, 20);
        e.session.remember("价格", "Price");

        let texts = ["ABC-123", "重量", " 价格 ", "型号", "", "重量"];
        let out = e.translate_batch(&texts, Some("Excel document")).await.unwrap();
        assert_eq!(out, vec!["ABC-123", "Weight", " Price ", "Model", "", "Weight"]);
        // One batch request; the duplicate and the cached text cost nothing.
        assert_eq!(model.calls(), 1);
        let requests = model.requests.lock().unwrap();
        assert!(requests[0].user.contains("[1] 重量\n[2] 型号"));
        assert!(requests[0].user.contains("Document context: Excel document"));
    }

    #[tokio::test]
    async fn garbled_item_three_is_retried_individually() {
        let model = Arc::new(ScriptedModel::new(single_from_dict).then(Ok(
            r#"```json
[{"id": 1, "text": "Price"}, {"id": 2, "text": "Weight"}, {"id": 3},
 {"id": 4, "text": "Color"}, {"id": 5, "text": "Quantity"}]
```"#,
        )));
        let mut e = engine(&model, 20);
        let texts = ["价格", "重量", "型号", "颜色", "数量"];
        let out = e.translate_batch(&texts, None).await.unwrap();
        assert_eq!(out, vec!["Price", "Weight", "Model", "Color", "Quantity"]);
        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].user.ends_with("Translate to English:\n\n型号"));
    }

    #[tokio::test]
    async fn malformed_reply_falls_back_for_whole_chunk() {
        let model = Arc::new(ScriptedModel::new(single_from_dict).then(Ok("Sorry, no JSON today")));
        let mut e = engine(&model, 20);
        let out = e.translate_batch(&["价格", "重量"], None).await.unwrap();
        assert_eq!(out, vec!["Price", "Weight"]);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn non_english_batch_item_is_escalated() {
        let model = Arc::new(ScriptedModel::new(single_from_dict).then(Ok(
            r#"[{"id": 1, "text": "Price"}, {"id": 2, "text": "重 Weight"}]"#,
        )));
        let mut e = engine(&model, 20);
        let out = e.translate_batch(&["价格", "重量"], None).await.unwrap();
        assert_eq!(out, vec!["Price", "Weight"]);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn failed_chunk_falls_back_to_individual_calls() {
        let model = Arc::new(
            ScriptedModel::new(single_from_dict)
                .then(Err(ModelError::Provider("503".into())))
                .then(Err(ModelError::Provider("503".into())))
                .then(Err(ModelError::Provider("503".into()))),
        );
        let mut e = engine(&model, 20);
        let out = e.translate_batch(&["价格", "重量"], None).await.unwrap();
        assert_eq!(out, vec!["Price", "Weight"]);
        assert_eq!(model.calls(), 3 + 2);
    }

    #[tokio::test]
    async fn individual_failure_propagates() {
        let model = Arc::new(ScriptedModel::new(|_| {
            Err(ModelError::Provider("down".into()))
        }));
        let mut e = engine(&model, 20);
        let err = e.translate_batch(&["价格"], None).await.unwrap_err();
        assert!(matches!(err, TranslateError::RetriesExhausted { .. }));
    }

    #[tokio::test]
    async fn chunks_respect_batch_size() {
        let model = Arc::new(
            ScriptedModel::new(single_from_dict)
                .then(Ok(r#"[{"id": 1, "text": "Price"}, {"id": 2, "text": "Weight"}]"#))
                .then(Ok(r#"[{"id": 1, "text": "Model"}]"#)),
        );
        let mut e = engine(&model, 2);
        let out = e.translate_batch(&["价格", "重量", "型号"], None).await.unwrap();
        assert_eq!(out, vec!["Price", "Weight", "Model"]);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn batch_results_feed_the_cache() {
        let model = Arc::new(
            ScriptedModel::new(single_from_dict)
                .then(Ok(r#"[{"id": 1, "text": "Price"}]"#)),
        );
        let mut e = engine(&model, 20);
        e.translate_batch(&["价格"], None).await.unwrap();
        assert_eq!(e.translate_single("价格", None).await.unwrap(), "Price");
        assert_eq!(model.calls(), 1);
    }
}
