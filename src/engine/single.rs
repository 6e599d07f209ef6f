//! Single-item translation path.

use super::reply::clean_translation;
use super::{split_edges, TranslationEngine};
use crate::error::TranslateError;
use crate::language::{contains_non_english, detect_languages, force_english, should_skip};
use crate::model::ModelRequest;
use crate::prompts::{
    single_user_prompt, strict_user_prompt, translation_system_prompt, STRICT_SYSTEM_PROMPT,
};
use tracing::{debug, warn};

impl TranslationEngine {
    /// Translate one fragment to English.
    ///
    /// Skip-classified text is returned unchanged and a cached translation is
    /// reused without a model call. Surrounding whitespace is preserved; the
    /// cache is keyed on the trimmed text. The result never contains
    /// non-English characters. A model call that exhausts its retries
    /// propagates as [`TranslateError::RetriesExhausted`].
    pub async fn translate_single(
        &mut self,
        text: &str,
        context: Option<&str>,
    ) -> Result<String, TranslateError> {
        if should_skip(text) {
            return Ok(text.to_string());
        }
        let (lead, core, trail) = split_edges(text);

        let translated = match self.session.cached(core) {
            Some(hit) => hit,
            None => self.translate_uncached(core, context).await?,
        };
        Ok(format!("{lead}{translated}{trail}"))
    }

    /// Model round-trip for a trimmed, non-skipped fragment, then record.
    pub(crate) async fn translate_uncached(
        &mut self,
        core: &str,
        context: Option<&str>,
    ) -> Result<String, TranslateError> {
        let langs = detect_languages(core);
        self.session.record_languages(&langs);

        let request = ModelRequest::text(
            translation_system_prompt(&langs),
            single_user_prompt(core, context),
            self.settings.temperature,
            self.token_budget(core),
        );
        let raw = self.call("translate_single", &request).await?;
        let translated = clean_translation(&raw, core);
        let translated = self.ensure_english(core, translated).await?;

        self.session.remember(core, &translated);
        Ok(translated)
    }

    /// Corrective request, then force-English, for a result that still fails
    /// the containment check. Returns `translated` untouched when it passes.
    pub(crate) async fn ensure_english(
        &mut self,
        source: &str,
        translated: String,
    ) -> Result<String, TranslateError> {
        if !contains_non_english(&translated) {
            return Ok(translated);
        }

        let remaining = detect_languages(&translated);
        debug!(
            "corrective pass for {:?} ({} scripts left)",
            preview(source),
            remaining.len()
        );
        let request = ModelRequest::text(
            STRICT_SYSTEM_PROMPT,
            strict_user_prompt(&translated, &remaining),
            self.settings.strict_temperature,
            self.token_budget(&translated),
        );
        let raw = self.call("corrective", &request).await?;
        let corrected = clean_translation(&raw, &translated);
        if !contains_non_english(&corrected) {
            return Ok(corrected);
        }

        self.session.record_forced();
        warn!(
            "forcing English character set for {:?}; placeholder substitution applied",
            preview(source)
        );
        Ok(force_english(&corrected, self.settings.placeholder))
    }
}

fn preview(text: &str) -> String {
    let mut p: String = text.chars().take(40).collect();
    if text.chars().count() > 40 {
        p.push('…');
    }
    p
}

#[cfg(test)]
mod tests {
    use super::super::testing::ScriptedModel;
    use super::super::{EngineSettings, TranslationEngine};
    use crate::error::{ModelError, TranslateError};
    use crate::language::contains_non_english;
    use crate::retry::RetryPolicy;
    use std::sync::Arc;

    fn settings() -> EngineSettings {
        EngineSettings {
            retry: RetryPolicy::immediate(3),
            ..EngineSettings::default()
        }
    }

    fn engine(model: &Arc<ScriptedModel>) -> TranslationEngine {
        TranslationEngine::new(model.clone(), settings())
    }

    #[tokio::test]
    async fn skipped_text_makes_no_call() {
        let model = Arc::new(ScriptedModel::new(|_| Ok("unused".into())));
        let mut e = engine(&model);
        assert_eq!(e.translate_single("ABC-123", None).await.unwrap(), "ABC-123");
        assert_eq!(e.translate_single("Total", None).await.unwrap(), "Total");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn second_call_is_cache_hit() {
        let model = Arc::new(ScriptedModel::new(|_| Ok("Weight".into())));
        let mut e = engine(&model);
        assert_eq!(e.translate_single("重量", None).await.unwrap(), "Weight");
        assert_eq!(e.translate_single("重量", None).await.unwrap(), "Weight");
        assert_eq!(model.calls(), 1);
        assert_eq!(e.stats().cache_hits, 1);
        assert_eq!(e.stats().model_calls, 1);
    }

    #[tokio::test]
    async fn whitespace_is_preserved_around_translation() {
        let model = Arc::new(ScriptedModel::new(|_| Ok("Translation: Price".into())));
        let mut e = engine(&model);
        assert_eq!(e.translate_single(" 价格\n", None).await.unwrap(), " Price\n");
    }

    #[tokio::test]
    async fn context_reaches_the_prompt() {
        let model = Arc::new(ScriptedModel::new(|_| Ok("Price".into())));
        let mut e = engine(&model);
        e.translate_single("价格", Some("Excel document")).await.unwrap();
        let requests = model.requests.lock().unwrap();
        let req = &requests[0];
        assert!(req.user.starts_with("Context: Excel document"));
        assert!(req.system.contains("CHINESE"));
        assert_eq!(req.max_tokens, 2 * 4 + 100);
    }

    #[tokio::test]
    async fn corrective_pass_fixes_residue() {
        let model = Arc::new(
            ScriptedModel::new(|_| Ok("never".into()))
                .then(Ok("Product 型号"))
                .then(Ok("Product model")),
        );
        let mut e = engine(&model);
        let out = e.translate_single("产品型号", None).await.unwrap();
        assert_eq!(out, "Product model");
        assert_eq!(model.calls(), 2);
        let requests = model.requests.lock().unwrap();
        let strict = &requests[1];
        assert_eq!(strict.temperature, 0.05);
        assert!(strict.user.contains("CHINESE"));
        assert_eq!(e.stats().forced_fallbacks, 0);
    }

    #[tokio::test]
    async fn force_english_is_last_resort() {
        let model = Arc::new(ScriptedModel::new(|_| Ok("重量 10kg".into())));
        let mut e = engine(&model);
        let out = e.translate_single("重量 10kg", None).await.unwrap();
        assert_eq!(out, "?? 10kg");
        assert!(!contains_non_english(&out));
        assert_eq!(e.stats().forced_fallbacks, 1);
    }

    #[tokio::test]
    async fn empty_reply_falls_back_to_source_then_forces() {
        let model = Arc::new(ScriptedModel::new(|_| Ok("Translation:".into())));
        let mut e = engine(&model);
        let out = e.translate_single("名", None).await.unwrap();
        assert_eq!(out, "?");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let model = Arc::new(
            ScriptedModel::new(|_| Ok("Weight".into()))
                .then(Err(ModelError::Provider("503".into())))
                .then(Err(ModelError::Provider("429".into()))),
        );
        let mut e = engine(&model);
        assert_eq!(e.translate_single("重量", None).await.unwrap(), "Weight");
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_propagate() {
        let model = Arc::new(ScriptedModel::new(|_| {
            Err(ModelError::Provider("down".into()))
        }));
        let mut e = engine(&model);
        let err = e.translate_single("重量", None).await.unwrap_err();
        assert!(matches!(err, TranslateError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(model.calls(), 3);
    }
}
