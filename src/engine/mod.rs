//! The translation engine: single-item and batch translation with caching,
//! terminology reuse, containment validation and fallback passes.
//!
//! ## Escalation ladder
//!
//! ```text
//! skip? ─▶ cache/terminology ─▶ model ─▶ clean ─▶ English? ─▶ done
//!                                                    │ no
//!                                                    ▼
//!                                corrective request (strict temperature)
//!                                                    │ still no
//!                                                    ▼
//!                                     force-English substitution
//! ```
//!
//! Every model call goes through [`TranslationEngine::call`], which applies
//! the configured [`RetryPolicy`] and counts the call in the session. The
//! engine owns its [`TranslationSession`]; construct one engine per job.

pub mod batch;
pub mod reply;
pub mod single;

use crate::config::TranslatorConfig;
use crate::error::TranslateError;
use crate::model::{ModelClient, ModelRequest};
use crate::retry::RetryPolicy;
use crate::session::{SessionStats, TranslationSession};
use std::sync::Arc;

/// Engine knobs copied out of [`TranslatorConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub temperature: f32,
    pub strict_temperature: f32,
    pub max_tokens: usize,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub vision_retry: RetryPolicy,
    pub placeholder: char,
}

impl From<&TranslatorConfig> for EngineSettings {
    fn from(c: &TranslatorConfig) -> Self {
        Self {
            temperature: c.temperature,
            strict_temperature: c.strict_temperature,
            max_tokens: c.max_tokens,
            batch_size: c.batch_size.max(1),
            retry: c.text_retry,
            vision_retry: c.vision_retry,
            placeholder: c.placeholder,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&TranslatorConfig::default())
    }
}

/// Translates text fragments to English for one job.
pub struct TranslationEngine {
    client: Arc<dyn ModelClient>,
    settings: EngineSettings,
    session: TranslationSession,
}

impl TranslationEngine {
    pub fn new(client: Arc<dyn ModelClient>, settings: EngineSettings) -> Self {
        Self {
            client,
            settings,
            session: TranslationSession::new(),
        }
    }

    pub fn from_config(client: Arc<dyn ModelClient>, config: &TranslatorConfig) -> Self {
        Self::new(client, EngineSettings::from(config))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn session(&self) -> &TranslationSession {
        &self.session
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    /// Completion budget for translating `text`: four tokens per character
    /// plus slack, capped at the configured maximum.
    fn token_budget(&self, text: &str) -> usize {
        (text.chars().count() * 4 + 100).min(self.settings.max_tokens)
    }

    /// Send one text request under the text retry policy.
    pub(crate) async fn call(
        &mut self,
        call_site: &str,
        request: &ModelRequest,
    ) -> Result<String, TranslateError> {
        let policy = self.settings.retry;
        self.call_with(policy, call_site, request).await
    }

    pub(crate) async fn call_with(
        &mut self,
        policy: RetryPolicy,
        call_site: &str,
        request: &ModelRequest,
    ) -> Result<String, TranslateError> {
        self.session.record_model_call();
        let client = &self.client;
        policy.run(call_site, || client.complete(request)).await
    }
}

/// Split `text` into leading whitespace, core, trailing whitespace.
pub(crate) fn split_edges(text: &str) -> (&str, &str, &str) {
    let core_start = text.len() - text.trim_start().len();
    let core_end = text.trim_end().len();
    if core_start >= core_end {
        return (text, "", "");
    }
    (&text[..core_start], &text[core_start..core_end], &text[core_end..])
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted model for engine tests.

    use crate::error::ModelError;
    use crate::model::{ModelClient, ModelRequest};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies are popped in order; when the script runs out, `default`
    /// answers. Every request is recorded.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, ModelError>>>,
        default: Box<dyn Fn(&ModelRequest) -> Result<String, ModelError> + Send + Sync>,
        pub requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedModel {
        pub fn new(
            default: impl Fn(&ModelRequest) -> Result<String, ModelError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                default: Box::new(default),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn then(self, reply: Result<&str, ModelError>) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(reply.map(str::to_string));
            self
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    /// Item texts of a batch prompt, in order.
    pub fn batch_items(user: &str) -> Vec<&str> {
        user.split_once("Items to translate:\n")
            .map(|(_, list)| {
                list.lines()
                    .filter_map(|l| l.split_once("] ").map(|(_, t)| t))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A model that answers batch and single prompts from a fixed table and
    /// echoes anything it does not know.
    pub fn dictionary(
        entries: &'static [(&'static str, &'static str)],
    ) -> impl Fn(&ModelRequest) -> Result<String, ModelError> + Send + Sync + 'static {
        move |req| {
            let lookup = |text: &str| {
                entries
                    .iter()
                    .find(|(src, _)| *src == text)
                    .map_or_else(|| text.to_string(), |(_, en)| en.to_string())
            };
            if req.user.contains("Items to translate:\n") {
                let items: Vec<serde_json::Value> = batch_items(&req.user)
                    .into_iter()
                    .enumerate()
                    .map(|(i, t)| serde_json::json!({"id": i + 1, "text": lookup(t)}))
                    .collect();
                Ok(serde_json::Value::Array(items).to_string())
            } else {
                let text = req
                    .user
                    .rsplit("Translate to English:\n\n")
                    .next()
                    .unwrap_or_default();
                Ok(lookup(text))
            }
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
            self.requests.lock().unwrap().push(request.clone());
            let scripted = self.replies.lock().unwrap().pop_front();
            match scripted {
                Some(reply) => reply,
                None => (self.default)(request),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_edges_keeps_whitespace() {
        assert_eq!(split_edges("  重量 \n"), ("  ", "重量", " \n"));
        assert_eq!(split_edges("abc"), ("", "abc", ""));
        assert_eq!(split_edges("   "), ("   ", "", ""));
    }

    #[test]
    fn settings_follow_config() {
        let config = TranslatorConfig::builder().batch_size(7).build().unwrap();
        let s = EngineSettings::from(&config);
        assert_eq!(s.batch_size, 7);
        assert_eq!(s.strict_temperature, 0.05);
        assert_eq!(s.retry, RetryPolicy::text());
        assert_eq!(s.vision_retry, RetryPolicy::vision());
    }
}
