//! Configuration types for document translation.
//!
//! All translation behaviour is controlled through [`TranslatorConfig`], built
//! via its [`TranslatorConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share a config between jobs and to log exactly which
//! settings produced an output.

use crate::error::TranslateError;
use crate::language::is_english_safe;
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Model used for both text and vision calls when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for one translation job.
///
/// Built via [`TranslatorConfig::builder()`] or using
/// [`TranslatorConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_doctrans::TranslatorConfig;
///
/// let config = TranslatorConfig::builder()
///     .model("gpt-4o-mini")
///     .batch_size(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.batch_size, 10);
/// ```
#[derive(Clone)]
pub struct TranslatorConfig {
    /// LLM model identifier, e.g. "gpt-4o". If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for translation and vision calls. Default: 0.1.
    pub temperature: f32,

    /// Temperature for the corrective "still not English" request. Default: 0.05.
    pub strict_temperature: f32,

    /// Upper bound on completion tokens for any single call. Default: 16384.
    ///
    /// Single-item calls ask for `min(4 * chars + 100, max_tokens)`.
    pub max_tokens: usize,

    /// Largest number of fragments in one batch request. Default: 20.
    ///
    /// The effective chunk size shrinks as fragments get longer, see
    /// [`crate::engine::batch::chunk_size`].
    pub batch_size: usize,

    /// Rendering DPI for PDF pages. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 3000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Retry policy for text translation calls. Default: 3 attempts, 1 s → 20 s.
    pub text_retry: RetryPolicy,

    /// Retry policy for vision calls. Default: 3 attempts, 2 s → 30 s.
    pub vision_retry: RetryPolicy,

    /// Character substituted by the force-English fallback. Default: `?`.
    pub placeholder: char,

    /// Share of force-English fallbacks (0.0–1.0) among translated fragments
    /// above which the output is flagged `needs_review`. Default: 0.0, i.e.
    /// any placeholder substitution flags the document.
    pub review_threshold: f64,

    /// Suffix appended to the input stem for the default output path.
    /// Default: `_en_translated`.
    pub output_suffix: String,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional stage/page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            strict_temperature: 0.05,
            max_tokens: 16384,
            batch_size: 20,
            dpi: 300,
            max_rendered_pixels: 3000,
            password: None,
            text_retry: RetryPolicy::text(),
            vision_retry: RetryPolicy::vision(),
            placeholder: '?',
            review_threshold: 0.0,
            output_suffix: "_en_translated".to_string(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TranslatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("strict_temperature", &self.strict_temperature)
            .field("max_tokens", &self.max_tokens)
            .field("batch_size", &self.batch_size)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("text_retry", &self.text_retry)
            .field("vision_retry", &self.vision_retry)
            .field("placeholder", &self.placeholder)
            .field("review_threshold", &self.review_threshold)
            .field("output_suffix", &self.output_suffix)
            .finish()
    }
}

impl TranslatorConfig {
    /// Create a new builder for `TranslatorConfig`.
    pub fn builder() -> TranslatorConfigBuilder {
        TranslatorConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model name that will actually be requested.
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`TranslatorConfig`].
pub struct TranslatorConfigBuilder {
    config: TranslatorConfig,
}

impl fmt::Debug for TranslatorConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl TranslatorConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn strict_temperature(mut self, t: f32) -> Self {
        self.config.strict_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn text_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.text_retry = policy;
        self
    }

    pub fn vision_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.vision_retry = policy;
        self
    }

    pub fn placeholder(mut self, c: char) -> Self {
        self.config.placeholder = c;
        self
    }

    pub fn review_threshold(mut self, share: f64) -> Self {
        self.config.review_threshold = share;
        self
    }

    pub fn output_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.output_suffix = suffix.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TranslatorConfig, TranslateError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(TranslateError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.batch_size == 0 {
            return Err(TranslateError::InvalidConfig(
                "Batch size must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(TranslateError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.text_retry.max_attempts == 0 || c.vision_retry.max_attempts == 0 {
            return Err(TranslateError::InvalidConfig(
                "Retry policies need at least one attempt".into(),
            ));
        }
        if !is_english_safe(c.placeholder) {
            return Err(TranslateError::InvalidConfig(format!(
                "Placeholder {:?} is not itself English-safe",
                c.placeholder
            )));
        }
        if !(0.0..=1.0).contains(&c.review_threshold) {
            return Err(TranslateError::InvalidConfig(format!(
                "Review threshold must be within 0.0–1.0, got {}",
                c.review_threshold
            )));
        }
        if c.output_suffix.is_empty() {
            return Err(TranslateError::InvalidConfig(
                "Output suffix must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
