//! The model-facing seam.
//!
//! Every request the crate sends is a [`ModelRequest`]: one system
//! instruction, one user payload (text, optionally with a page image), a
//! temperature and a token cap. [`ModelClient`] is the only thing the
//! translation engine and the vision analyser know about; [`LlmModelClient`]
//! adapts any `edgequake-llm` provider, and tests substitute a scripted fake.
//!
//! Responses are returned as raw text. Callers treat them as untrusted and
//! parse defensively (see [`crate::engine::reply`]).

use crate::config::{TranslatorConfig, DEFAULT_MODEL};
use crate::error::{ModelError, TranslateError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// One chat-style request.
#[derive(Clone)]
pub struct ModelRequest {
    pub system: String,
    pub user: String,
    /// Page image for vision calls.
    pub image: Option<ImageData>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ModelRequest {
    pub fn text(
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            image: None,
            temperature,
            max_tokens,
        }
    }

    pub fn with_image(mut self, image: ImageData) -> Self {
        self.image = Some(image);
        self
    }
}

/// Anything that can answer a [`ModelRequest`].
///
/// A single call is one attempt; retrying is the caller's business
/// ([`crate::retry::RetryPolicy`]).
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// [`ModelClient`] backed by an `edgequake-llm` provider.
pub struct LlmModelClient {
    provider: Arc<dyn LLMProvider>,
}

impl LlmModelClient {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Resolve the provider described by `config` and wrap it.
    pub fn from_config(config: &TranslatorConfig) -> Result<Self, TranslateError> {
        resolve_provider(config).map(Self::new)
    }
}

#[async_trait]
impl ModelClient for LlmModelClient {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let start = Instant::now();
        let mut messages = vec![ChatMessage::system(request.system.as_str())];
        match &request.image {
            Some(image) => messages.push(ChatMessage::user_with_images(
                request.user.as_str(),
                vec![image.clone()],
            )),
            None => messages.push(ChatMessage::user(request.user.as_str())),
        }

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ModelError::Provider(e.to_string()))?;

        debug!(
            "model call: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(response.content)
    }
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, TranslateError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TranslateError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), API key read from
///    the environment by [`ProviderFactory::create_llm_provider`].
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &TranslatorConfig) -> Result<Arc<dyn LLMProvider>, TranslateError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_name());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", config.model.as_deref().unwrap_or(DEFAULT_MODEL));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TranslateError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
