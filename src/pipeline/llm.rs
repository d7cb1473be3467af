//! LLM-backed relevance model and provider resolution.
//!
//! [`LlmRelevanceModel`] adapts any `edgequake_llm` provider to the
//! [`RelevanceModel`] seam used by the ranker. It is deliberately thin:
//! prompts live in [`crate::prompts`], retries and parsing in
//! [`crate::pipeline::rank`].

use crate::config::LensConfig;
use crate::error::LensError;
use crate::pipeline::rank::RelevanceModel;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// A chat-completion provider used as a [`RelevanceModel`].
pub struct LlmRelevanceModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmRelevanceModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &LensConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve a provider from `config` and wrap it.
    pub fn from_config(config: &LensConfig) -> Result<Self, LensError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

impl RelevanceModel for LlmRelevanceModel {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> BoxFuture<'a, Result<String, String>> {
        Box::pin(async move {
            let start = Instant::now();
            let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
            let response = self
                .provider
                .chat(&messages, Some(&self.options))
                .await
                .map_err(|e| e.to_string())?;
            debug!(
                "Ranking call: {} input tokens, {} output tokens, {:?}",
                response.prompt_tokens,
                response.completion_tokens,
                start.elapsed()
            );
            Ok(response.content)
        })
    }
}

fn build_options(config: &LensConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, LensError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        LensError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built `config.provider`;
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`]);
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are non-empty;
/// 4. OpenAI when `OPENAI_API_KEY` is set;
/// 5. whatever [`ProviderFactory::from_env`] detects.
pub fn resolve_provider(config: &LensConfig) -> Result<Arc<dyn LLMProvider>, LensError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
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
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| LensError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_config() {
        let config = LensConfig::builder()
            .temperature(0.5)
            .max_tokens(1024)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.5));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn default_options_are_low_temperature() {
        let opts = build_options(&LensConfig::default());
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(2048));
    }
}
