//! Query → prompt → model → JSON → validated [`SearchParams`].

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::{ConfigError, NlqConfig};
use crate::error::NlqError;
use crate::extract::{extract_json, truncate};
use crate::params::SearchParams;
use crate::prompt::build_prompt;
use crate::provider::{LLMProvider, RequestContext};

/// Longest slice of model output quoted back in an error.
pub const EXCERPT_CHARS: usize = 100;

/// Translates free-text trace searches into [`SearchParams`].
///
/// Holds no per-call state; clones share the backend.
#[derive(Clone)]
pub struct QueryParser {
    provider: Arc<dyn LLMProvider>,
}

impl QueryParser {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Build a parser from validated settings. A disabled config is
    /// [`ConfigError::Disabled`].
    pub fn from_config(config: &NlqConfig) -> Result<Self, ConfigError> {
        provider_from_config(config)?
            .map(Self::new)
            .ok_or(ConfigError::Disabled)
    }

    /// Parse with no caller-imposed deadline or cancellation.
    pub async fn parse(&self, query: &str) -> Result<SearchParams, NlqError> {
        self.parse_with(&RequestContext::background(), query).await
    }

    /// Parse `query`, honoring the cancellation and deadline in `ctx`.
    ///
    /// An empty or whitespace-only query fails without calling the backend.
    #[instrument(level = "debug", skip_all, fields(query_len = query.len()))]
    pub async fn parse_with(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> Result<SearchParams, NlqError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(NlqError::EmptyQuery);
        }

        let prompt = build_prompt(query);
        let raw = self.provider.generate(ctx, &prompt).await.map_err(|err| {
            warn!(error = %err, "generation failed");
            NlqError::GenerationFailure(err)
        })?;

        decode_response(&raw)
    }
}

/// Turn raw model output into validated parameters.
pub fn decode_response(raw: &str) -> Result<SearchParams, NlqError> {
    let Some(found) = extract_json(raw) else {
        warn!(
            response_len = raw.len(),
            "model output contained no JSON object"
        );
        return Err(NlqError::InvalidJson {
            reason: "no JSON found in response".to_string(),
            excerpt: truncate(raw.trim(), EXCERPT_CHARS),
        });
    };
    debug!(strategy = found.strategy, "extracted JSON from model output");

    let params: SearchParams = serde_json::from_str(found.json).map_err(|err| {
        warn!(error = %err, "model JSON did not decode into search parameters");
        NlqError::InvalidJson {
            reason: format!("failed to decode parameters: {err}"),
            excerpt: truncate(found.json, EXCERPT_CHARS),
        }
    })?;

    params.validate().map_err(|err| {
        warn!(field = err.field(), error = %err, "model output failed validation");
        NlqError::ValidationFailed(err)
    })?;

    Ok(params)
}

/// Validate `config` and build its backend, or `None` when the feature is off.
pub fn provider_from_config(
    config: &NlqConfig,
) -> Result<Option<Arc<dyn LLMProvider>>, ConfigError> {
    config.validate()?;
    if !config.enabled {
        return Ok(None);
    }

    match config.provider_name().as_str() {
        #[cfg(feature = "ollama")]
        crate::config::SUPPORTED_PROVIDER => {
            let provider = crate::ollama::OllamaProvider::new(&config.ollama)?;
            debug!(
                endpoint = %provider.endpoint(),
                model = provider.model(),
                "ollama provider configured"
            );
            Ok(Some(Arc::new(provider)))
        }
        other => Err(ConfigError::UnsupportedProvider(other.to_string())),
    }
}
