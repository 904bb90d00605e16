//! Tracequery NLQ: natural-language trace search.
//!
//! Turns a free-text request such as *"500 errors from payment-service slower
//! than 2s"* into validated [`SearchParams`] by prompting a local model.
//!
//! ## Pipeline
//!
//! ```text
//! query ─► trim / empty check ─► build_prompt ─► LLMProvider::generate
//!                                                     │
//!        SearchParams ◄─ validate ◄─ decode ◄─ extract_json (whole │ fenced │ brace span)
//! ```
//!
//! - [`prompt`]: fixed instructions plus few-shot examples.
//! - [`provider`]: the backend trait, per-call cancellation and deadlines, a mock.
//! - [`ollama`]: the Ollama `/api/generate` backend (feature `ollama`).
//! - [`extract`]: recovery of a JSON object from noisy model output.
//! - [`params`]: the parameter type, its validation and query projections.
//! - [`config`]: settings with file and environment overrides.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tracequery_nlq::{MockProvider, QueryParser};
//!
//! # async fn demo() -> Result<(), tracequery_nlq::NlqError> {
//! let provider = Arc::new(MockProvider::always(r#"{"service":"auth-service","error":true}"#));
//! let parser = QueryParser::new(provider);
//! let params = parser.parse("auth-service errors").await?;
//! assert_eq!(params.service_name.as_deref(), Some("auth-service"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod duration;
pub mod error;
pub mod extract;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod params;
pub mod parser;
pub mod prompt;
pub mod provider;

pub use config::{ConfigError, NlqConfig, OllamaConfig};
pub use duration::{parse_duration, DurationError};
pub use error::NlqError;
pub use extract::{extract_json, Extracted};
#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;
pub use params::{ErrorProjection, SearchForm, SearchParams, ValidationError, MAX_LIMIT, MIN_LIMIT};
pub use parser::{decode_response, provider_from_config, QueryParser};
pub use prompt::build_prompt;
pub use provider::{GenerationError, LLMProvider, MockProvider, RequestContext};
