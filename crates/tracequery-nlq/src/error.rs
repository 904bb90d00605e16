use crate::params::ValidationError;
use crate::provider::GenerationError;

/// Reasons a query could not be turned into search parameters.
///
/// Every variant ends the call; nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NlqError {
    #[error("query cannot be empty")]
    EmptyQuery,

    #[error("LLM generation failed: {0}")]
    GenerationFailure(#[from] GenerationError),

    /// No usable JSON object in the model output. `excerpt` is bounded and
    /// quotes either the raw response or the JSON candidate that failed to
    /// decode, depending on `reason`.
    #[error("LLM returned invalid JSON: {reason} (excerpt: {excerpt})")]
    InvalidJson { reason: String, excerpt: String },

    #[error("extracted parameters failed validation: {0}")]
    ValidationFailed(#[from] ValidationError),
}

impl NlqError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "EMPTY_QUERY",
            Self::GenerationFailure(err) if err.is_timeout() => "TIMEOUT",
            Self::GenerationFailure(_) => "GENERATION_FAILED",
            Self::InvalidJson { .. } => "INVALID_JSON",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
        }
    }

    /// The user can fix this by rephrasing the query.
    pub fn is_user_correctable(&self) -> bool {
        !matches!(self, Self::GenerationFailure(_))
    }

    /// Trying the same query again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GenerationFailure(_))
    }
}
