//! Generation backend abstraction.
//!
//! A backend is anything that turns a prompt into raw text. The parser never
//! retries; a failed or cancelled call is reported to the caller as-is.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Trait for text-generation backends.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate raw text for `prompt`, honoring the cancellation and deadline in `ctx`.
    async fn generate(&self, ctx: &RequestContext, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("deadline exceeded after {after:?}")]
    DeadlineExceeded { after: Duration },
    #[error("request cancelled")]
    Cancelled,
    #[error("{0}")]
    Backend(String),
}

impl GenerationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

/// Per-call cancellation and deadline, supplied by the caller.
///
/// Cloning shares the cancellation token.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline of its own.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The tighter of this context's deadline and `now + timeout`.
    pub fn effective_deadline(&self, timeout: Duration) -> Instant {
        let bounded = Instant::now() + timeout;
        match self.deadline {
            Some(deadline) if deadline < bounded => deadline,
            _ => bounded,
        }
    }

    /// Run `fut` until it completes, the context is cancelled, or the
    /// effective deadline passes, whichever comes first.
    pub async fn run_bounded<T, F>(&self, timeout: Duration, fut: F) -> Result<T, GenerationError>
    where
        F: Future<Output = Result<T, GenerationError>>,
    {
        let started = Instant::now();
        let deadline = self.effective_deadline(timeout);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GenerationError::Cancelled),
            res = tokio::time::timeout_at(deadline, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(GenerationError::DeadlineExceeded {
                    after: started.elapsed(),
                }),
            },
        }
    }
}

/// Canned-response provider for tests and offline runs.
pub struct MockProvider {
    outcome: Result<String, GenerationError>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Always answer with `response`.
    pub fn always(response: &str) -> Self {
        Self {
            outcome: Ok(response.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with `err`.
    pub fn failing(err: GenerationError) -> Self {
        Self {
            outcome: Err(err),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `generate` calls observed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn generate(&self, ctx: &RequestContext, _prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if ctx.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        self.outcome.clone()
    }
}
