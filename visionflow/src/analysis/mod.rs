//! The analysis service client seam.
//!
//! The engine treats the AI inference endpoint as an external collaborator
//! behind [`AnalysisClient`]. The distinction between the two failure shapes
//! matters everywhere downstream:
//!
//! - `Ok(AnalysisResult { success: false, .. })` — the service answered and
//!   reported a stage failure (e.g., malformed image). Recorded immediately,
//!   never retried.
//! - `Err(TransportError)` — the service could not be reached or timed out.
//!   Handed back to the queue's retry policy.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::core::{AnalysisResult, PromptConfig};
use crate::errors::TransportError;

#[cfg(feature = "remote")]
mod http;

#[cfg(feature = "remote")]
pub use http::{HttpAnalysisClient, HttpClientConfig};

/// Client for the external analysis service.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Evaluates one image against one prompt.
    ///
    /// May take seconds; callers bound the wait via [`TimeoutClient`].
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the service cannot be reached or
    /// answers with something undecodable.
    async fn evaluate(
        &self,
        image_id: Uuid,
        prompt: &PromptConfig,
    ) -> Result<AnalysisResult, TransportError>;
}

/// Decorator that bounds every call with a timeout.
///
/// An elapsed wait becomes [`TransportError::Timeout`], which the queue
/// treats like any other transport failure. This is the only enforced
/// suspension point inside task processing.
pub struct TimeoutClient {
    inner: Arc<dyn AnalysisClient>,
    timeout: Duration,
}

impl TimeoutClient {
    /// Wraps a client with the given per-call bound.
    #[must_use]
    pub fn new(inner: Arc<dyn AnalysisClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Returns the configured bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl AnalysisClient for TimeoutClient {
    async fn evaluate(
        &self,
        image_id: Uuid,
        prompt: &PromptConfig,
    ) -> Result<AnalysisResult, TransportError> {
        match tokio::time::timeout(self.timeout, self.inner.evaluate(image_id, prompt)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                timeout: self.timeout,
            }),
        }
    }
}
