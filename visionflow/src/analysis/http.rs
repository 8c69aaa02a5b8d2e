//! HTTP-backed analysis client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::core::{AnalysisPayload, AnalysisResult, PromptConfig, PromptType};
use crate::errors::TransportError;

use super::AnalysisClient;

/// Configuration for [`HttpAnalysisClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// The inference endpoint URL.
    pub endpoint: String,
    /// Connect timeout for the underlying HTTP client.
    pub connect_timeout: Duration,
    /// Optional bearer token.
    pub api_key: Option<String>,
}

impl HttpClientConfig {
    /// Creates a config for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(10),
            api_key: None,
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[derive(Debug, Serialize)]
struct EvaluateRequest<'a> {
    image_id: Uuid,
    prompt_text: &'a str,
    prompt_type: PromptType,
}

#[derive(Debug, Deserialize)]
struct EvaluateResponse {
    success: bool,
    #[serde(default)]
    payload: Option<AnalysisPayload>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    execution_time_ms: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Analysis client speaking JSON over HTTP.
pub struct HttpAnalysisClient {
    config: HttpClientConfig,
    client: reqwest::Client,
}

impl HttpAnalysisClient {
    /// Builds a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(config: HttpClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::unreachable(e.to_string()))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn evaluate(
        &self,
        image_id: Uuid,
        prompt: &PromptConfig,
    ) -> Result<AnalysisResult, TransportError> {
        let body = EvaluateRequest {
            image_id,
            prompt_text: &prompt.text,
            prompt_type: prompt.prompt_type,
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        let decoded: EvaluateResponse = response
            .json()
            .await
            .map_err(|e| TransportError::malformed(e.to_string()))?;

        if decoded.success {
            let payload = decoded
                .payload
                .ok_or_else(|| TransportError::malformed("success response without payload"))?;
            if !payload.matches(prompt.prompt_type) {
                return Err(TransportError::malformed(format!(
                    "payload shape does not match prompt type {}",
                    prompt.prompt_type
                )));
            }
            let mut result = AnalysisResult::succeeded(payload);
            result.confidence = decoded.confidence;
            result.execution_time_ms = decoded.execution_time_ms;
            Ok(result)
        } else {
            let mut result = AnalysisResult::failed(
                decoded
                    .error
                    .unwrap_or_else(|| "analysis failed without detail".to_string()),
            );
            result.execution_time_ms = decoded.execution_time_ms;
            Ok(result)
        }
    }
}
