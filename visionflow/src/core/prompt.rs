//! Prompt configuration and typed analysis results.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of answer a prompt asks the analysis service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    /// A yes/no question (e.g., "does this image contain a person?").
    Boolean,
    /// A free-text description.
    Descriptive,
    /// A list of keywords/tags.
    Keywords,
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Descriptive => write!(f, "descriptive"),
            Self::Keywords => write!(f, "keywords"),
        }
    }
}

/// Configuration of one prompt as referenced by a pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Unique prompt id.
    pub id: Uuid,
    /// Human-readable prompt name.
    pub name: String,
    /// The instruction text sent to the analysis service.
    pub text: String,
    /// The expected answer shape.
    pub prompt_type: PromptType,
}

impl PromptConfig {
    /// Creates a new prompt configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, text: impl Into<String>, prompt_type: PromptType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            text: text.into(),
            prompt_type,
        }
    }
}

/// Typed payload returned by the analysis service, discriminated by prompt type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisPayload {
    /// Answer to a boolean prompt.
    Boolean {
        /// The yes/no verdict.
        value: bool,
    },
    /// Answer to a descriptive prompt.
    Descriptive {
        /// The free-text description.
        text: String,
    },
    /// Answer to a keywords prompt.
    Keywords {
        /// The extracted keywords.
        keywords: Vec<String>,
    },
}

impl AnalysisPayload {
    /// Returns the boolean verdict, if this payload carries one.
    #[must_use]
    pub fn boolean_value(&self) -> Option<bool> {
        match self {
            Self::Boolean { value } => Some(*value),
            _ => None,
        }
    }

    /// Returns true if the payload shape matches the given prompt type.
    #[must_use]
    pub fn matches(&self, prompt_type: PromptType) -> bool {
        matches!(
            (self, prompt_type),
            (Self::Boolean { .. }, PromptType::Boolean)
                | (Self::Descriptive { .. }, PromptType::Descriptive)
                | (Self::Keywords { .. }, PromptType::Keywords)
        )
    }
}

/// Outcome of evaluating one image against one prompt.
///
/// A result with `success == false` means the service answered and reported
/// a failure (e.g., malformed image); transport-level failures never become
/// an `AnalysisResult` until retries are exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Whether the analysis succeeded.
    pub success: bool,
    /// The typed answer; present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<AnalysisPayload>,
    /// Model confidence in the answer, 0.0..=1.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Service-side execution time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
    /// Error message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Creates a successful result.
    #[must_use]
    pub fn succeeded(payload: AnalysisPayload) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            confidence: None,
            execution_time_ms: None,
            error: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            confidence: None,
            execution_time_ms: None,
            error: Some(error.into()),
        }
    }

    /// Sets the confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Sets the execution time.
    #[must_use]
    pub fn with_execution_time_ms(mut self, ms: f64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    /// Returns the boolean verdict of a successful boolean analysis.
    #[must_use]
    pub fn boolean_value(&self) -> Option<bool> {
        self.payload.as_ref().and_then(AnalysisPayload::boolean_value)
    }
}
