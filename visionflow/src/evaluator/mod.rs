//! Filter-condition evaluation: decides whether an image's path continues
//! past a stage.
//!
//! Pure decision logic, no I/O. The orchestrator calls [`evaluate`] after
//! persisting a stage's result; everything it needs is in the arguments.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{AnalysisResult, FilterCondition, Stage};

/// What happens to an image's path after a stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathDecision {
    /// The path continues to the next stage, if one exists.
    Continue,
    /// The stage's filter excluded the image; the path terminates cleanly.
    FilteredOut,
    /// The stage reported failure; the path terminates as failed.
    StageFailed,
}

impl PathDecision {
    /// Returns true if the path should advance.
    #[must_use]
    pub fn continues(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Returns true if the path terminated in failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::StageFailed)
    }
}

impl fmt::Display for PathDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::FilteredOut => write!(f, "filtered_out"),
            Self::StageFailed => write!(f, "stage_failed"),
        }
    }
}

/// Evaluates a stage's filter condition against an analysis result.
///
/// Rules, in order:
/// - a failed result terminates the path as [`PathDecision::StageFailed`],
///   regardless of any condition;
/// - a stage without an effective filter passes the image through
///   (non-boolean prompts never have an effective filter);
/// - `IfTrue` continues only on a `true` verdict, `IfFalse` only on `false`.
///   A successful result that carries no boolean verdict cannot satisfy
///   either condition and filters the image out.
#[must_use]
pub fn evaluate(stage: &Stage, result: &AnalysisResult) -> PathDecision {
    if !result.success {
        return PathDecision::StageFailed;
    }

    let Some(condition) = stage.effective_filter() else {
        return PathDecision::Continue;
    };

    let wanted = match condition {
        FilterCondition::IfTrue => true,
        FilterCondition::IfFalse => false,
    };

    match result.boolean_value() {
        Some(value) if value == wanted => PathDecision::Continue,
        _ => PathDecision::FilteredOut,
    }
}
