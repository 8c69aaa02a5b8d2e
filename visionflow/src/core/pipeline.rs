//! Pipeline and stage definitions, plus the execution-time snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::core::prompt::{PromptConfig, PromptType};
use crate::errors::PipelineValidationError;

/// Filter rule attached to a boolean stage.
///
/// Determines whether an image's path continues past the stage based on the
/// boolean verdict. Only meaningful for stages whose prompt type is
/// [`PromptType::Boolean`]; other stages ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterCondition {
    /// Continue only when the verdict is true.
    #[serde(rename = "true")]
    IfTrue,
    /// Continue only when the verdict is false.
    #[serde(rename = "false")]
    IfFalse,
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IfTrue => write!(f, "true"),
            Self::IfFalse => write!(f, "false"),
        }
    }
}

/// One step of a pipeline: a prompt plus an optional filter condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Unique stage id.
    pub id: Uuid,
    /// Position within the pipeline; unique and positive, executed ascending.
    pub order: u32,
    /// The prompt this stage runs.
    pub prompt: PromptConfig,
    /// Optional filter on the boolean verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_condition: Option<FilterCondition>,
}

impl Stage {
    /// Creates a new stage.
    #[must_use]
    pub fn new(order: u32, prompt: PromptConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            order,
            prompt,
            filter_condition: None,
        }
    }

    /// Sets the filter condition.
    #[must_use]
    pub const fn with_filter(mut self, condition: FilterCondition) -> Self {
        self.filter_condition = Some(condition);
        self
    }

    /// Returns the filter condition if it applies to this stage.
    ///
    /// A condition on a non-boolean stage is inert; the UI only offers
    /// filtering for boolean prompts, and the engine honors the same rule.
    #[must_use]
    pub fn effective_filter(&self) -> Option<FilterCondition> {
        if self.prompt.prompt_type == PromptType::Boolean {
            self.filter_condition
        } else {
            None
        }
    }
}

/// An ordered set of stages applied to a batch of images.
///
/// Pipelines are scoped to one library and immutable at execution time:
/// jobs run against a [`PipelineSnapshot`], never the live definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Unique pipeline id.
    pub id: Uuid,
    /// The library this pipeline belongs to.
    pub library_id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// The user that created the pipeline.
    pub created_by: Uuid,
    /// The stage set; validated by [`Pipeline::validate`].
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Creates a new pipeline.
    #[must_use]
    pub fn new(
        library_id: Uuid,
        name: impl Into<String>,
        created_by: Uuid,
        stages: Vec<Stage>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            library_id,
            name: name.into(),
            created_by,
            stages,
        }
    }

    /// Validates the stage set.
    ///
    /// # Errors
    ///
    /// Returns an error when the pipeline has no stages, a stage order of
    /// zero, or duplicate order values.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::Empty {
                pipeline_id: self.id,
            });
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.order == 0 {
                return Err(PipelineValidationError::NonPositiveOrder {
                    pipeline_id: self.id,
                    stage_id: stage.id,
                });
            }
            if !seen.insert(stage.order) {
                return Err(PipelineValidationError::DuplicateOrder {
                    pipeline_id: self.id,
                    order: stage.order,
                });
            }
        }

        Ok(())
    }

    /// Takes an immutable execution snapshot of the current stage set.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline fails validation.
    pub fn snapshot(&self) -> Result<PipelineSnapshot, PipelineValidationError> {
        self.validate()?;
        let mut stages = self.stages.clone();
        stages.sort_by_key(|s| s.order);
        Ok(PipelineSnapshot {
            pipeline_id: self.id,
            stages,
        })
    }
}

/// Immutable copy of a pipeline's stage list, taken at job submission.
///
/// Stage indices are 0-based positions in ascending order; later edits to
/// the live pipeline never change an in-flight job's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    /// The pipeline this snapshot was taken from.
    pub pipeline_id: Uuid,
    stages: Vec<Stage>,
}

impl PipelineSnapshot {
    /// Returns the stage at the given index, if any.
    #[must_use]
    pub fn stage_at(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Returns true if a stage exists after the given index.
    #[must_use]
    pub fn has_stage_after(&self, index: usize) -> bool {
        index + 1 < self.stages.len()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the snapshot has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterates the stages in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boolean_prompt(name: &str) -> PromptConfig {
        PromptConfig::new(name, format!("Is there a {name}?"), PromptType::Boolean)
    }

    fn pipeline_with_orders(orders: &[u32]) -> Pipeline {
        let stages = orders
            .iter()
            .map(|&order| Stage::new(order, boolean_prompt("person")))
            .collect();
        Pipeline::new(Uuid::new_v4(), "test", Uuid::new_v4(), stages)
    }

    #[test]
    fn test_filter_condition_serde_values() {
        assert_eq!(
            serde_json::to_string(&FilterCondition::IfTrue).unwrap(),
            r#""true""#
        );
        assert_eq!(
            serde_json::to_string(&FilterCondition::IfFalse).unwrap(),
            r#""false""#
        );
    }

    #[test]
    fn test_effective_filter_boolean_only() {
        let stage = Stage::new(1, boolean_prompt("dog")).with_filter(FilterCondition::IfTrue);
        assert_eq!(stage.effective_filter(), Some(FilterCondition::IfTrue));

        let descriptive = PromptConfig::new("describe", "Describe this", PromptType::Descriptive);
        let stage = Stage::new(1, descriptive).with_filter(FilterCondition::IfTrue);
        assert_eq!(stage.effective_filter(), None);
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let pipeline = pipeline_with_orders(&[]);
        assert!(matches!(
            pipeline.validate(),
            Err(PipelineValidationError::Empty { .. })
        ));
    }

    #[test]
    fn test_validate_zero_order() {
        let pipeline = pipeline_with_orders(&[1, 0]);
        assert!(matches!(
            pipeline.validate(),
            Err(PipelineValidationError::NonPositiveOrder { .. })
        ));
    }

    #[test]
    fn test_validate_duplicate_order() {
        let pipeline = pipeline_with_orders(&[1, 2, 2]);
        assert!(matches!(
            pipeline.validate(),
            Err(PipelineValidationError::DuplicateOrder { order: 2, .. })
        ));
    }

    #[test]
    fn test_snapshot_sorts_by_order() {
        let pipeline = pipeline_with_orders(&[3, 1, 2]);
        let snapshot = pipeline.snapshot().unwrap();

        let orders: Vec<u32> = snapshot.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.has_stage_after(0));
        assert!(snapshot.has_stage_after(1));
        assert!(!snapshot.has_stage_after(2));
    }

    #[test]
    fn test_snapshot_is_decoupled_from_pipeline_edits() {
        let mut pipeline = pipeline_with_orders(&[1, 2]);
        let snapshot = pipeline.snapshot().unwrap();

        pipeline.stages.clear();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.stage_at(1).is_some());
    }
}
