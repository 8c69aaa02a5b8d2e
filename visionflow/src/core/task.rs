//! The queue unit of work: one image advancing one stage of one job.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// A queued unit of work: "evaluate image X at stage index N of job J".
///
/// Tasks are ephemeral; they carry just enough context to be replayed
/// independently and idempotently under at-least-once delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// The job being advanced.
    pub job_id: Uuid,
    /// The image being advanced.
    pub image_id: Uuid,
    /// 0-based index into the job's pipeline snapshot.
    pub stage_index: usize,
    /// Delivery attempt count, starting at 0 and bumped on redelivery.
    pub attempt: u32,
}

impl Task {
    /// Creates the initial task for an image, at stage index 0.
    #[must_use]
    pub const fn initial(job_id: Uuid, image_id: Uuid) -> Self {
        Self {
            job_id,
            image_id,
            stage_index: 0,
            attempt: 0,
        }
    }

    /// Creates the continuation task for the next stage of the same path.
    #[must_use]
    pub const fn continuation(&self) -> Self {
        Self {
            job_id: self.job_id,
            image_id: self.image_id,
            stage_index: self.stage_index + 1,
            attempt: 0,
        }
    }

    /// Returns a fresh-delivery copy with the attempt counter bumped.
    #[must_use]
    pub const fn redelivered(&self) -> Self {
        Self {
            job_id: self.job_id,
            image_id: self.image_id,
            stage_index: self.stage_index,
            attempt: self.attempt + 1,
        }
    }

    /// Stable idempotency key over (job, image, stage index).
    ///
    /// The attempt counter is deliberately excluded so redeliveries share
    /// the key.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        let combined = format!("{}:{}:{}", self.job_id, self.image_id, self.stage_index);
        let mut hasher = Sha256::new();
        hasher.update(combined.as_bytes());
        let digest = hasher.finalize();
        format!("task:{}", hex::encode(&digest[..16]))
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task(job={}, image={}, stage={}, attempt={})",
            self.job_id, self.image_id, self.stage_index, self.attempt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_task() {
        let task = Task::initial(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(task.stage_index, 0);
        assert_eq!(task.attempt, 0);
    }

    #[test]
    fn test_continuation_advances_stage_and_resets_attempt() {
        let task = Task {
            job_id: Uuid::new_v4(),
            image_id: Uuid::new_v4(),
            stage_index: 1,
            attempt: 2,
        };
        let next = task.continuation();

        assert_eq!(next.stage_index, 2);
        assert_eq!(next.attempt, 0);
        assert_eq!(next.job_id, task.job_id);
        assert_eq!(next.image_id, task.image_id);
    }

    #[test]
    fn test_idempotency_key_stable_across_redelivery() {
        let task = Task::initial(Uuid::new_v4(), Uuid::new_v4());
        let redelivered = task.redelivered();

        assert!(task.idempotency_key().starts_with("task:"));
        assert_eq!(task.idempotency_key(), redelivered.idempotency_key());
        assert_eq!(redelivered.attempt, 1);
    }

    #[test]
    fn test_idempotency_key_differs_per_stage() {
        let task = Task::initial(Uuid::new_v4(), Uuid::new_v4());
        let next = task.continuation();

        assert_ne!(task.idempotency_key(), next.idempotency_key());
    }
}
