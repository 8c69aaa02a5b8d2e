//! Mock analysis clients for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use crate::analysis::AnalysisClient;
use crate::core::{AnalysisPayload, AnalysisResult, PromptConfig};
use crate::errors::TransportError;

/// A client that returns scripted results per (image, prompt) pair and
/// counts calls.
///
/// The call counts are what prove idempotent replay: a redelivered task
/// whose result is already recorded must not bump them.
pub struct ScriptedAnalysisClient {
    results: Mutex<HashMap<(Uuid, Uuid), AnalysisResult>>,
    default: Mutex<AnalysisResult>,
    calls: Mutex<HashMap<(Uuid, Uuid), usize>>,
    total_calls: AtomicUsize,
}

impl Default for ScriptedAnalysisClient {
    fn default() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            default: Mutex::new(AnalysisResult::succeeded(AnalysisPayload::Boolean {
                value: true,
            })),
            calls: Mutex::new(HashMap::new()),
            total_calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedAnalysisClient {
    /// Creates a client whose default answer is a successful `true` verdict.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the result for one (image, prompt) pair.
    pub fn script(&self, image_id: Uuid, prompt_id: Uuid, result: AnalysisResult) {
        self.results.lock().insert((image_id, prompt_id), result);
    }

    /// Sets the fallback result for unscripted pairs.
    pub fn set_default(&self, result: AnalysisResult) {
        *self.default.lock() = result;
    }

    /// Returns how often one (image, prompt) pair was evaluated.
    #[must_use]
    pub fn call_count(&self, image_id: Uuid, prompt_id: Uuid) -> usize {
        self.calls
            .lock()
            .get(&(image_id, prompt_id))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the total number of evaluate calls.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisClient for ScriptedAnalysisClient {
    async fn evaluate(
        &self,
        image_id: Uuid,
        prompt: &PromptConfig,
    ) -> Result<AnalysisResult, TransportError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().entry((image_id, prompt.id)).or_insert(0) += 1;

        let scripted = self.results.lock().get(&(image_id, prompt.id)).cloned();
        Ok(scripted.unwrap_or_else(|| self.default.lock().clone()))
    }
}

/// A client that fails with transport errors a set number of times before
/// answering, for exercising the queue's retry path.
pub struct FlakyAnalysisClient {
    failures_remaining: Mutex<u32>,
    result: AnalysisResult,
    total_calls: AtomicUsize,
}

impl FlakyAnalysisClient {
    /// Creates a client that fails `failures` times, then returns `result`.
    #[must_use]
    pub fn new(failures: u32, result: AnalysisResult) -> Self {
        Self {
            failures_remaining: Mutex::new(failures),
            result,
            total_calls: AtomicUsize::new(0),
        }
    }

    /// Returns the total number of evaluate calls.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisClient for FlakyAnalysisClient {
    async fn evaluate(
        &self,
        _image_id: Uuid,
        _prompt: &PromptConfig,
    ) -> Result<AnalysisResult, TransportError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        let mut remaining = self.failures_remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(TransportError::unreachable("simulated outage"));
        }
        Ok(self.result.clone())
    }
}
