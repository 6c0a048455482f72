//! Scripted model client — plays back a fixed sequence of steps.
//!
//! Used by the test suites and for offline wiring: each `next_step` call
//! pops the next queued step, so a whole multi-turn tool-calling flow can
//! be rehearsed deterministically without network access.

use async_trait::async_trait;
use tokio::sync::Mutex;

use stringer_core::error::ModelError;
use stringer_core::model::{ModelClient, ModelRequest, ModelStep};

/// A deterministic model that replays queued steps in order.
pub struct ScriptedModel {
    steps: Mutex<std::collections::VecDeque<ModelStep>>,

    /// Step returned when the script runs dry.
    fallback: ModelStep,
}

impl ScriptedModel {
    /// Create a scripted model from a sequence of steps.
    pub fn new(steps: impl IntoIterator<Item = ModelStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback: ModelStep {
                message: Some("(scripted model: no further steps)".into()),
                ..Default::default()
            },
        }
    }

    /// Override the step returned after the script is exhausted.
    pub fn with_fallback(mut self, step: ModelStep) -> Self {
        self.fallback = step;
        self
    }

    /// Steps still queued.
    pub async fn remaining(&self) -> usize {
        self.steps.lock().await.len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn next_step(&self, _request: ModelRequest) -> Result<ModelStep, ModelError> {
        let mut steps = self.steps.lock().await;
        Ok(steps.pop_front().unwrap_or_else(|| self.fallback.clone()))
    }
}
