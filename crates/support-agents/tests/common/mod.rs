//! Shared test doubles for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use support_agents::errors::PipelineError;
use support_agents::generation::{GenerationRequest, Generator, StageKind};

/// Generator that answers from a per-stage script and records every call.
///
/// A per-ticket override for the classifier lets one batch mix outcomes.
pub struct ScriptedGenerator {
    by_stage: HashMap<StageKind, String>,
    classify_overrides: Vec<(String, String)>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            by_stage: HashMap::new(),
            classify_overrides: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, stage: StageKind, response: &str) -> Self {
        self.by_stage.insert(stage, response.to_string());
        self
    }

    /// Classifier response for tickets whose text contains `needle`.
    pub fn classify_when(mut self, needle: &str, response: &str) -> Self {
        self.classify_overrides
            .push((needle.to_string(), response.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, stage: StageKind) -> Vec<GenerationRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.stage == stage)
            .collect()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        self.calls.lock().unwrap().push(request.clone());

        if request.stage == StageKind::Classify {
            if let Some((_, response)) = self
                .classify_overrides
                .iter()
                .find(|(needle, _)| request.user_prompt.contains(needle.as_str()))
            {
                return Ok(response.clone());
            }
        }

        self.by_stage.get(&request.stage).cloned().ok_or_else(|| {
            PipelineError::Internal(anyhow::anyhow!("no scripted response for {}", request.stage))
        })
    }
}
