//! Pipeline stages. Each stage is one generation call plus, where needed,
//! structured-output parsing.
//!
//! | Stage        | Output                | Parses JSON | Temperature      |
//! |--------------|-----------------------|-------------|------------------|
//! | `Classifier` | `Classification`      | yes         | 0.0 (pinned)     |
//! | `Responder`  | `Drafted`             | no          | draft_temperature |
//! | `Evaluator`  | `EvaluationVerdict`   | yes         | 0.0 (pinned)     |
//! | `Escalator`  | escalation note       | no          | draft_temperature |
//!
//! `StageSet` builds all four from one config and one pair of ports.

pub mod classifier;
pub mod escalator;
pub mod evaluator;
pub mod responder;

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::generation::Generator;
use crate::retrieval::PolicyIndex;

pub use classifier::Classifier;
pub use escalator::Escalator;
pub use evaluator::Evaluator;
pub use responder::{Drafted, Responder};

/// Temperature for stages whose output must be reproducible.
pub const DETERMINISTIC_TEMPERATURE: f64 = 0.0;

/// All stages wired to shared ports.
pub struct StageSet {
    pub classifier: Classifier,
    pub responder: Responder,
    pub evaluator: Evaluator,
    pub escalator: Escalator,
}

impl StageSet {
    pub fn new(
        config: &PipelineConfig,
        generator: Arc<dyn Generator>,
        index: Arc<dyn PolicyIndex>,
    ) -> Self {
        let generation = &config.generation;
        let extraction = config.policy.extraction;
        Self {
            classifier: Classifier::new(
                generator.clone(),
                extraction,
                generation.max_output_tokens,
            ),
            responder: Responder::new(
                generator.clone(),
                index,
                config.retrieval.clone(),
                generation.draft_temperature,
                generation.max_output_tokens,
            ),
            evaluator: Evaluator::new(generator.clone(), extraction, generation.max_output_tokens),
            escalator: Escalator::new(
                generator,
                generation.draft_temperature,
                generation.max_output_tokens,
            ),
        }
    }
}
