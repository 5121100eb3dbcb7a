//! Routing policy: which categories never auto-approve.
//!
//! Kept as data so the set can be tuned from configuration and tested without
//! running the pipeline.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::parser::ExtractionStrategy;
use crate::types::Classification;

/// Categories that always go to a human, regardless of draft quality.
pub const DEFAULT_AUTO_ESCALATE: [&str; 3] = ["legal", "data privacy", "security"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Lower-cased category labels that skip the evaluator.
    pub auto_escalate: BTreeSet<String>,
    /// Escalate when the classifier produced no category.
    pub escalate_unknown: bool,
    /// Span selection for classifier and evaluator JSON.
    pub extraction: ExtractionStrategy,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            auto_escalate: DEFAULT_AUTO_ESCALATE.iter().map(|c| c.to_string()).collect(),
            escalate_unknown: true,
            extraction: ExtractionStrategy::default(),
        }
    }
}

impl EscalationPolicy {
    /// Normalise configured labels so lookups match `Classification::category`.
    pub fn normalized(mut self) -> Self {
        self.auto_escalate = self
            .auto_escalate
            .into_iter()
            .map(|c| c.trim().to_lowercase())
            .collect();
        self
    }

    /// Whether this classification bypasses evaluation and goes to a human.
    pub fn requires_manual_review(&self, classification: &Classification) -> bool {
        let category = classification.category.trim().to_lowercase();
        (self.escalate_unknown && classification.is_unknown())
            || self.auto_escalate.contains(&category)
    }

    /// Escalation reason recorded for auto-escalated categories.
    pub fn manual_review_reason(&self, classification: &Classification) -> String {
        format!(
            "Category '{}' requires manual review.",
            classification.category
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.auto_escalate.iter().any(|c| c.trim().is_empty()) {
            return Err("auto_escalate must not contain empty categories".to_string());
        }
        Ok(())
    }
}
