//! Ticket-scoped values passed between pipeline stages.
//!
//! Nothing here is mutated after construction; each stage consumes the
//! previous stage's value and produces a new one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category used when the classifier omits one.
pub const UNKNOWN_CATEGORY: &str = "unknown";
/// Priority used when the classifier omits one.
pub const DEFAULT_PRIORITY: &str = "normal";
/// Reason used when the evaluator rejects without saying why, or says nothing parseable.
pub const EVALUATOR_REJECTION_REASON: &str = "Response rejected by evaluator.";

/// Parsed JSON object from a model response.
pub type JsonObject = Map<String, Value>;

/// A customer support ticket. Immutable input to one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub text: String,
}

impl Ticket {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Classifier verdict. Both fields are always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Open set; the model may answer outside the hinted labels.
    pub category: String,
    /// Open set as well. Carried for reporting only.
    pub priority: String,
}

impl Classification {
    /// Build from the classifier's JSON, substituting fallbacks for missing,
    /// non-string or blank fields. A blank category therefore escalates as
    /// `unknown` instead of reaching the evaluator. The category is trimmed
    /// and lower-cased so that policy lookups are not sensitive to model
    /// capitalisation.
    pub fn from_object(fields: &JsonObject) -> Self {
        let category = string_field(fields, "category")
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
        let priority = string_field(fields, "priority")
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PRIORITY.to_string());
        Self { category, priority }
    }

    pub fn is_unknown(&self) -> bool {
        self.category == UNKNOWN_CATEGORY
    }
}

/// A reply drafted by the responder. Held only until evaluated or escalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub text: String,
}

/// Evaluator output as the model stated it, before fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationVerdict {
    /// `Some(true)` only for the JSON literal `true`.
    pub approve: Option<bool>,
    pub reason: Option<String>,
}

impl EvaluationVerdict {
    pub fn from_object(fields: &JsonObject) -> Self {
        Self {
            approve: fields.get("approve").and_then(Value::as_bool),
            reason: string_field(fields, "reason").map(str::to_string),
        }
    }
}

/// Resolved evaluation. `approve` defaults to `false` so ambiguity escalates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub approve: bool,
    pub reason: String,
}

impl Evaluation {
    /// Apply the fail-closed defaults to a verdict.
    pub fn resolve(verdict: EvaluationVerdict) -> Self {
        Self {
            approve: verdict.approve.unwrap_or(false),
            reason: verdict
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| EVALUATOR_REJECTION_REASON.to_string()),
        }
    }

    /// The evaluation used when the evaluator's output could not be parsed.
    pub fn rejected() -> Self {
        Self::resolve(EvaluationVerdict::default())
    }
}

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    Approved { draft: Draft },
    Escalated { note: String, reason: String },
}

impl Disposition {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self, Self::Escalated { .. })
    }
}

fn string_field<'a>(fields: &'a JsonObject, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}
