//! Prompt text for each pipeline stage.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever prompt content changes so
//! logged dispositions can be traced back to the wording that produced them.

/// Prompt version. Bump on any prompt content change.
pub const PROMPT_VERSION: &str = "1.2.0";

pub const CLASSIFIER_SYSTEM: &str =
    "You are a support ticket classifier. Output JSON with category and priority.";

pub const EVALUATOR_SYSTEM: &str = "\
You are a QA evaluator for support responses. Determine if this response is good to send \
directly to a customer. Return valid JSON like: {\"approve\": true|false, \"reason\": \"...\"}";

pub const ESCALATOR_SYSTEM: &str = "You are an internal assistant writing escalation notes.";

/// Context block used when retrieval returns nothing.
pub const NO_POLICY_CONTEXT: &str = "No relevant policies found.";

pub fn classifier_user(ticket: &str) -> String {
    format!(
        "Classify this ticket:\n\"{ticket}\"\n\
         Return valid JSON like: {{\"category\": \"legal | data privacy | security | billing\", \
         \"priority\": \"high\"|\"medium\"|\"low\"}}"
    )
}

/// Retrieval query: category-scoped when a category is known.
pub fn policy_query(category: Option<&str>, ticket: &str) -> String {
    match category {
        Some(category) => format!("{category} policy: {ticket}"),
        None => ticket.to_string(),
    }
}

pub fn responder_system(category: &str, context: &str) -> String {
    format!(
        "You are a customer support assistant specialized in '{category}' tickets. \
         Use the following policy context to help answer the question:\n{context}"
    )
}

pub fn responder_user(ticket: &str) -> String {
    format!("Write a helpful and professional reply to this ticket:\n\"{ticket}\"")
}

pub fn evaluator_user(ticket: &str, draft: &str) -> String {
    format!(
        "Customer message:\n\"{ticket}\"\n\n\
         Proposed response:\n\"{draft}\"\n\n\
         Evaluate clarity, accuracy, and coverage of the issue."
    )
}

pub fn escalator_user(ticket: &str, reason: &str) -> String {
    format!(
        "Escalate this ticket:\n\"{ticket}\"\n\n\
         Reason: {reason}\n\n\
         Write a concise, clear summary for a human support agent."
    )
}
