//! End-to-end pipeline runs against scripted generation and the seeded
//! in-process policy index. No network access.

mod common;

use std::sync::Arc;

use common::ScriptedGenerator;
use support_agents::config::{PipelineConfig, DEFAULT_NAMESPACE};
use support_agents::generation::StageKind;
use support_agents::policies;
use support_agents::prompts::NO_POLICY_CONTEXT;
use support_agents::retrieval::{InMemoryPolicyIndex, PolicyRecord};
use support_agents::state_machine::TicketState;
use support_agents::types::EVALUATOR_REJECTION_REASON;
use support_agents::{Disposition, Ticket, TicketPipeline};

const REFUND_TICKET: &str = "Can I get a refund if I change my mind?";

fn seeded_index() -> Arc<InMemoryPolicyIndex> {
    Arc::new(InMemoryPolicyIndex::with_records(DEFAULT_NAMESPACE, policies::seed_records()))
}

fn pipeline(
    generator: &Arc<ScriptedGenerator>,
    index: Arc<InMemoryPolicyIndex>,
) -> TicketPipeline {
    TicketPipeline::with_resilience(&PipelineConfig::default(), generator.clone(), index)
}

#[tokio::test]
async fn refund_ticket_is_approved_with_policy_context() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on(
                StageKind::Classify,
                r#"{"category": "billing", "priority": "medium"}"#,
            )
            .on(
                StageKind::Respond,
                "You can request a refund within 30 days of the original transaction.",
            )
            .on(
                StageKind::Evaluate,
                r#"Sure: {"approve": true, "reason": "Accurate and grounded in policy."}"#,
            ),
    );

    let outcome = pipeline(&generator, seeded_index())
        .handle(&Ticket::new(REFUND_TICKET))
        .await
        .expect("refund ticket should complete");

    assert_eq!(outcome.classification.category, "billing");
    assert_eq!(outcome.passages[0].id, "billing-2");
    assert_eq!(
        outcome.disposition,
        Disposition::Approved {
            draft: outcome.draft.clone()
        }
    );

    let respond = generator.calls_for(StageKind::Respond);
    assert_eq!(respond.len(), 1);
    assert!(respond[0]
        .system_prompt
        .contains("Refunds must be requested within 30 days of the original transaction."));
    assert!(generator.calls_for(StageKind::Escalate).is_empty());

    let last = outcome.transitions.last().unwrap();
    assert_eq!(last.to, TicketState::Done);
}

#[tokio::test]
async fn security_ticket_escalates_without_evaluation() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on(
                StageKind::Classify,
                r#"{"category": "security", "priority": "high"}"#,
            )
            .on(StageKind::Respond, "Passwords need at least 12 characters.")
            .on(
                StageKind::Evaluate,
                r#"{"approve": true, "reason": "fine"}"#,
            )
            .on(
                StageKind::Escalate,
                "Customer asks about password rules; security team to confirm.",
            ),
    );

    let outcome = pipeline(&generator, seeded_index())
        .handle(&Ticket::new("What are your password rules?"))
        .await
        .expect("security ticket should complete");

    assert!(generator.calls_for(StageKind::Evaluate).is_empty());
    match &outcome.disposition {
        Disposition::Escalated { note, reason } => {
            assert_eq!(reason, "Category 'security' requires manual review.");
            assert!(note.contains("security team"));
        }
        other => panic!("expected escalation, got {other:?}"),
    }

    let escalate = generator.calls_for(StageKind::Escalate);
    assert_eq!(escalate.len(), 1);
    assert!(escalate[0]
        .user_prompt
        .contains("Reason: Category 'security' requires manual review."));
}

#[tokio::test]
async fn prose_classification_fails_ticket_and_batch_continues() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .classify_when("refund", "This looks like a billing question to me.")
            .on(
                StageKind::Classify,
                r#"{"category": "billing", "priority": "low"}"#,
            )
            .on(
                StageKind::Respond,
                "A 5% processing fee applies to all transactions.",
            )
            .on(
                StageKind::Evaluate,
                r#"{"approve": true, "reason": "Correct."}"#,
            ),
    );

    let results = pipeline(&generator, seeded_index())
        .run_batch(&[
            Ticket::new(REFUND_TICKET),
            Ticket::new("Why did I get charged an extra 5% fee?"),
        ])
        .await;

    assert_eq!(results.len(), 2);
    let failure = results[0].as_ref().unwrap_err();
    assert_eq!(failure.state, TicketState::Start);
    assert!(failure.error.is_malformed_output());
    assert_eq!(
        failure.raw_output(),
        Some("This looks like a billing question to me.")
    );

    let second = results[1].as_ref().expect("second ticket should complete");
    assert!(second.disposition.is_approved());
    assert_eq!(second.passages[0].id, "billing-3");
}

#[tokio::test]
async fn unreadable_evaluation_escalates() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on(
                StageKind::Classify,
                r#"{"category": "billing", "priority": "low"}"#,
            )
            .on(StageKind::Respond, "Renewals are automatic.")
            .on(StageKind::Evaluate, "Looks great, approve it.")
            .on(StageKind::Escalate, "Please review the renewal answer."),
    );

    let outcome = pipeline(&generator, seeded_index())
        .handle(&Ticket::new("Will my subscription renew automatically?"))
        .await
        .unwrap();

    assert_eq!(
        outcome.disposition,
        Disposition::Escalated {
            note: "Please review the renewal answer.".into(),
            reason: EVALUATOR_REJECTION_REASON.into(),
        }
    );
    let evaluation = outcome.evaluation.unwrap();
    assert!(!evaluation.approve);
}

#[tokio::test]
async fn no_matching_policy_uses_placeholder_context() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on(
                StageKind::Classify,
                r#"{"category": "shipping", "priority": "low"}"#,
            )
            .on(StageKind::Respond, "Orders ship within a week.")
            .on(
                StageKind::Evaluate,
                r#"{"approve": false, "reason": "No policy supports this."}"#,
            )
            .on(
                StageKind::Escalate,
                "Shipping question with no policy coverage.",
            ),
    );

    let outcome = pipeline(&generator, seeded_index())
        .handle(&Ticket::new("Where is my parcel?"))
        .await
        .unwrap();

    assert!(outcome.passages.is_empty());
    let respond = generator.calls_for(StageKind::Respond);
    assert!(respond[0].system_prompt.ends_with(NO_POLICY_CONTEXT));
    match outcome.disposition {
        Disposition::Escalated { reason, .. } => assert_eq!(reason, "No policy supports this."),
        other => panic!("expected escalation, got {other:?}"),
    }
}

#[tokio::test]
async fn classifier_without_category_escalates_as_unknown() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on(StageKind::Classify, r#"{"priority": "urgent"}"#)
            .on(StageKind::Respond, "Thanks for reaching out.")
            .on(StageKind::Escalate, "Could not categorise; please triage."),
    );

    let outcome = pipeline(&generator, seeded_index())
        .handle(&Ticket::new("Hello?"))
        .await
        .unwrap();

    assert_eq!(outcome.classification.category, "unknown");
    assert_eq!(outcome.classification.priority, "urgent");
    assert!(generator.calls_for(StageKind::Evaluate).is_empty());
    assert!(outcome.disposition.is_escalated());
}

#[tokio::test]
async fn classifier_and_evaluator_run_at_zero_temperature() {
    let mut config = PipelineConfig::default();
    config.generation.draft_temperature = 0.7;
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on(
                StageKind::Classify,
                r#"{"category": "billing", "priority": "low"}"#,
            )
            .on(StageKind::Respond, "draft")
            .on(StageKind::Evaluate, r#"{"approve": true}"#),
    );

    TicketPipeline::new(&config, generator.clone(), seeded_index())
        .handle(&Ticket::new(REFUND_TICKET))
        .await
        .unwrap();

    for call in generator.calls() {
        let expected = match call.stage {
            StageKind::Classify | StageKind::Evaluate => 0.0,
            StageKind::Respond | StageKind::Escalate => 0.7,
        };
        assert_eq!(call.temperature, expected, "{}", call.stage);
    }
}

#[tokio::test]
async fn configured_top_k_bounds_drafting_context() {
    let mut config = PipelineConfig::default();
    config.retrieval.top_k = 5;
    config.retrieval.rerank_top_n = 5;
    config.validate_retrieval_shape().unwrap();

    let records = (1..=6).map(|i| {
        let text = format!("Fee schedule item {i} is billed monthly.");
        PolicyRecord::new(format!("fee-{i}"), text).with_category("billing")
    });
    let index = Arc::new(InMemoryPolicyIndex::with_records(DEFAULT_NAMESPACE, records));
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on(
                StageKind::Classify,
                r#"{"category": "billing", "priority": "low"}"#,
            )
            .on(StageKind::Respond, "Here is the fee schedule.")
            .on(StageKind::Evaluate, r#"{"approve": true}"#),
    );

    let outcome = TicketPipeline::new(&config, generator.clone(), index)
        .handle(&Ticket::new("Which fees are there?"))
        .await
        .unwrap();

    assert_eq!(outcome.passages.len(), 5);
    let respond = generator.calls_for(StageKind::Respond);
    let prompt = &respond[0].system_prompt;
    assert_eq!(prompt.matches("Fee schedule item").count(), 5);
}

#[tokio::test]
async fn blank_category_is_treated_as_unknown() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on(
                StageKind::Classify,
                r#"{"category": "  ", "priority": "low"}"#,
            )
            .on(StageKind::Respond, "Thanks for reaching out.")
            .on(StageKind::Evaluate, r#"{"approve": true}"#)
            .on(StageKind::Escalate, "Blank category; please triage."),
    );

    let outcome = pipeline(&generator, seeded_index())
        .handle(&Ticket::new("Can I get a refund?"))
        .await
        .unwrap();

    assert_eq!(outcome.classification.category, "unknown");
    assert!(generator.calls_for(StageKind::Evaluate).is_empty());
    match outcome.disposition {
        Disposition::Escalated { reason, .. } => {
            assert_eq!(reason, "Category 'unknown' requires manual review.")
        }
        other => panic!("expected escalation, got {other:?}"),
    }
}
