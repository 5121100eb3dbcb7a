//! Ticket state machine: explicit states and legal transition guards.
//!
//! Every pipeline run starts at `Start` and terminates at `Done` (with a
//! disposition) or `Failed` (fatal condition for the ticket). The graph is
//! acyclic, so a run visits at most four stages.
//!
//! ```text
//! Start → Classified → Drafted → AutoEscalate → Escalated → Done
//!                              ↘ Evaluated    ↗
//!                                           ↘ Approved → Done
//! any non-terminal → Failed
//! ```

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    /// Ticket received, nothing run yet.
    Start,
    /// Classifier produced category and priority.
    Classified,
    /// Responder produced a draft.
    Drafted,
    /// Category requires manual review; evaluator skipped.
    AutoEscalate,
    /// Evaluator judged the draft.
    Evaluated,
    /// Escalation note is being (or has been) written.
    Escalated,
    /// Draft approved for the customer.
    Approved,
    /// Disposition produced. Terminal.
    Done,
    /// Fatal condition for this ticket. Terminal.
    Failed,
}

impl TicketState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::Classified => write!(f, "Classified"),
            Self::Drafted => write!(f, "Drafted"),
            Self::AutoEscalate => write!(f, "AutoEscalate"),
            Self::Evaluated => write!(f, "Evaluated"),
            Self::Escalated => write!(f, "Escalated"),
            Self::Approved => write!(f, "Approved"),
            Self::Done => write!(f, "Done"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

fn is_legal_transition(from: TicketState, to: TicketState) -> bool {
    use TicketState::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Start, Classified)
            | (Classified, Drafted)
            | (Drafted, AutoEscalate)
            | (Drafted, Evaluated)
            | (AutoEscalate, Escalated)
            | (Evaluated, Escalated)
            | (Evaluated, Approved)
            | (Escalated, Done)
            | (Approved, Done)
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: TicketState,
    pub to: TicketState,
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: TicketState,
    pub to: TicketState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks one ticket's progress and keeps the full transition log.
pub struct StateMachine {
    current: TicketState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: TicketState::Start,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> TicketState {
        self.current
    }

    /// Move to `to` if the edge exists.
    pub fn advance(
        &mut self,
        to: TicketState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(from = %self.current, to = %to, "State transition");

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(TicketState::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }

    /// `Start → Classified → ... (Nms)`
    pub fn summary(&self) -> String {
        let path = std::iter::once(TicketState::Start)
            .chain(self.transitions.iter().map(|t| t.to))
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" → ");
        format!("{path} ({}ms)", self.created_at.elapsed().as_millis())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
