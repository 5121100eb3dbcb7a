//! Support ticket pipeline: classify, draft from policy context, review,
//! and either approve or escalate to a human.
//!
//! Stages talk to the outside world only through two ports:
//! [`generation::Generator`] and [`retrieval::PolicyIndex`].

pub mod agents;
pub mod config;
pub mod errors;
pub mod generation;
pub mod parser;
pub mod pipeline;
pub mod policies;
pub mod policy;
pub mod prompts;
pub mod report;
pub mod resilience;
pub mod retrieval;
pub mod state_machine;
pub mod types;

pub use errors::PipelineError;
pub use pipeline::{TicketFailure, TicketOutcome, TicketPipeline};
pub use types::{Classification, Disposition, Ticket};
