//! Shared types for Remedy components.
//!
//! The pipeline passes these artifacts between stages: a Plan goes to the
//! gate, PolicyDecisions and ExecutionResults come back, the verifier emits
//! a Verdict, and the stage manager answers with a Transition.

pub mod command;
pub mod error;
pub mod execution;
pub mod plan;
pub mod policy;
pub mod research;
pub mod response;
pub mod stage;
pub mod summary;

pub use command::{segments, Command, RiskClass};
pub use error::{RemedyError, Result};
pub use execution::{ExecutionOutcome, ExecutionResult, RawOutput, Verdict, VerdictKind};
pub use plan::{Plan, PlanKind};
pub use policy::{PolicyDecision, PolicyVerdict};
pub use research::{KbMatch, ResearchHints, WebHint, SOP_SCORE_THRESHOLD};
pub use response::{Response, Source, SourceKind};
pub use stage::{
    AttemptRecord, EscalationReason, EscalationTicket, StageState, Transition, DEFAULT_MAX_TIER,
};
pub use summary::{DiagnosisSummary, FixSummary};

/// Application name used for config and state directories
pub const APP_NAME: &str = "remedy";
