//! Stage types for the per-category retry ladder.
//!
//! Every fault category climbs a bounded ladder of fix tiers.
//! When the ladder runs out, the category is escalated and an
//! EscalationTicket records what was tried.

use crate::execution::{ExecutionResult, VerdictKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default highest fix tier (tiers are 0-based, so three attempts)
pub const DEFAULT_MAX_TIER: u8 = 2;

/// Why a category was escalated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Verification still failing at the last tier
    TiersExhausted,
    /// The planner could not produce any allowed mutating command
    NoAllowedCommands,
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TiersExhausted => write!(f, "all fix tiers exhausted"),
            Self::NoAllowedCommands => write!(f, "no allowed fix commands"),
        }
    }
}

/// One executed fix attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub stage: u8,
    pub plan_id: String,
    pub commands: Vec<String>,
    pub results: Vec<ExecutionResult>,
    pub verdict: VerdictKind,
}

/// Terminal artifact for an escalated category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationTicket {
    pub ticket_id: String,
    pub session_id: String,
    pub category: String,
    pub reason: EscalationReason,
    /// Tier that was active when escalation happened
    pub final_stage: u8,
    pub history: Vec<AttemptRecord>,
    /// Commands the policy refused along the way
    #[serde(default)]
    pub blocked_commands: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl EscalationTicket {
    pub fn new(
        session_id: &str,
        category: &str,
        reason: EscalationReason,
        final_stage: u8,
        history: Vec<AttemptRecord>,
        blocked_commands: Vec<String>,
    ) -> Self {
        Self {
            ticket_id: format!("esc-{}", uuid::Uuid::new_v4()),
            session_id: session_id.to_string(),
            category: category.to_string(),
            reason,
            final_stage,
            history,
            blocked_commands,
            created_at: Utc::now(),
        }
    }

    /// User-facing explanation
    pub fn message(&self) -> String {
        let attempts = self.history.len();
        format!(
            "Automatic remediation for '{}' has stopped ({}) after {} attempt{}. \
             A technician needs to take over; ticket {} lists everything that was tried.",
            self.category,
            self.reason,
            attempts,
            if attempts == 1 { "" } else { "s" },
            self.ticket_id
        )
    }
}

/// Where a category sits on its ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageState {
    Stage { tier: u8 },
    Escalated { ticket: Box<EscalationTicket> },
}

impl StageState {
    pub fn initial() -> Self {
        StageState::Stage { tier: 0 }
    }

    /// Current tier; an escalated category reports its final tier
    pub fn tier(&self) -> u8 {
        match self {
            StageState::Stage { tier } => *tier,
            StageState::Escalated { ticket } => ticket.final_stage,
        }
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self, StageState::Escalated { .. })
    }

    pub fn ticket(&self) -> Option<&EscalationTicket> {
        match self {
            StageState::Escalated { ticket } => Some(ticket),
            StageState::Stage { .. } => None,
        }
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageState::Stage { tier } => write!(f, "stage {}", tier),
            StageState::Escalated { ticket } => write!(f, "escalated at stage {}", ticket.final_stage),
        }
    }
}

/// What the stage manager decided after a verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// Verifier reported the fault fixed; tier unchanged
    Resolved { tier: u8 },
    /// Moved to the next tier
    Advanced { from: u8, to: u8 },
    /// Nothing changed (inconclusive, blocked, or declined)
    Unchanged { tier: u8 },
    /// Category is now terminal
    Escalated { ticket: Box<EscalationTicket> },
}

impl Transition {
    pub fn tier(&self) -> u8 {
        match self {
            Transition::Resolved { tier } | Transition::Unchanged { tier } => *tier,
            Transition::Advanced { to, .. } => *to,
            Transition::Escalated { ticket } => ticket.final_stage,
        }
    }
}
