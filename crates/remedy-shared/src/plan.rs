//! Plans: the ordered command list built for one planning round.

use crate::command::{Command, RiskClass};
use serde::{Deserialize, Serialize};

/// What a plan is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// Read-only investigation of the reported problem
    Diagnostic,
    /// Remediation attempt for a fault category at a stage tier
    Fix,
    /// Textual answer, no commands
    Answer,
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Diagnostic => write!(f, "diagnostic"),
            Self::Fix => write!(f, "fix"),
            Self::Answer => write!(f, "answer"),
        }
    }
}

/// An ordered, immutable sequence of commands plus a summary.
///
/// Fields are private so a plan cannot be reordered or extended after
/// the policy audit has seen it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    id: String,
    kind: PlanKind,
    summary: String,
    commands: Vec<Command>,
    category: Option<String>,
    stage: u8,
    verification: Option<Command>,
}

impl Plan {
    /// Build a plan. Commands are stably sorted by ascending risk.
    pub fn new(
        kind: PlanKind,
        summary: impl Into<String>,
        mut commands: Vec<Command>,
        category: Option<String>,
        stage: u8,
    ) -> Self {
        commands.retain(|c| !c.is_empty());
        commands.sort_by_key(|c| c.risk);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            summary: summary.into(),
            commands,
            category,
            stage,
            verification: None,
        }
    }

    /// A plan that only carries text
    pub fn answer(summary: impl Into<String>, category: Option<String>, stage: u8) -> Self {
        Self::new(PlanKind::Answer, summary, Vec::new(), category, stage)
    }

    /// Attach the read-only check that runs after all fix commands succeed
    pub fn with_verification(mut self, check: Command) -> Self {
        self.verification = Some(check);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn stage(&self) -> u8 {
        self.stage
    }

    pub fn verification(&self) -> Option<&Command> {
        self.verification.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn has_mutating(&self) -> bool {
        self.commands.iter().any(|c| c.risk == RiskClass::Mutating)
    }

    /// Every command the executor may run for this plan, verification last
    pub fn all_commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().chain(self.verification.iter())
    }
}
