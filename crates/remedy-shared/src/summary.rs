//! Derived text artifacts for a finished round.

use crate::execution::{ExecutionOutcome, ExecutionResult, Verdict};
use serde::{Deserialize, Serialize};

/// Findings from a diagnostic round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisSummary {
    pub category: Option<String>,
    pub findings: String,
    /// Per-step status lines ("1. Get-NetAdapter [succeeded]")
    pub steps: Vec<String>,
    pub blocked_commands: Vec<String>,
}

/// Outcome of a fix round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixSummary {
    pub category: String,
    pub stage: u8,
    pub verdict: Verdict,
    pub text: String,
    pub steps: Vec<String>,
}

/// Numbered status lines for a result list
pub fn step_lines(results: &[ExecutionResult]) -> Vec<String> {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let status = match r.outcome {
                ExecutionOutcome::Blocked => format!("BLOCKED ({})", r.stderr),
                other => other.as_str().to_uppercase(),
            };
            format!("{}. {} [{}]", i + 1, r.command, status)
        })
        .collect()
}
