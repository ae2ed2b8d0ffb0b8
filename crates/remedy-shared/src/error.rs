//! Error types for Remedy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemedyError {
    #[error("Policy violation: '{command}' is {verdict}")]
    PolicyViolation { command: String, verdict: String },

    #[error("Command failed with exit code {exit_code}: {command}")]
    ExecutionFailure { command: String, exit_code: i32 },

    #[error("Command timed out after {timeout_ms}ms: {command}")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("Verification inconclusive for '{category}': {reason}")]
    VerificationInconclusive { category: String, reason: String },

    #[error("Escalation required for '{category}': {reason}")]
    EscalationRequired { category: String, reason: String },

    #[error("Plan {plan_id} has not been confirmed by the user")]
    ConfirmationMissing { plan_id: String },

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RemedyError {
    pub fn code(&self) -> i32 {
        match self {
            RemedyError::PolicyViolation { .. } => -33000,
            RemedyError::ExecutionFailure { .. } => -33001,
            RemedyError::Timeout { .. } => -33002,
            RemedyError::VerificationInconclusive { .. } => -33003,
            RemedyError::EscalationRequired { .. } => -33004,
            RemedyError::ConfirmationMissing { .. } => -33005,
            RemedyError::Collaborator(_) => -33006,
            RemedyError::Config(_) => -33007,
            RemedyError::Io(_) => -33008,
            RemedyError::Json(_) => -32700,
        }
    }
}

pub type Result<T> = std::result::Result<T, RemedyError>;
