//! Execution results and verification verdicts.

use serde::{Deserialize, Serialize};

use crate::error::RemedyError;

/// What the execution collaborator hands back for one command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Outcome of a single command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Ran and exited 0
    Succeeded,
    /// Ran and exited non-zero, or could not be spawned
    Failed,
    /// Exceeded the per-command bound
    TimedOut,
    /// Refused by the policy re-check; never ran
    Blocked,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded result of one command in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Command text
    pub command: String,
    /// Exit code (None if the command never ran or was killed)
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    pub outcome: ExecutionOutcome,
    /// Set for the verification command appended to fix plans
    #[serde(default)]
    pub is_verification: bool,
}

impl ExecutionResult {
    /// Classify collaborator output into a result
    pub fn from_output(command: &str, output: RawOutput) -> Self {
        let outcome = if output.exit_code == 0 {
            ExecutionOutcome::Succeeded
        } else {
            ExecutionOutcome::Failed
        };
        Self {
            command: command.to_string(),
            exit_code: Some(output.exit_code),
            stdout: output.stdout,
            stderr: output.stderr,
            elapsed_ms: output.duration_ms,
            outcome,
            is_verification: false,
        }
    }

    pub fn blocked(command: &str, reason: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: reason.to_string(),
            elapsed_ms: 0,
            outcome: ExecutionOutcome::Blocked,
            is_verification: false,
        }
    }

    pub fn timed_out(command: &str, elapsed_ms: u64) -> Self {
        Self {
            command: command.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: format!("timed out after {}ms", elapsed_ms),
            elapsed_ms,
            outcome: ExecutionOutcome::TimedOut,
            is_verification: false,
        }
    }

    pub fn spawn_failed(command: &str, error: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: error.to_string(),
            elapsed_ms: 0,
            outcome: ExecutionOutcome::Failed,
            is_verification: false,
        }
    }

    pub fn as_verification(mut self) -> Self {
        self.is_verification = true;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == ExecutionOutcome::Succeeded
    }

    /// Why this result stopped the plan; `None` when it succeeded
    pub fn halt_error(&self) -> Option<RemedyError> {
        let command = self.command.clone();
        match self.outcome {
            ExecutionOutcome::Succeeded => None,
            ExecutionOutcome::Failed => Some(RemedyError::ExecutionFailure {
                command,
                exit_code: self.exit_code.unwrap_or(-1),
            }),
            ExecutionOutcome::TimedOut => Some(RemedyError::Timeout {
                command,
                timeout_ms: self.elapsed_ms,
            }),
            ExecutionOutcome::Blocked => Some(RemedyError::PolicyViolation {
                command,
                verdict: self.stderr.clone(),
            }),
        }
    }

    /// Output shown to the user: stdout, or stderr when stdout is empty
    pub fn display_output(&self) -> &str {
        if !self.stdout.trim().is_empty() {
            self.stdout.trim()
        } else if !self.stderr.trim().is_empty() {
            self.stderr.trim()
        } else {
            "No output."
        }
    }
}

/// Verifier classification of a fault category after execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Fixed,
    StillBroken,
    Inconclusive,
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::StillBroken => write!(f, "still broken"),
            Self::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// Verdict plus the signal it was derived from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub reason: String,
    /// True when any command in the attempt was refused by policy
    #[serde(default)]
    pub blocked: bool,
}

impl Verdict {
    pub fn fixed(reason: impl Into<String>) -> Self {
        Self {
            kind: VerdictKind::Fixed,
            reason: reason.into(),
            blocked: false,
        }
    }

    pub fn still_broken(reason: impl Into<String>) -> Self {
        Self {
            kind: VerdictKind::StillBroken,
            reason: reason.into(),
            blocked: false,
        }
    }

    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Self {
            kind: VerdictKind::Inconclusive,
            reason: reason.into(),
            blocked: false,
        }
    }

    pub fn with_blocked(mut self, blocked: bool) -> Self {
        self.blocked = blocked;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halt_error_names_the_cause() {
        let failed = ExecutionResult::from_output(
            "Restart-Service WlanSvc",
            RawOutput {
                exit_code: 5,
                ..RawOutput::default()
            },
        );
        assert!(matches!(
            failed.halt_error(),
            Some(RemedyError::ExecutionFailure { exit_code: 5, .. })
        ));

        let slow = ExecutionResult::timed_out("netsh winsock reset", 60000);
        let err = slow.halt_error().unwrap();
        assert!(matches!(err, RemedyError::Timeout { timeout_ms: 60000, .. }));
        assert!(err.to_string().contains("netsh winsock reset"));

        let refused = ExecutionResult::blocked("Stop-Computer", "not on the allowlist");
        assert!(matches!(
            refused.halt_error(),
            Some(RemedyError::PolicyViolation { .. })
        ));

        let ok = ExecutionResult::from_output("Get-NetAdapter", RawOutput::default());
        assert!(ok.halt_error().is_none());
    }

    #[test]
    fn test_from_output_zero_exit() {
        let result = ExecutionResult::from_output(
            "Get-NetAdapter",
            RawOutput {
                exit_code: 0,
                stdout: "Wi-Fi Up".into(),
                stderr: String::new(),
                duration_ms: 12,
            },
        );
        assert!(result.succeeded());
        assert_eq!(result.display_output(), "Wi-Fi Up");
        assert_eq!(result.elapsed_ms, 12);
    }

    #[test]
    fn test_from_output_nonzero_is_failed() {
        let result = ExecutionResult::from_output(
            "Restart-Service WlanSvc",
            RawOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "Access denied".into(),
                duration_ms: 3,
            },
        );
        assert_eq!(result.outcome, ExecutionOutcome::Failed);
        assert_eq!(result.display_output(), "Access denied");
    }

    #[test]
    fn test_blocked_has_no_exit_code() {
        let result = ExecutionResult::blocked("format c:", "blocked by denylist");
        assert_eq!(result.exit_code, None);
        assert_eq!(result.outcome, ExecutionOutcome::Blocked);
    }
}
