//! Post-fix verification.
//!
//! Turns the results of a fix round into Fixed / StillBroken /
//! Inconclusive. A refused command always yields Inconclusive with the
//! blocked flag set, so a policy refusal is never read as a failed fix.

use anyhow::{Context, Result};
use regex::Regex;
use remedy_shared::{ExecutionOutcome, ExecutionResult, Verdict};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::VerificationCheck;

#[derive(Debug)]
struct CompiledCheck {
    healthy: Option<Regex>,
    broken: Option<Regex>,
}

fn compile(pattern: Option<&str>, category: &str) -> Result<Option<Regex>> {
    pattern
        .map(|p| {
            Regex::new(&format!("(?i){}", p))
                .with_context(|| format!("Invalid verification pattern for '{}': {}", category, p))
        })
        .transpose()
}

/// Per-category verification rules
#[derive(Debug, Default)]
pub struct Verifier {
    checks: HashMap<String, CompiledCheck>,
}

impl Verifier {
    pub fn new(checks: &[VerificationCheck]) -> Result<Self> {
        let mut compiled = HashMap::new();
        for check in checks {
            compiled.insert(
                check.category.clone(),
                CompiledCheck {
                    healthy: compile(check.healthy_pattern.as_deref(), &check.category)?,
                    broken: compile(check.broken_pattern.as_deref(), &check.category)?,
                },
            );
        }
        info!("Verifier loaded {} checks", compiled.len());
        Ok(Self { checks: compiled })
    }

    /// Classify one fix round
    pub fn verify(&self, category: &str, results: &[ExecutionResult]) -> Verdict {
        let verdict = self.classify(category, results);
        debug!("Verify '{}': {} ({})", category, verdict.kind, verdict.reason);
        verdict
    }

    fn classify(&self, category: &str, results: &[ExecutionResult]) -> Verdict {
        if let Some(blocked) = results.iter().find(|r| r.outcome == ExecutionOutcome::Blocked) {
            return Verdict::inconclusive(format!("'{}' was refused by policy", blocked.command))
                .with_blocked(true);
        }

        if let Some(failed) = results
            .iter()
            .find(|r| !r.is_verification && r.outcome != ExecutionOutcome::Succeeded)
        {
            return Verdict::still_broken(format!("'{}' {}", failed.command, failed.outcome));
        }

        let Some(check) = self.checks.get(category) else {
            return Verdict::inconclusive(format!("no verification check for {}", category));
        };

        let Some(verification) = results.iter().find(|r| r.is_verification) else {
            return Verdict::inconclusive("verification check did not run");
        };

        if verification.outcome != ExecutionOutcome::Succeeded {
            return Verdict::still_broken(format!("verification check {}", verification.outcome));
        }

        let output = format!("{}\n{}", verification.stdout, verification.stderr);
        if let Some(broken) = &check.broken {
            if broken.is_match(&output) {
                return Verdict::still_broken(format!(
                    "check output matches /{}/",
                    broken.as_str().trim_start_matches("(?i)")
                ));
            }
        }
        match &check.healthy {
            Some(healthy) if healthy.is_match(&output) => Verdict::fixed(format!(
                "check output matches /{}/",
                healthy.as_str().trim_start_matches("(?i)")
            )),
            Some(_) => Verdict::still_broken("check output does not show a healthy state"),
            None => Verdict::fixed("verification check succeeded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_shared::{RawOutput, VerdictKind};

    fn verifier() -> Verifier {
        Verifier::new(&[
            VerificationCheck {
                category: "wifi".into(),
                command: "netsh wlan show interfaces".into(),
                healthy_pattern: Some(r"State\s*:\s*connected".into()),
                broken_pattern: Some(r"State\s*:\s*disconnected".into()),
            },
            VerificationCheck {
                category: "printer".into(),
                command: "Get-Service Spooler".into(),
                healthy_pattern: None,
                broken_pattern: None,
            },
        ])
        .unwrap()
    }

    fn result(command: &str, exit_code: i32, stdout: &str) -> ExecutionResult {
        ExecutionResult::from_output(
            command,
            RawOutput {
                exit_code,
                stdout: stdout.into(),
                stderr: String::new(),
                duration_ms: 1,
            },
        )
    }

    #[test]
    fn test_healthy_check_is_fixed() {
        let results = vec![
            result("Restart-NetAdapter", 0, ""),
            result("netsh wlan show interfaces", 0, "State : connected").as_verification(),
        ];
        assert_eq!(verifier().verify("wifi", &results).kind, VerdictKind::Fixed);
    }

    #[test]
    fn test_broken_pattern_wins() {
        let results = vec![
            result("Restart-NetAdapter", 0, ""),
            result("netsh wlan show interfaces", 0, "State : disconnected").as_verification(),
        ];
        assert_eq!(verifier().verify("wifi", &results).kind, VerdictKind::StillBroken);
    }

    #[test]
    fn test_failed_fix_command_is_still_broken() {
        let results = vec![result("Restart-NetAdapter", 1, "")];
        assert_eq!(verifier().verify("wifi", &results).kind, VerdictKind::StillBroken);
    }

    #[test]
    fn test_blocked_is_inconclusive_and_flagged() {
        let results = vec![ExecutionResult::blocked("Restart-NetAdapter", "denied")];
        let verdict = verifier().verify("wifi", &results);
        assert_eq!(verdict.kind, VerdictKind::Inconclusive);
        assert!(verdict.blocked);
    }

    #[test]
    fn test_no_check_is_inconclusive() {
        let results = vec![result("Restart-Service bthserv", 0, "")];
        let verdict = verifier().verify("bluetooth", &results);
        assert_eq!(verdict.kind, VerdictKind::Inconclusive);
        assert!(!verdict.blocked);
    }

    #[test]
    fn test_check_without_patterns_uses_exit_code() {
        let results = vec![
            result("Restart-Service Spooler", 0, ""),
            result("Get-Service Spooler", 0, "Running").as_verification(),
        ];
        assert_eq!(verifier().verify("printer", &results).kind, VerdictKind::Fixed);
        let failed = vec![
            result("Restart-Service Spooler", 0, ""),
            result("Get-Service Spooler", 1, "").as_verification(),
        ];
        assert_eq!(verifier().verify("printer", &failed).kind, VerdictKind::StillBroken);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = Verifier::new(&[VerificationCheck {
            category: "wifi".into(),
            command: "x".into(),
            healthy_pattern: Some("(".into()),
            broken_pattern: None,
        }]);
        assert!(err.is_err());
    }
}
