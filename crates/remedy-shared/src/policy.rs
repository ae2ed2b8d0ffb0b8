//! Policy verdicts produced by the gate.

use serde::{Deserialize, Serialize};

/// Per-command verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyVerdict {
    /// Matched an allow rule and no deny rule
    Allowed,
    /// Matched a deny rule (wins over any allow match)
    Denied,
    /// Matched nothing; callers treat it as denied
    Unmatched,
}

impl std::fmt::Display for PolicyVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allowed => write!(f, "allowed"),
            Self::Denied => write!(f, "denied"),
            Self::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// Result of evaluating one command against the rule sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Command text as evaluated
    pub command: String,
    pub verdict: PolicyVerdict,
    /// Deny rules that matched
    #[serde(default)]
    pub matched_deny: Vec<String>,
    /// Allow rules that matched
    #[serde(default)]
    pub matched_allow: Vec<String>,
}

impl PolicyDecision {
    /// Only an explicit allow may run. Unmatched fails closed.
    pub fn permits_execution(&self) -> bool {
        self.verdict == PolicyVerdict::Allowed
    }

    /// Short reason for logs and the blocked-command list
    pub fn reason(&self) -> String {
        match self.verdict {
            PolicyVerdict::Allowed => format!("allowed by {}", self.matched_allow.join(", ")),
            PolicyVerdict::Denied => format!("blocked by denylist ({})", self.matched_deny.join(", ")),
            PolicyVerdict::Unmatched => "not on the allowlist".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(verdict: PolicyVerdict) -> PolicyDecision {
        PolicyDecision {
            command: "Get-NetAdapter".into(),
            verdict,
            matched_deny: vec![],
            matched_allow: vec![],
        }
    }

    #[test]
    fn test_only_allowed_permits_execution() {
        assert!(decision(PolicyVerdict::Allowed).permits_execution());
        assert!(!decision(PolicyVerdict::Denied).permits_execution());
        assert!(!decision(PolicyVerdict::Unmatched).permits_execution());
    }

    #[test]
    fn test_reason_text() {
        let mut d = decision(PolicyVerdict::Denied);
        d.matched_deny.push("glob:format-*".into());
        assert!(d.reason().contains("format-*"));
        assert_eq!(
            decision(PolicyVerdict::Unmatched).reason(),
            "not on the allowlist"
        );
    }
}
