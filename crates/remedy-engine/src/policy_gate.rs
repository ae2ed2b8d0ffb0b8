//! Policy Gate - allow/deny rules for every candidate command
//!
//! Decision order is fixed:
//! 1. Any deny match → Denied (even when an allow rule also matches)
//! 2. Any allow match → Allowed
//! 3. Otherwise → Unmatched, which every caller treats as Denied
//!
//! Matching runs on normalized text: lowercased, whitespace collapsed.
//! A chained command (`;`, `&&`, `||`, `|`, line breaks) is checked one
//! segment at a time: any denied segment denies the whole chain, and the
//! chain is allowed only when every segment is. An allow rule authored as
//! a pipeline covers a chain with the same number of segments.
//! The gate holds no mutable state; sessions share one snapshot via Arc.

use anyhow::{Context, Result};
use regex::Regex;
use remedy_shared::{segments, Plan, PolicyDecision, PolicyVerdict, RemedyError};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::PolicyConfig;

/// Lowercase, trim, and collapse runs of whitespace to one space
pub fn normalize(command: &str) -> String {
    command
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One authored rule, independent of how it matches
pub trait CommandMatcher: fmt::Debug + Send + Sync {
    /// Test against already-normalized command text
    fn matches(&self, normalized: &str) -> bool;

    /// Rule text as authored, for reporting
    fn rule(&self) -> &str;

    /// Shell segments the rule spans; more than one for pipeline rules
    fn segment_count(&self) -> usize {
        segments(self.rule()).len().max(1)
    }
}

/// Whole-command equality
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    rule: String,
    pattern: String,
}

impl ExactMatcher {
    pub fn new(rule: &str, pattern: &str) -> Self {
        Self {
            rule: rule.to_string(),
            pattern: normalize(pattern),
        }
    }
}

impl CommandMatcher for ExactMatcher {
    fn matches(&self, normalized: &str) -> bool {
        normalized == self.pattern
    }

    fn rule(&self) -> &str {
        &self.rule
    }
}

/// Pattern appears anywhere in the command
#[derive(Debug, Clone)]
pub struct SubstringMatcher {
    rule: String,
    pattern: String,
}

impl SubstringMatcher {
    pub fn new(rule: &str, pattern: &str) -> Self {
        Self {
            rule: rule.to_string(),
            pattern: normalize(pattern),
        }
    }
}

impl CommandMatcher for SubstringMatcher {
    fn matches(&self, normalized: &str) -> bool {
        !self.pattern.is_empty() && normalized.contains(&self.pattern)
    }

    fn rule(&self) -> &str {
        &self.rule
    }
}

/// fnmatch-style glob over the whole command: `*`, `?`, `[seq]`, `[!seq]`
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    rule: String,
    regex: Regex,
}

impl GlobMatcher {
    pub fn new(rule: &str, pattern: &str) -> std::result::Result<Self, RemedyError> {
        let source = glob_to_regex(&normalize(pattern));
        let regex = Regex::new(&source)
            .map_err(|e| RemedyError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        Ok(Self {
            rule: rule.to_string(),
            regex,
        })
    }
}

impl CommandMatcher for GlobMatcher {
    fn matches(&self, normalized: &str) -> bool {
        self.regex.is_match(normalized)
    }

    fn rule(&self) -> &str {
        &self.rule
    }
}

/// Translate a glob into an anchored regex
fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("(?s)^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // Find the closing bracket; a leading ']' is literal
                let mut j = i + 1;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str("\\[");
                } else {
                    let mut class = String::from("[");
                    let mut k = i + 1;
                    if chars[k] == '!' {
                        class.push('^');
                        k += 1;
                    }
                    let start = k;
                    while k < j {
                        let c = chars[k];
                        // Set operators (`&&`, `--`, `~~`) must stay literal
                        let literal_dash = c == '-'
                            && (k == start
                                || k + 1 == j
                                || chars[k - 1] == '-'
                                || chars[k + 1] == '-');
                        if matches!(c, '\\' | '[' | ']' | '&' | '~')
                            || (c == '^' && class.len() == 1)
                            || literal_dash
                        {
                            class.push('\\');
                        }
                        class.push(c);
                        k += 1;
                    }
                    class.push(']');
                    out.push_str(&class);
                    i = j;
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Parse an authored rule into a matcher.
///
/// `exact:…`, `contains:…`, `glob:…`; anything else is a glob.
pub fn parse_rule(rule: &str) -> std::result::Result<Box<dyn CommandMatcher>, RemedyError> {
    let trimmed = rule.trim();
    if trimmed.is_empty() {
        return Err(RemedyError::Config("empty policy rule".to_string()));
    }

    if let Some(pattern) = trimmed.strip_prefix("exact:") {
        Ok(Box::new(ExactMatcher::new(trimmed, pattern)))
    } else if let Some(pattern) = trimmed.strip_prefix("contains:") {
        Ok(Box::new(SubstringMatcher::new(trimmed, pattern)))
    } else if let Some(pattern) = trimmed.strip_prefix("glob:") {
        Ok(Box::new(GlobMatcher::new(trimmed, pattern)?))
    } else {
        Ok(Box::new(GlobMatcher::new(trimmed, trimmed)?))
    }
}

/// An ordered list of matchers
#[derive(Debug, Default)]
pub struct RuleSet {
    matchers: Vec<Box<dyn CommandMatcher>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every rule; one bad rule fails the whole set
    pub fn from_rules<S: AsRef<str>>(rules: &[S]) -> std::result::Result<Self, RemedyError> {
        let mut set = Self::new();
        for rule in rules {
            set.push(parse_rule(rule.as_ref())?);
        }
        Ok(set)
    }

    pub fn push(&mut self, matcher: Box<dyn CommandMatcher>) {
        self.matchers.push(matcher);
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Rules matching the normalized command, in authored order
    pub fn matching(&self, normalized: &str) -> Vec<String> {
        self.matchers
            .iter()
            .filter(|m| m.matches(normalized))
            .map(|m| m.rule().to_string())
            .collect()
    }

    /// Rules spanning exactly `count` segments that match the whole chain
    fn matching_chain(&self, normalized: &str, count: usize) -> Vec<String> {
        self.matchers
            .iter()
            .filter(|m| m.segment_count() == count && m.matches(normalized))
            .map(|m| m.rule().to_string())
            .collect()
    }
}

fn merge(into: &mut Vec<String>, rules: Vec<String>) {
    for rule in rules {
        if !into.contains(&rule) {
            into.push(rule);
        }
    }
}

/// Evaluate one command against allow and deny rule sets.
///
/// Pure: same inputs, same decision, no side effects.
pub fn evaluate(command: &str, allow: &RuleSet, deny: &RuleSet) -> PolicyDecision {
    let normalized = normalize(command);
    let parts = segments(command);

    let mut matched_deny = deny.matching(&normalized);
    let mut matched_allow = Vec::new();
    let mut every_segment_allowed = !parts.is_empty();

    for part in &parts {
        let part = normalize(part);
        merge(&mut matched_deny, deny.matching(&part));
        let allowed = allow.matching(&part);
        if allowed.is_empty() {
            every_segment_allowed = false;
        }
        merge(&mut matched_allow, allowed);
    }

    let chain_allow = if parts.len() > 1 {
        allow.matching_chain(&normalized, parts.len())
    } else {
        Vec::new()
    };
    let chain_allowed = !chain_allow.is_empty();
    merge(&mut matched_allow, chain_allow);

    let verdict = if !matched_deny.is_empty() {
        PolicyVerdict::Denied
    } else if every_segment_allowed || chain_allowed {
        PolicyVerdict::Allowed
    } else {
        PolicyVerdict::Unmatched
    };

    PolicyDecision {
        command: command.to_string(),
        verdict,
        matched_deny,
        matched_allow,
    }
}

/// Read-only policy snapshot used for a whole session
#[derive(Debug, Default)]
pub struct PolicyGate {
    allow: RuleSet,
    deny: RuleSet,
}

/// On-disk list format: `{"commands": ["pattern", ...]}`
#[derive(Debug, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    commands: Vec<String>,
}

impl PolicyGate {
    pub fn new(allow: RuleSet, deny: RuleSet) -> Self {
        Self { allow, deny }
    }

    /// Build from authored rule lists
    pub fn from_rules<S: AsRef<str>>(
        allow: &[S],
        deny: &[S],
    ) -> std::result::Result<Self, RemedyError> {
        Ok(Self::new(RuleSet::from_rules(allow)?, RuleSet::from_rules(deny)?))
    }

    /// Build from config: inline rules plus the optional JSON list files
    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        let mut allow = config.allow.clone();
        let mut deny = config.deny.clone();

        if let Some(path) = &config.allow_file {
            allow.extend(load_rule_file(path)?);
        }
        if let Some(path) = &config.deny_file {
            deny.extend(load_rule_file(path)?);
        }

        let gate = Self::from_rules(&allow, &deny).context("Invalid policy rule")?;
        info!(
            "Policy loaded: {} allow rules, {} deny rules",
            gate.allow.len(),
            gate.deny.len()
        );
        if gate.allow.is_empty() {
            warn!("Allowlist is empty; every command will be refused");
        }
        Ok(gate)
    }

    pub fn evaluate(&self, command: &str) -> PolicyDecision {
        let decision = evaluate(command, &self.allow, &self.deny);
        debug!("Policy: '{}' -> {}", command, decision.verdict);
        decision
    }

    /// Evaluate every command a plan could run, verification included, before
    /// anything executes.
    pub fn audit(&self, plan: &Plan) -> Vec<PolicyDecision> {
        plan.all_commands()
            .map(|c| self.evaluate(&c.text))
            .collect()
    }

    /// True when every command in the plan would be allowed
    pub fn permits_plan(&self, plan: &Plan) -> bool {
        self.audit(plan).iter().all(|d| d.permits_execution())
    }
}

/// Load a JSON rule list. A missing file is an empty list.
pub fn load_rule_file(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        warn!("Policy file {} not found, treating as empty", path.display());
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file {}", path.display()))?;
    let file: PolicyFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse policy file {}", path.display()))?;
    Ok(file.commands)
}
