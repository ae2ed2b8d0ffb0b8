//! Plan proposer interface.
//!
//! A proposer suggests candidate commands for a round. It never decides
//! what runs: the planner filters every proposal through the policy gate
//! and the risk rules before anything reaches the user.

use async_trait::async_trait;
use remedy_shared::{KbMatch, PlanKind, WebHint};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::summary::asks_system_overview;

/// Fallback category for issues that match nothing specific
pub const GENERAL_CATEGORY: &str = "general";

/// Category for greetings and small talk
pub const CHITCHAT_CATEGORY: &str = "chitchat";

/// Category for questions answered from system facts
pub const SYSTEM_INFO_CATEGORY: &str = "system_info";

/// What the proposer is asked for
#[derive(Debug, Clone)]
pub struct ProposalRequest {
    pub kind: PlanKind,
    pub issue: String,
    pub category: String,
    /// Fix tier (0 for diagnostic rounds)
    pub stage: u8,
    pub sop: Option<KbMatch>,
    pub web_hints: Vec<WebHint>,
    /// Diagnostic findings, present for fix rounds
    pub findings: Option<String>,
    /// Commands already tried or refused; proposals must not repeat them
    pub avoid: Vec<String>,
}

impl ProposalRequest {
    pub fn diagnostic(issue: &str, category: &str) -> Self {
        Self {
            kind: PlanKind::Diagnostic,
            issue: issue.to_string(),
            category: category.to_string(),
            stage: 0,
            sop: None,
            web_hints: Vec::new(),
            findings: None,
            avoid: Vec::new(),
        }
    }

    pub fn fix(issue: &str, category: &str, stage: u8, findings: &str) -> Self {
        Self {
            kind: PlanKind::Fix,
            issue: issue.to_string(),
            category: category.to_string(),
            stage,
            sop: None,
            web_hints: Vec::new(),
            findings: Some(findings.to_string()),
            avoid: Vec::new(),
        }
    }

    pub fn with_research(mut self, sop: Option<KbMatch>, web_hints: Vec<WebHint>) -> Self {
        self.sop = sop;
        self.web_hints = web_hints;
        self
    }

    pub fn with_avoid(mut self, avoid: Vec<String>) -> Self {
        self.avoid = avoid;
        self
    }
}

/// One suggested command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedCommand {
    pub command: String,
    #[serde(default)]
    pub description: String,
}

impl ProposedCommand {
    pub fn new(command: &str, description: &str) -> Self {
        Self {
            command: command.to_string(),
            description: description.to_string(),
        }
    }
}

/// A proposer's answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proposal {
    pub summary: String,
    pub commands: Vec<ProposedCommand>,
}

/// Suggests categories and commands
#[async_trait]
pub trait PlanProposer: Send + Sync {
    /// Classify an issue into a fault category. `None` means the
    /// proposer has no opinion and the keyword classifier decides.
    async fn classify(&self, issue: &str) -> Option<String>;

    async fn propose(&self, request: &ProposalRequest) -> remedy_shared::Result<Proposal>;
}

/// Map proposer-specific labels onto the engine's category names
pub fn normalize_category(label: &str) -> String {
    let label = label.trim().to_lowercase();
    match label.as_str() {
        "" => GENERAL_CATEGORY.to_string(),
        "network" | "wi-fi" | "wireless" | "internet" => "wifi".to_string(),
        "install_app" | "installation" => "install".to_string(),
        "blue screen" | "bluescreen" => "bsod".to_string(),
        "small_talk" | "greeting" => CHITCHAT_CATEGORY.to_string(),
        other => other.replace([' ', '-'], "_"),
    }
}

/// Keyword classification used when the proposer gives no category
pub fn classify_by_keywords(issue: &str) -> String {
    let text = issue.to_lowercase();
    let rules: &[(&[&str], &str)] = &[
        (&["password", "sign in", "login", "locked out"], "account"),
        (&["blue screen", "bluescreen", "bsod", "stop code"], "bsod"),
        (&["wifi", "wi-fi", "wireless", "internet", "network"], "wifi"),
        (&["bluetooth", "blue tooth", "blutooth", "headset", "pair"], "bluetooth"),
        (&["printer", "print job", "spooler"], "printer"),
        (&["install", "setup", "uninstall"], "install"),
        (&["slow", "performance", "lag", "freez", "high cpu"], "performance"),
    ];
    for (needles, category) in rules {
        if needles.iter().any(|n| text.contains(n)) {
            return category.to_string();
        }
    }
    if is_system_info_query(&text) {
        return SYSTEM_INFO_CATEGORY.to_string();
    }
    if is_chitchat(&text) {
        return CHITCHAT_CATEGORY.to_string();
    }
    GENERAL_CATEGORY.to_string()
}

/// Questions about machine facts rather than faults
pub fn is_system_info_query(text: &str) -> bool {
    let text = text.to_lowercase();
    let markers = [
        "os build",
        "os version",
        "windows version",
        "which version",
        "ip address",
        "my ip",
        "cpu",
        "processor",
        "ram",
        "memory",
        "system info",
        "computer name",
        "hostname",
        "disk space",
        "free space",
        "storage",
        "disk usage",
    ];
    let asks = text.contains('?')
        || ["what", "which", "how much", "show", "tell me"]
            .iter()
            .any(|w| text.contains(w));
    (asks && markers.iter().any(|m| text.contains(m))) || asks_system_overview(&text)
}

fn is_chitchat(text: &str) -> bool {
    let trimmed = text.trim().trim_end_matches(['!', '.', '?']);
    let greetings = [
        "hi", "hello", "hey", "thanks", "thank you", "good morning", "good evening", "bye",
        "how are you",
    ];
    greetings.iter().any(|g| trimmed == *g || trimmed.starts_with(&format!("{} ", g)))
        && trimmed.split_whitespace().count() <= 4
}

/// Pull the first JSON object out of model output.
///
/// Accepts bare JSON, fenced code blocks, or JSON embedded in prose.
/// Returns `Value::Null` when nothing parses.
pub fn extract_json(text: &str) -> Value {
    let text = text.trim();
    if text.is_empty() {
        return Value::Null;
    }
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        if v.is_object() {
            return v;
        }
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => {
            serde_json::from_str::<Value>(&text[start..=end]).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

/// Read `{"summary": "...", "commands": [...]}` leniently. Commands may
/// be objects with `command`/`description` or bare strings.
pub fn proposal_from_value(value: &Value) -> Proposal {
    let summary = value
        .get("summary")
        .and_then(|s| s.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    let commands = value
        .get("commands")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(ProposedCommand::new(s.trim(), "")),
                    Value::Object(_) => {
                        let command = item.get("command").and_then(|c| c.as_str())?;
                        let description = item
                            .get("description")
                            .and_then(|d| d.as_str())
                            .unwrap_or("");
                        Some(ProposedCommand::new(command.trim(), description.trim()))
                    }
                    _ => None,
                })
                .filter(|c| !c.command.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Proposal { summary, commands }
}
