//! The single response structure shown at the user boundary.

use crate::command::Command;
use serde::{Deserialize, Serialize};

/// Where an attribution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Kb,
    Web,
}

/// One attributed source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    /// KB entry id or web page title
    pub label: String,
    /// Link to the entry or page (empty for KB entries without one)
    #[serde(default)]
    pub link: String,
}

impl Source {
    pub fn kb(id: impl Into<String>, link: Option<String>) -> Self {
        Self {
            kind: SourceKind::Kb,
            label: id.into(),
            link: link.unwrap_or_default(),
        }
    }

    pub fn web(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Web,
            label: title.into(),
            link: url.into(),
        }
    }

    /// Attribution line: "[kb] TS-104" or "[web] Title (https://...)"
    pub fn attribution(&self) -> String {
        let tag = match self.kind {
            SourceKind::Kb => "kb",
            SourceKind::Web => "web",
        };
        if self.link.is_empty() {
            format!("[{}] {}", tag, self.label)
        } else {
            format!("[{}] {} ({})", tag, self.label, self.link)
        }
    }
}

/// Response contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Diagnosis, fix summary, answer, or escalation message
    pub diagnosis_or_fix: String,
    /// Commands awaiting confirmation (empty when nothing is proposed)
    pub commands: Vec<Command>,
    pub sources: Vec<Source>,
    pub requires_confirmation: bool,
    pub stage: u8,
    pub category: Option<String>,
    pub escalated: bool,
}

impl Response {
    /// Plain text response with nothing to confirm
    pub fn message(text: impl Into<String>, category: Option<String>, stage: u8) -> Self {
        Self {
            diagnosis_or_fix: text.into(),
            commands: Vec::new(),
            sources: Vec::new(),
            requires_confirmation: false,
            stage,
            category,
            escalated: false,
        }
    }
}
