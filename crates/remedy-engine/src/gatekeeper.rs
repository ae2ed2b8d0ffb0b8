//! Gatekeeper - the last filter before anything reaches the user.
//!
//! Merges round text with attributed sources into a `Response`, drops ad
//! and tracking links, and strips promotional or unsafe lines.

use remedy_shared::{Command, EscalationTicket, Plan, ResearchHints, Response, Source};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::GatekeeperConfig;

/// Shown when filtering leaves nothing
pub const NEUTRAL_NOTICE: &str =
    "No safe summary is available for this result. Please contact support for further help.";

/// Unfiltered response content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub commands: Vec<Command>,
    pub requires_confirmation: bool,
    pub stage: u8,
    pub category: Option<String>,
    pub escalated: bool,
}

impl Draft {
    /// Text only, nothing to confirm
    pub fn message(text: impl Into<String>, category: Option<String>, stage: u8) -> Self {
        Self {
            text: text.into(),
            commands: Vec::new(),
            requires_confirmation: false,
            stage,
            category,
            escalated: false,
        }
    }

    /// A plan awaiting the user's yes or no
    pub fn proposal(plan: &Plan, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            commands: plan.all_commands().cloned().collect(),
            requires_confirmation: !plan.is_empty(),
            stage: plan.stage(),
            category: plan.category().map(|c| c.to_string()),
            escalated: false,
        }
    }

    /// Terminal escalation message, never with commands
    pub fn escalation(ticket: &EscalationTicket, prefix: Option<&str>) -> Self {
        let text = match prefix {
            Some(p) if !p.trim().is_empty() => format!("{}\n\n{}", p.trim(), ticket.message()),
            _ => ticket.message(),
        };
        Self {
            text,
            commands: Vec::new(),
            requires_confirmation: false,
            stage: ticket.final_stage,
            category: Some(ticket.category.clone()),
            escalated: true,
        }
    }
}

/// Sources worth citing: the SOP (if it clears the threshold) and the
/// web hints
pub fn sources_from_hints(hints: &ResearchHints, sop_threshold: f32) -> Vec<Source> {
    let mut sources = Vec::new();
    if let Some(sop) = hints.sop(sop_threshold) {
        sources.push(Source::kb(&sop.id, sop.link.clone()));
    }
    for hint in &hints.web_hints {
        sources.push(Source::web(&hint.title, &hint.url));
    }
    sources
}

/// Response filter
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    blocked_terms: Vec<String>,
    blocked_links: Vec<String>,
}

impl Gatekeeper {
    pub fn new(config: &GatekeeperConfig) -> Self {
        Self {
            blocked_terms: config
                .blocked_terms
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
            blocked_links: config
                .blocked_link_patterns
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    /// Build the user-facing response
    pub fn finalize(&self, draft: Draft, sources: Vec<Source>) -> Response {
        let sources = self.filter_sources(sources);
        let text = self.sanitize(&draft.text);
        info!(
            "Response: {} sources, {} commands, confirm={}, escalated={}",
            sources.len(),
            draft.commands.len(),
            draft.requires_confirmation,
            draft.escalated
        );
        Response {
            diagnosis_or_fix: text,
            commands: if draft.escalated {
                Vec::new()
            } else {
                draft.commands
            },
            sources,
            requires_confirmation: draft.requires_confirmation && !draft.escalated,
            stage: draft.stage,
            category: draft.category,
            escalated: draft.escalated,
        }
    }

    fn is_blocked_link(&self, link: &str) -> bool {
        let link = link.to_lowercase();
        self.blocked_links.iter().any(|p| link.contains(p.as_str()))
    }

    /// Deduplicate, require attribution, drop ad links
    pub fn filter_sources(&self, sources: Vec<Source>) -> Vec<Source> {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for source in sources {
            if source.label.trim().is_empty() {
                debug!("Dropping source without attribution");
                continue;
            }
            if source.kind == remedy_shared::SourceKind::Web && source.link.trim().is_empty() {
                debug!("Dropping web source '{}' without link", source.label);
                continue;
            }
            if self.is_blocked_link(&source.link) {
                debug!("Dropping ad/tracking source {}", source.link);
                continue;
            }
            let key = if source.link.is_empty() {
                (source.kind, source.label.trim().to_lowercase())
            } else {
                (source.kind, source.link.trim().to_lowercase())
            };
            if seen.insert(key) {
                kept.push(source);
            }
        }
        kept
    }

    /// Remove lines with blocked phrasing or links; neutral notice if
    /// nothing is left
    pub fn sanitize(&self, text: &str) -> String {
        let kept: Vec<&str> = text
            .lines()
            .filter(|line| {
                let lower = line.to_lowercase();
                let blocked = self.blocked_terms.iter().any(|t| lower.contains(t.as_str()))
                    || self.blocked_links.iter().any(|p| lower.contains(p.as_str()));
                if blocked {
                    debug!("Stripped line: {}", line);
                }
                !blocked
            })
            .collect();
        let joined = kept.join("\n").trim().to_string();
        if joined.is_empty() {
            NEUTRAL_NOTICE.to_string()
        } else {
            joined
        }
    }
}
