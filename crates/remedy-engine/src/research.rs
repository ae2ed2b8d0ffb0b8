//! Research collaborator interface.
//!
//! KB search and web search live outside the engine; the planner only
//! sees `ResearchHints`. This module holds the trait, the query/keyword
//! helpers, and two simple providers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use remedy_shared::{KbMatch, ResearchHints, WebHint};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Lookup service for KB matches and web hints
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Look up hints for an issue. The KB side searches the issue text,
    /// boosted by keywords; the web side uses `web_query`. Failures
    /// degrade to empty hints, never errors.
    async fn lookup(&self, issue: &str, web_query: &str, keywords: &[String]) -> ResearchHints;
}

/// Provider that never returns anything
#[derive(Debug, Default, Clone)]
pub struct NoResearch;

#[async_trait]
impl ResearchProvider for NoResearch {
    async fn lookup(&self, _issue: &str, web_query: &str, _keywords: &[String]) -> ResearchHints {
        ResearchHints {
            query_used: web_query.to_string(),
            ..Default::default()
        }
    }
}

/// Provider backed by a fixed set of entries (offline mode, tests).
///
/// KB entries are scored by keyword overlap with the query; web hints
/// are returned when their title or snippet shares a keyword.
#[derive(Debug, Default, Clone)]
pub struct StaticResearch {
    kb: Vec<KbMatch>,
    web: Vec<WebHint>,
}

/// Keyword boost applied when a KB entry mentions an extracted keyword
const KEYWORD_BOOST: f32 = 0.15;

impl StaticResearch {
    pub fn new(kb: Vec<KbMatch>, web: Vec<WebHint>) -> Self {
        Self { kb, web }
    }

    /// Load `{"kb_matches": [...], "web_hints": [...]}` from JSON
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read hints file {}", path.display()))?;
        let hints: ResearchHints = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse hints file {}", path.display()))?;
        info!(
            "Loaded {} KB entries and {} web hints from {}",
            hints.kb_matches.len(),
            hints.web_hints.len(),
            path.display()
        );
        Ok(Self::new(hints.kb_matches, hints.web_hints))
    }

    fn score(entry: &KbMatch, query_terms: &[String], keywords: &[String]) -> f32 {
        let haystack = format!("{} {}", entry.issue_text, entry.response).to_lowercase();
        let mut score = 0.0;
        if !query_terms.is_empty() {
            let hits = query_terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            score = hits as f32 / query_terms.len() as f32;
        }
        if keywords.iter().any(|k| haystack.contains(k.as_str())) {
            score += KEYWORD_BOOST;
        }
        score
    }
}

#[async_trait]
impl ResearchProvider for StaticResearch {
    async fn lookup(&self, issue: &str, web_query: &str, keywords: &[String]) -> ResearchHints {
        let terms = query_terms(issue);

        let mut kb_matches: Vec<KbMatch> = self
            .kb
            .iter()
            .map(|entry| {
                let mut scored = entry.clone();
                scored.score = Self::score(entry, &terms, keywords);
                scored
            })
            .filter(|m| m.score > 0.0)
            .collect();
        kb_matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        kb_matches.truncate(5);

        let web_hints: Vec<WebHint> = self
            .web
            .iter()
            .filter(|hint| {
                let text = format!("{} {}", hint.title, hint.snippet).to_lowercase();
                keywords.iter().any(|k| text.contains(k.as_str()))
                    || terms.iter().any(|t| text.contains(t.as_str()))
            })
            .take(3)
            .cloned()
            .collect();

        debug!(
            "Static research: {} KB matches, {} web hints for '{}'",
            kb_matches.len(),
            web_hints.len(),
            issue
        );

        ResearchHints {
            kb_matches,
            web_hints,
            query_used: web_query.to_string(),
        }
    }
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "my", "is", "it", "not", "a", "an", "to", "of", "on", "in", "i", "me", "can",
    "cant", "can't", "doesn't", "won't", "with", "for", "keeps", "does", "how", "why", "what",
];

/// Significant lowercase words of a query
fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Keywords that steer KB scoring
pub fn extract_keywords(issue: &str) -> Vec<String> {
    let text = issue.to_lowercase();
    let mut keywords = Vec::new();

    let rules: &[(&[&str], &str)] = &[
        (&["password"], "password"),
        (&["blue screen", "bluescreen", "bsod"], "blue screen"),
        (&["wifi", "wi-fi", "network", "internet"], "wi-fi"),
        (&["blue tooth", "bluetooth", "blutooth"], "bluetooth"),
        (&["printer"], "printer"),
        (&["install", "setup"], "install"),
        (&["performance", "slow"], "performance"),
    ];

    for (needles, keyword) in rules {
        if needles.iter().any(|n| text.contains(n)) {
            keywords.push(keyword.to_string());
        }
    }
    keywords
}

/// Web query for an issue: `"<issue> <suffix>"`
pub fn web_query(issue: &str, suffix: &str) -> String {
    let issue = issue.trim();
    if suffix.trim().is_empty() {
        issue.to_string()
    } else {
        format!("{} {}", issue, suffix.trim())
    }
}
