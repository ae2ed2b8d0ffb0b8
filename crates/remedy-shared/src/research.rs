//! Research hints supplied by the knowledge-base and web collaborators.

use serde::{Deserialize, Serialize};

/// Minimum KB score for a match to be used as the SOP
pub const SOP_SCORE_THRESHOLD: f32 = 0.2;

/// A knowledge-base entry describing a known issue and its fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbMatch {
    pub id: String,
    pub issue_text: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub link: Option<String>,
}

/// A web search hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebHint {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Everything the research collaborator returned for one query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchHints {
    #[serde(default)]
    pub kb_matches: Vec<KbMatch>,
    #[serde(default)]
    pub web_hints: Vec<WebHint>,
    #[serde(default)]
    pub query_used: String,
}

impl ResearchHints {
    pub fn is_empty(&self) -> bool {
        self.kb_matches.is_empty() && self.web_hints.is_empty()
    }

    /// Best KB match, if it clears the threshold
    pub fn sop(&self, threshold: f32) -> Option<&KbMatch> {
        self.kb_matches
            .iter()
            .filter(|m| m.score >= threshold)
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// First web hint, used as the headline reference
    pub fn top_web(&self) -> Option<&WebHint> {
        self.web_hints.first()
    }
}
