//! Chat-completion proposer for OpenAI-compatible endpoints (Groq by default)

use async_trait::async_trait;
use remedy_shared::{PlanKind, RemedyError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::LlmConfig;
use crate::proposer::{
    extract_json, normalize_category, proposal_from_value, PlanProposer, Proposal,
    ProposalRequest,
};

const CLASSIFY_PROMPT: &str = "You are a Windows support classifier. Return JSON only. \
Use issue_type from: system_info, install_app, network, bluetooth, printer, performance, \
account, app_error, general, chitchat.";

const DIAGNOSTIC_PROMPT: &str = "You are a Windows diagnostics planner. Use the SOP if \
provided and the web hints. Return JSON only with keys: summary, commands. Commands must be \
read-only PowerShell commands for diagnostics (no changes). commands is a list of objects: \
{\"description\": \"...\", \"command\": \"...\"}.";

const FIX_PROMPT: &str = "You are a Windows support agent. Propose a safe resolution script \
based on diagnostics. Return JSON only with keys: summary, commands. The summary must be \
short and user-friendly. Commands must be PowerShell commands for remediation; avoid \
destructive actions. Higher fix stages must escalate in scope and must not repeat commands \
listed under Avoid.";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Proposer backed by a chat-completions API
pub struct ChatProposer {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl ChatProposer {
    /// Returns `None` when no API key is available
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let api_key = config.api_key()?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        info!("Chat proposer using model {} at {}", config.model, config.base_url);
        Some(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> remedy_shared::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            temperature: self.temperature,
        };

        debug!("LLM CALL [{}] user prompt: {}", self.model, user_prompt);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RemedyError::Collaborator(format!("LLM request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("LLM error {}: {}", status, error_text);
            return Err(RemedyError::Collaborator(format!(
                "LLM returned {}: {}",
                status, error_text
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| RemedyError::Collaborator(format!("Bad LLM response: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!("LLM RESPONSE ({} chars): {}", content.len(), content);
        Ok(content)
    }
}

/// User prompt for a proposal request
pub fn build_user_prompt(request: &ProposalRequest) -> String {
    let sop = request
        .sop
        .as_ref()
        .map(|m| format!("{} ({})", m.response, m.id))
        .unwrap_or_else(|| "No SOP match found.".to_string());
    let web: Vec<String> = request
        .web_hints
        .iter()
        .take(5)
        .map(|h| format!("{} | {} | {}", h.title, h.snippet, h.url))
        .collect();

    let mut prompt = format!(
        "Issue: {}\nType: {}\nSOP: {}\nWeb hints:\n{}\n",
        request.issue,
        request.category,
        sop,
        web.join("\n")
    );

    match request.kind {
        PlanKind::Fix => {
            prompt.push_str(&format!(
                "Findings: {}\nFix stage: {}\n",
                request.findings.as_deref().unwrap_or("none"),
                request.stage
            ));
            if !request.avoid.is_empty() {
                prompt.push_str(&format!("Avoid:\n{}\n", request.avoid.join("\n")));
            }
            prompt.push_str("Return JSON with summary and commands.");
        }
        _ => {
            prompt.push_str(
                "If the issue is just a greeting or small talk, return a friendly summary and \
                 an empty commands list. Otherwise generate a diagnostic script that checks \
                 services, logs, adapters, system metrics, and app status as relevant.",
            );
        }
    }
    prompt
}

#[async_trait]
impl PlanProposer for ChatProposer {
    async fn classify(&self, issue: &str) -> Option<String> {
        let user_prompt = format!(
            "Issue: {}\nReturn JSON with keys: issue_type, install_app (empty if not install).",
            issue
        );
        let text = match self.chat(CLASSIFY_PROMPT, &user_prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Classification failed: {}", e);
                return None;
            }
        };
        let payload = extract_json(&text);
        match payload.get("issue_type").and_then(|t| t.as_str()) {
            Some(label) => Some(normalize_category(label)),
            None => {
                info!("Classification parse failed, raw: {}", text);
                None
            }
        }
    }

    async fn propose(&self, request: &ProposalRequest) -> remedy_shared::Result<Proposal> {
        let system_prompt = match request.kind {
            PlanKind::Fix => FIX_PROMPT,
            _ => DIAGNOSTIC_PROMPT,
        };
        let text = self.chat(system_prompt, &build_user_prompt(request)).await?;
        let payload = extract_json(&text);
        if payload.is_null() {
            warn!("{} plan parse failed, raw: {}", request.kind, text);
        }
        Ok(proposal_from_value(&payload))
    }
}
