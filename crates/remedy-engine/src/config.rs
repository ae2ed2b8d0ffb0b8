//! Configuration management for the remedy engine.
//!
//! Loads settings from a TOML file or uses defaults. Every field has a
//! serde default so a partial file is enough.

use anyhow::{Context, Result};
use remedy_shared::{APP_NAME, DEFAULT_MAX_TIER, SOP_SCORE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "REMEDY_CONFIG";

/// Policy rule configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Allow rules (`glob:`, `contains:`, `exact:`; unprefixed means glob)
    #[serde(default)]
    pub allow: Vec<String>,

    /// Deny rules; these always win
    #[serde(default)]
    pub deny: Vec<String>,

    /// Optional JSON allowlist file (`{"commands": [...]}`)
    #[serde(default)]
    pub allow_file: Option<PathBuf>,

    /// Optional JSON denylist file (`{"commands": [...]}`)
    #[serde(default)]
    pub deny_file: Option<PathBuf>,
}

/// Command execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Per-command timeout in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Shell program and leading arguments; the command text is appended
    #[serde(default = "default_shell")]
    pub shell: Vec<String>,

    /// Cap on captured stdout/stderr per command
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
}

fn default_command_timeout() -> u64 {
    60
}

fn default_shell() -> Vec<String> {
    if cfg!(windows) {
        vec![
            "powershell".to_string(),
            "-NoProfile".to_string(),
            "-Command".to_string(),
        ]
    } else {
        vec!["sh".to_string(), "-c".to_string()]
    }
}

fn default_max_output() -> usize {
    64 * 1024
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            shell: default_shell(),
            max_output_bytes: default_max_output(),
        }
    }
}

/// Stage ladder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Highest tier for categories without an override
    #[serde(default = "default_max_tier")]
    pub default_max_tier: u8,

    /// Per-category highest tier
    #[serde(default)]
    pub max_tier: HashMap<String, u8>,
}

fn default_max_tier() -> u8 {
    DEFAULT_MAX_TIER
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            default_max_tier: default_max_tier(),
            max_tier: HashMap::new(),
        }
    }
}

impl StageConfig {
    pub fn max_tier_for(&self, category: &str) -> u8 {
        self.max_tier
            .get(category)
            .copied()
            .unwrap_or(self.default_max_tier)
    }
}

/// Post-fix check for one fault category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub category: String,
    /// Read-only status query run after the fix commands
    pub command: String,
    /// Regex that signals the category is healthy
    #[serde(default)]
    pub healthy_pattern: Option<String>,
    /// Regex that signals the category is still broken
    #[serde(default)]
    pub broken_pattern: Option<String>,
}

/// Chat-completion proposer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub temperature: f32,
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_llm_model() -> String {
    "llama3-70b-8192".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_llm_timeout() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout(),
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    /// API key from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

/// Response filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Case-insensitive phrases that get a line stripped
    #[serde(default = "default_blocked_terms")]
    pub blocked_terms: Vec<String>,

    /// Substrings that mark a source link as ad or tracking
    #[serde(default = "default_blocked_links")]
    pub blocked_link_patterns: Vec<String>,
}

fn default_blocked_terms() -> Vec<String> {
    [
        "pc repair tool",
        "speedup",
        "trusted by millions",
        "download now",
        "free download",
        "ad_provider",
        "ad_domain",
        "click_metadata",
        "rm -rf /",
        "format c:",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_blocked_links() -> Vec<String> {
    ["bing.com/aclick", "ad_domain", "ad_provider", "click_metadata", "doubleclick.net"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            blocked_terms: default_blocked_terms(),
            blocked_link_patterns: default_blocked_links(),
        }
    }
}

/// Research configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Appended to the issue text when querying the web
    #[serde(default = "default_web_suffix")]
    pub web_query_suffix: String,

    #[serde(default = "default_sop_threshold")]
    pub sop_score_threshold: f32,

    /// Optional JSON file of static hints for offline use
    #[serde(default)]
    pub hints_file: Option<PathBuf>,
}

fn default_web_suffix() -> String {
    "Windows 11 troubleshooting steps".to_string()
}

fn default_sop_threshold() -> f32 {
    SOP_SCORE_THRESHOLD
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            web_query_suffix: default_web_suffix(),
            sop_score_threshold: default_sop_threshold(),
            hints_file: None,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub stages: StageConfig,
    #[serde(default)]
    pub verification: Vec<VerificationCheck>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub gatekeeper: GatekeeperConfig,
    #[serde(default)]
    pub research: ResearchConfig,
}

impl Config {
    /// Load from an explicit path, `$REMEDY_CONFIG`, or the user config
    /// directory; defaults when none exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Self::load_from(Path::new(&env_path));
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default().with_env_overrides())
    }

    /// Load and parse a specific file. Relative policy file paths are
    /// resolved against the config file's directory.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.policy.allow_file = config.policy.allow_file.map(|p| resolve(base, p));
            config.policy.deny_file = config.policy.deny_file.map(|p| resolve(base, p));
            config.research.hints_file = config.research.hints_file.map(|p| resolve(base, p));
        }

        info!("Loaded config from {}", path.display());
        Ok(config.with_env_overrides())
    }

    /// Apply `GROQ_MODEL` / `GROQ_BASE_URL` overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("GROQ_MODEL") {
            if !model.trim().is_empty() {
                self.llm.model = model.trim().to_string();
            }
        }
        if let Ok(base_url) = std::env::var("GROQ_BASE_URL") {
            if !base_url.trim().is_empty() {
                self.llm.base_url = base_url.trim().to_string();
            }
        }
        if self.llm.base_url.contains("groq.com") && self.llm.model.starts_with("openai/") {
            warn!(
                "Model '{}' is not served by the Groq endpoint, falling back to {}",
                self.llm.model,
                default_llm_model()
            );
            self.llm.model = default_llm_model();
        }
        self
    }
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path
    }
}

/// `<config_dir>/remedy/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME).join("config.toml"))
}

/// `<data_local_dir>/remedy`, used for logs and session state
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}
