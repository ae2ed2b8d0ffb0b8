//! Candidate commands and their risk classification.
//!
//! A command is plain instruction text plus what we know about it:
//! whether it only reads state, and which fault category it belongs to.

use serde::{Deserialize, Serialize};

/// Risk classification for a command.
///
/// Ordering matters: plans are sorted ascending so read-only steps
/// run before anything that changes the machine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    /// Inspects state only (status queries, listings)
    ReadOnly,
    /// Changes machine state (restarts, resets, config writes)
    #[default]
    Mutating,
}

impl std::fmt::Display for RiskClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::Mutating => write!(f, "mutating"),
        }
    }
}

/// PowerShell verbs that never change state
const READ_ONLY_VERBS: &[&str] = &[
    "get-", "test-", "show-", "measure-", "select-", "format-", "where-", "find-", "resolve-",
    "compare-", "sort-object", "out-string", "write-output",
];

/// Plain executables that only report
const READ_ONLY_PROGRAMS: &[&str] = &[
    "ipconfig", "ping", "tracert", "traceroute", "nslookup", "systeminfo", "whoami", "hostname",
    "tasklist", "driverquery", "uname", "uptime", "free", "df", "lsblk", "lsusb", "lspci", "ip",
    "ss", "dig", "cat", "journalctl", "dmesg", "nmcli", "rfkill", "bluetoothctl", "lpstat",
];

/// Sub-actions that turn an otherwise read-only program into a mutation
const MUTATING_MARKERS: &[&str] = &[
    " set ", " reset", " delete", " add ", " remove", " restart", " start", " stop", " enable",
    " disable", " up", " down", " connect", " disconnect", " block", " unblock", " power ",
    " /release", " /renew", " /flushdns", " /registerdns", " -r ", " --reboot", " > ", " >> ",
];

/// Programs whose read-only use depends on the sub-command
const SUBCOMMAND_PROGRAMS: &[&str] = &["netsh", "sc", "systemctl", "nmcli", "rfkill", "bluetoothctl", "ip"];

/// Characters a shell treats as a boundary between commands
const SEPARATORS: &[char] = &[';', '&', '|', '\n', '\r'];

/// Split command text into the pieces a shell would run separately.
///
/// Covers `;`, `&&`, `||`, `|`, `&` and line breaks. Empty pieces are
/// dropped, so a plain command yields itself.
pub fn segments(text: &str) -> Vec<&str> {
    text.split(SEPARATORS)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

impl RiskClass {
    /// Classify a command by its leading verb or program.
    ///
    /// Unknown commands classify as mutating; the safe assumption for
    /// anything we cannot recognize.
    pub fn classify(text: &str) -> RiskClass {
        let normalized = format!(" {} ", text.trim().to_lowercase());
        let first = normalized.split_whitespace().next().unwrap_or("");

        if first.is_empty() {
            return RiskClass::Mutating;
        }

        // A chain is only as safe as its most dangerous segment
        let parts = segments(text);
        if parts.len() > 1 {
            return parts
                .into_iter()
                .map(Self::classify)
                .max()
                .unwrap_or(RiskClass::Mutating);
        }

        if READ_ONLY_VERBS.iter().any(|verb| first.starts_with(verb)) {
            return RiskClass::ReadOnly;
        }

        let program = first.trim_end_matches(".exe");
        if SUBCOMMAND_PROGRAMS.contains(&program) {
            if MUTATING_MARKERS.iter().any(|m| normalized.contains(m)) {
                return RiskClass::Mutating;
            }
            return RiskClass::ReadOnly;
        }

        if READ_ONLY_PROGRAMS.contains(&program) {
            if MUTATING_MARKERS.iter().any(|m| normalized.contains(m)) {
                return RiskClass::Mutating;
            }
            return RiskClass::ReadOnly;
        }

        RiskClass::Mutating
    }
}

/// A single executable instruction proposed by the planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Instruction text handed to the shell
    pub text: String,
    /// Risk classification
    pub risk: RiskClass,
    /// Fault category this command belongs to (None for pure diagnostics)
    #[serde(default)]
    pub category: Option<String>,
    /// Human-readable purpose
    #[serde(default)]
    pub description: String,
}

impl Command {
    /// Create a command, classifying its risk from the text
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let risk = RiskClass::classify(&text);
        Self {
            text,
            risk,
            category: None,
            description: String::new(),
        }
    }

    /// Create a read-only diagnostic command without a category
    pub fn diagnostic(text: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(text).with_description(description)
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Override the classified risk (e.g. from a trusted recipe)
    pub fn with_risk(mut self, risk: RiskClass) -> Self {
        self.risk = risk;
        self
    }

    pub fn is_mutating(&self) -> bool {
        self.risk == RiskClass::Mutating
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}
