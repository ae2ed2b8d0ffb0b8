//! Session persistence - stage state per category, keyed by session id

use chrono::{DateTime, Utc};
use remedy_shared::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::stage_manager::CategoryRecord;

/// Persisted form of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryRecord>,
    pub updated_at: DateTime<Utc>,
}

/// One JSON file per session under a directory
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data_dir>/sessions`
    pub fn default_location() -> Self {
        Self::new(crate::config::data_dir().join("sessions"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, session_id: &str) -> PathBuf {
        // Keep ids to a safe file name
        let safe: String = session_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    /// Write atomically (temp file + rename)
    pub fn save(&self, state: &SessionState) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(&state.session_id);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved session {} to {}", state.session_id, path.display());
        Ok(())
    }

    /// `None` when the session was never saved
    pub fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        let path = self.path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let state: SessionState = serde_json::from_str(&content)?;
        info!("Resumed session {}", state.session_id);
        Ok(Some(state))
    }

    /// Most recently updated session, if any
    pub fn latest(&self) -> Result<Option<SessionState>> {
        let mut latest: Option<SessionState> = None;
        for state in self.list()? {
            if latest.as_ref().map_or(true, |l| state.updated_at > l.updated_at) {
                latest = Some(state);
            }
        }
        Ok(latest)
    }

    /// Every readable session; unreadable files are skipped with a warning
    pub fn list(&self) -> Result<Vec<SessionState>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(remedy_shared::RemedyError::from)
                .and_then(|c| serde_json::from_str::<SessionState>(&c).map_err(Into::into))
            {
                Ok(state) => sessions.push(state),
                Err(e) => warn!("Skipping unreadable session file {}: {}", path.display(), e),
            }
        }
        sessions.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(sessions)
    }
}
