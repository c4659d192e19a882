//! Log store layout for the audit trail.
//!
//! A store is a directory holding one append-only JSONL file per session,
//! named `<prefix>-<session>.jsonl` so a directory listing alone reveals
//! session boundaries.

use crate::core::error::GovtrailError;
use std::fs;
use std::path::{Path, PathBuf};

/// Producer family prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "governance";
pub const LOG_EXTENSION: &str = "jsonl";

/// Session id recorded when the caller did not supply one.
pub const UNKNOWN_SESSION: &str = "unknown";

/// Session ids that mean "not attributed to any session".
pub const SESSION_SENTINELS: &[&str] = &[UNKNOWN_SESSION, "no-session"];

/// Handle to a session-log directory.
#[derive(Debug, Clone)]
pub struct LogStore {
    /// Directory that holds the session logs
    pub root: PathBuf,
    /// Producer family prefix embedded in every file name
    pub prefix: String,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn with_default_prefix(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DEFAULT_PREFIX)
    }

    /// Path of the log file for `session_id`. The id is sanitized into a
    /// single safe file name component.
    pub fn session_log_path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!(
            "{}-{}.{}",
            self.prefix,
            sanitize_session_component(session_id),
            LOG_EXTENSION
        ))
    }

    pub fn ensure_root(&self) -> Result<(), GovtrailError> {
        fs::create_dir_all(&self.root).map_err(GovtrailError::IoError)
    }

    fn is_session_log(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let head = format!("{}-", self.prefix);
        let tail = format!(".{}", LOG_EXTENSION);
        name.len() > head.len() + tail.len() && name.starts_with(&head) && name.ends_with(&tail)
    }

    /// All session logs in the store, in lexicographic file-name order.
    ///
    /// A missing or non-directory root is a configuration error: the caller
    /// named a log directory that does not exist.
    pub fn session_logs(&self) -> Result<Vec<PathBuf>, GovtrailError> {
        if !self.root.is_dir() {
            return Err(GovtrailError::Configuration(format!(
                "log directory does not exist: {}",
                self.root.display()
            )));
        }
        let mut logs = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(GovtrailError::IoError)? {
            let path = entry.map_err(GovtrailError::IoError)?.path();
            if path.is_file() && self.is_session_log(&path) {
                logs.push(path);
            }
        }
        logs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(logs)
    }
}

/// Explicit session id, or the `unknown` sentinel when absent or blank.
pub fn resolve_session_id(session_id: Option<&str>) -> String {
    match session_id.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => UNKNOWN_SESSION.to_string(),
    }
}

/// True for ids that do not attribute an event to a real session.
pub fn is_sentinel_session(session_id: &str) -> bool {
    let trimmed = session_id.trim();
    trimmed.is_empty() || SESSION_SENTINELS.contains(&trimmed)
}

/// Map a session id to a single file name component.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`. Ids that would name the
/// directory itself (empty, `.`, `..`) map to `unknown`.
pub fn sanitize_session_component(session_id: &str) -> String {
    let cleaned: String = session_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        UNKNOWN_SESSION.to_string()
    } else {
        cleaned
    }
}
