//! Event Writer: appends one self-contained record per call to a
//! session-scoped JSONL log.
//!
//! Callers must not run two writers against the same session log at once.
//! Each append is still a single `write` of one complete line on an
//! `O_APPEND` handle, so interleaved writers cannot split each other's lines.

use crate::core::error::GovtrailError;
use crate::core::event::{EventPayload, EventRecord};
use crate::core::store::{LogStore, UNKNOWN_SESSION, resolve_session_id};
use crate::core::time;
use regex::Regex;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::LazyLock;

/// Where a record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLocation {
    pub path: PathBuf,
    pub session_id: String,
}

/// Patterns that detect secrets in string content.
static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // AWS Access Key ID
        (
            r"(A3T[A-Z0-9]|AKIA|AGPA|AIDA|AROA|AIPA|ANPA|ANVA|ASIA)[0-9A-Z]{16}",
            "[AWS_KEY_REDACTED]",
        ),
        // GitHub tokens (ghp_, gho_, ghu_, ghs_, ghr_)
        (r"(ghp|gho|ghu|ghs|ghr)_[a-zA-Z0-9_]{36,255}", "[GITHUB_TOKEN_REDACTED]"),
        (r"(?i)bearer\s+[a-zA-Z0-9_\-\.]{20,}", "[BEARER_REDACTED]"),
        (
            r"-----BEGIN (?:RSA |DSA |EC |OPENSSH )?PRIVATE KEY-----[\s\S]*?-----END (?:RSA |DSA |EC |OPENSSH )?PRIVATE KEY-----",
            "[PEM_KEY_REDACTED]",
        ),
        // PEM header alone (in case value is truncated)
        (
            r"-----BEGIN (?:RSA |DSA |EC |OPENSSH )?PRIVATE KEY-----",
            "[PEM_KEY_REDACTED]",
        ),
        (
            r#"(?i)(postgres|mysql|mongodb|redis)://[^\s'"]+:[^\s'"]+@[^\s'"]+"#,
            "[CONNECTION_STRING_REDACTED]",
        ),
        (
            r#"(?i)(api[_-]?key|apikey|api_secret|secret[_-]?key)['"]?\s*[:=]\s*['"]?[a-zA-Z0-9_\-]{20,}['"]?"#,
            "[API_KEY_REDACTED]",
        ),
        (
            r#"(?i)(password|passwd|pwd)['"]?\s*[:=]\s*['"]?[^\s'"]{8,}['"]?"#,
            "[PASSWORD_REDACTED]",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
        Ok(re) => Some((re, replacement)),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "skipping invalid redaction pattern");
            None
        }
    })
    .collect()
});

const SENSITIVE_KEY_SEGMENTS: &[&str] = &[
    "token",
    "secret",
    "password",
    "passwd",
    "apikey",
    "authorization",
];

/// A key is sensitive when one of its `_`/`-`/`.` separated segments names a
/// secret, or when it ends in one (`accessToken`). `api_key` and `api-key`
/// join into `apikey`. Counters like `max_tokens` stay readable.
fn is_sensitive_key(key: &str) -> bool {
    let lower_key = key.to_lowercase();
    let joined = lower_key.replace("api_key", "apikey").replace("api-key", "apikey");
    joined
        .split(['_', '-', '.'])
        .any(|segment| SENSITIVE_KEY_SEGMENTS.contains(&segment))
        || SENSITIVE_KEY_SEGMENTS
            .iter()
            .any(|needle| joined.ends_with(needle))
}

/// Redact secrets from a plain string value.
pub fn redact_string(input: &str) -> String {
    let mut result = input.to_string();
    for (pattern, replacement) in SECRET_PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }
    result
}

/// Recursively redact a JSON value.
///
/// String values under sensitive keys are replaced wholesale with
/// `[REDACTED]`; other strings are scanned for secret patterns. Numbers and
/// booleans are kept as written.
pub fn redact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(redact_map(map)),
        Value::Array(vec) => Value::Array(vec.into_iter().map(redact).collect()),
        Value::String(s) => Value::String(redact_string(&s)),
        other => other,
    }
}

fn redact_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, val)| {
            if is_sensitive_key(&key) && val.is_string() {
                (key, Value::String("[REDACTED]".to_string()))
            } else {
                (key, redact(val))
            }
        })
        .collect()
}

/// Appends records to the session logs of one [`LogStore`].
#[derive(Debug, Clone)]
pub struct EventWriter {
    store: LogStore,
}

impl EventWriter {
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Append one record for `session_id` (the `unknown` sentinel when absent).
    ///
    /// Creates the log directory and file on first use. The timestamp is
    /// stamped in UTC here, not by the caller.
    pub fn append(
        &self,
        session_id: Option<&str>,
        payload: &EventPayload,
    ) -> Result<LogLocation, GovtrailError> {
        let session_id = resolve_session_id(session_id);
        let mut record = EventRecord::new(
            time::now_rfc3339(),
            time::new_event_id(),
            session_id.clone(),
            payload,
        )?;
        record.payload = redact_map(record.payload);

        self.store.ensure_root()?;
        let path = self.store.session_log_path(&session_id);
        let line = record.to_line()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(GovtrailError::IoError)?;
        // One write_all of the whole line; the handle is unbuffered.
        file.write_all(line.as_bytes())
            .map_err(GovtrailError::IoError)?;

        tracing::debug!(
            session_id = %session_id,
            event_kind = payload.kind(),
            path = %path.display(),
            "appended event"
        );
        Ok(LogLocation { path, session_id })
    }

    /// Parsed records of one session, malformed lines skipped.
    ///
    /// Distinct ids can sanitize to the same file name (`team/a`, `team_a`),
    /// so records are filtered on their own `session_id`. A record without
    /// one belongs to the `unknown` session.
    pub fn read_session(&self, session_id: &str) -> Result<Vec<EventRecord>, GovtrailError> {
        let session_id = resolve_session_id(Some(session_id));
        let path = self.store.session_log_path(&session_id);
        if !path.exists() {
            return Ok(vec![]);
        }
        let reader = BufReader::new(File::open(&path).map_err(GovtrailError::IoError)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(GovtrailError::IoError)?;
            let Some(record) = EventRecord::parse_line(line.trim()) else {
                continue;
            };
            let owner = record
                .session_id
                .as_deref()
                .map(str::trim)
                .unwrap_or(UNKNOWN_SESSION);
            if owner == session_id {
                records.push(record);
            }
        }
        Ok(records)
    }
}
