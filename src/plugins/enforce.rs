//! Role Enforcer: the pre-flight gate for workflow stages.
//!
//! A check compares the expected stage against the stage the caller is
//! actually running under, records the decision, and fails closed on
//! mismatch. Nothing persists between checks.

use crate::core::error::GovtrailError;
use crate::core::event::{EventPayload, RoleCheck};
use crate::core::store::resolve_session_id;
use crate::core::time;
use crate::core::writer::{EventWriter, LogLocation};
use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[clap(name = "enforce", about = "Gate a workflow step on its expected role")]
pub struct EnforceCli {
    /// Role this step must run under (W1, W2, W3 or W4).
    #[clap(long)]
    pub expected: String,
    /// Role the caller is running under. Falls back to GOVTRAIL_ROLE.
    #[clap(long)]
    pub actual: Option<String>,
    /// Session to attribute the decision to. Falls back to GOVTRAIL_SESSION_ID.
    #[clap(long)]
    pub session: Option<String>,
    /// Directory for decision records. Without it the decision is not recorded.
    #[clap(long)]
    pub log_dir: Option<PathBuf>,
}

/// The four sequential workflow stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    W1,
    W2,
    W3,
    W4,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::W1, Role::W2, Role::W3, Role::W4];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::W1 => "W1",
            Role::W2 => "W2",
            Role::W3 => "W3",
            Role::W4 => "W4",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = GovtrailError;

    /// Exact, case-sensitive match against the closed role set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                GovtrailError::Configuration(format!(
                    "invalid expected role '{}' (valid: {})",
                    s,
                    Role::ALL.map(|r| r.as_str()).join(", ")
                ))
            })
    }
}

/// Outcome of one gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub expected: Role,
    pub actual: String,
    pub session_id: String,
    pub matched: bool,
    /// Where the decision record landed; `None` when nothing was recorded.
    pub log: Option<LogLocation>,
}

impl Decision {
    /// Turn a mismatch into [`GovtrailError::Mismatch`].
    pub fn into_result(self) -> Result<Decision, GovtrailError> {
        if self.matched {
            Ok(self)
        } else {
            Err(GovtrailError::Mismatch {
                expected: self.expected.to_string(),
                actual: self.actual,
                session_id: self.session_id,
            })
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        time::command_envelope(
            "enforce",
            if self.matched { "ok" } else { "mismatch" },
            serde_json::json!({
                "expected_role": self.expected.as_str(),
                "actual_role": self.actual,
                "session_id": self.session_id,
                "match": self.matched,
                "log": self.log.as_ref().map(|l| l.path.display().to_string()),
            }),
        )
    }
}

/// Gate with optional recording. Without a writer, decisions are still made
/// and reported but never written.
#[derive(Debug, Clone, Default)]
pub struct RoleEnforcer {
    writer: Option<EventWriter>,
}

impl RoleEnforcer {
    pub fn new(writer: Option<EventWriter>) -> Self {
        Self { writer }
    }

    /// Check `actual_role` against `expected_role`.
    ///
    /// An expected role outside the closed set is a configuration error,
    /// raised before any comparison and before anything is recorded. A
    /// mismatch is not an error here: it comes back as
    /// `Decision { matched: false, .. }`. Recording failures are logged and
    /// leave `Decision::log` empty; they never change the decision.
    pub fn check(
        &self,
        expected_role: &str,
        actual_role: &str,
        session_id: Option<&str>,
    ) -> Result<Decision, GovtrailError> {
        let expected: Role = expected_role.parse()?;
        let session_id = resolve_session_id(session_id);
        let matched = actual_role == expected.as_str();

        let log = self.record(expected, actual_role, &session_id, matched);

        if matched {
            tracing::info!(
                expected = %expected,
                actual = actual_role,
                session_id = %session_id,
                "role check passed"
            );
        } else {
            tracing::error!(
                expected = %expected,
                actual = actual_role,
                session_id = %session_id,
                "role mismatch"
            );
        }

        Ok(Decision {
            expected,
            actual: actual_role.to_string(),
            session_id,
            matched,
            log,
        })
    }

    fn record(
        &self,
        expected: Role,
        actual_role: &str,
        session_id: &str,
        matched: bool,
    ) -> Option<LogLocation> {
        let writer = self.writer.as_ref()?;
        let payload = EventPayload::RoleCheck(RoleCheck {
            expected_role: expected.to_string(),
            actual_role: actual_role.to_string(),
            matched,
        });
        match writer.append(Some(session_id), &payload) {
            Ok(location) => Some(location),
            Err(e) => {
                tracing::warn!(
                    session_id,
                    error = %e,
                    "role check decision was not recorded"
                );
                None
            }
        }
    }
}

/// Run the gate with already-resolved inputs and print the decision.
pub fn run_enforce(
    enforcer: &RoleEnforcer,
    expected: &str,
    actual: &str,
    session_id: Option<&str>,
) -> Result<Decision, GovtrailError> {
    let decision = enforcer.check(expected, actual, session_id)?;
    println!("{}", decision.to_json());
    decision.into_result()
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "enforce",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Workflow role gate; records every decision as a role_check event",
        "commands": [
            { "name": "enforce", "parameters": ["expected", "actual", "session", "log_dir"] }
        ],
        "roles": Role::ALL.map(|r| r.as_str()),
        "exit_codes": { "0": "match", "1": "mismatch, invalid role or usage error" },
        "storage": ["<prefix>-<session>.jsonl"]
    })
}
