//! Producer surface: append skill steps and custom events, and show one
//! session's trail.

use crate::core::error::GovtrailError;
use crate::core::event::{
    EventPayload, KIND_ROLE_CHECK, KIND_SKILL_STEP, RESERVED_FIELDS, SkillStep,
};
use crate::core::output::compact_line;
use crate::core::store::resolve_session_id;
use crate::core::time;
use crate::core::writer::EventWriter;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "log", about = "Append events to a session log or show one")]
pub struct LogCli {
    /// Directory holding the session logs (defaults to `log_dir` from config).
    #[clap(long, global = true)]
    pub log_dir: Option<PathBuf>,
    /// Session id. Falls back to GOVTRAIL_SESSION_ID, then `unknown`.
    #[clap(long, global = true)]
    pub session: Option<String>,
    #[clap(subcommand)]
    pub command: LogCommand,
}

#[derive(Subcommand, Debug)]
pub enum LogCommand {
    /// Record one step of a skill execution.
    SkillStep {
        #[clap(long)]
        skill: String,
        #[clap(long)]
        step: String,
        #[clap(long, default_value = "done")]
        status: String,
        #[clap(long)]
        tool: Option<String>,
        #[clap(long)]
        file: Option<String>,
        /// Marks the step as policy-relevant (e.g. the rule it touches).
        #[clap(long)]
        governance: Option<String>,
        #[clap(long)]
        detail: Option<String>,
    },
    /// Record a producer-defined event kind.
    Event {
        #[clap(long)]
        kind: String,
        /// Payload field as key=value; values that parse as JSON keep their type.
        #[clap(long = "field")]
        fields: Vec<String>,
    },
    /// Show the records of one session.
    Show {
        /// Output format: 'text' or 'json'
        #[clap(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
}

/// Parse `key=value` pairs into a payload object.
pub fn parse_fields(pairs: &[String]) -> Result<Map<String, Value>, GovtrailError> {
    let mut fields = Map::new();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            GovtrailError::Usage(format!("field '{}' is not key=value", pair))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(GovtrailError::Usage(format!("field '{}' has an empty key", pair)));
        }
        if RESERVED_FIELDS.contains(&key) {
            return Err(GovtrailError::Usage(format!("field '{}' is reserved", key)));
        }
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

/// Validate a producer-defined kind. Built-in kinds have their own commands.
pub fn validate_kind(kind: &str) -> Result<(), GovtrailError> {
    if kind == KIND_ROLE_CHECK || kind == KIND_SKILL_STEP {
        return Err(GovtrailError::Usage(format!(
            "event kind '{}' is written by its own command",
            kind
        )));
    }
    let ok = !kind.is_empty()
        && kind
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'));
    if !ok {
        return Err(GovtrailError::Usage(format!(
            "invalid event kind '{}' (use [a-z0-9_.-])",
            kind
        )));
    }
    Ok(())
}

pub fn run_log_command(
    writer: &EventWriter,
    session: Option<&str>,
    command: LogCommand,
) -> Result<(), GovtrailError> {
    match command {
        LogCommand::SkillStep {
            skill,
            step,
            status,
            tool,
            file,
            governance,
            detail,
        } => {
            let payload = EventPayload::SkillStep(SkillStep {
                skill,
                step,
                status,
                tool,
                file,
                governance,
                detail,
            });
            let loc = writer.append(session, &payload)?;
            print_appended(&payload, &loc.session_id, &loc.path);
        }
        LogCommand::Event { kind, fields } => {
            validate_kind(&kind)?;
            let payload = EventPayload::Custom {
                kind,
                fields: parse_fields(&fields)?,
            };
            let loc = writer.append(session, &payload)?;
            print_appended(&payload, &loc.session_id, &loc.path);
        }
        LogCommand::Show { format } => {
            let session_id = resolve_session_id(session);
            let records = writer.read_session(&session_id)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!("Session: {} ({} records)", session_id, records.len());
                for record in &records {
                    let payload = serde_json::to_string(&record.payload)?;
                    println!(
                        "{:<26} {:<14} {}",
                        record.timestamp,
                        record.event_kind.as_deref().unwrap_or("-"),
                        compact_line(&payload, 80)
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_appended(payload: &EventPayload, session_id: &str, path: &std::path::Path) {
    println!(
        "{}",
        time::command_envelope(
            "log",
            "ok",
            serde_json::json!({
                "event_kind": payload.kind(),
                "session_id": session_id,
                "log": path.display().to_string(),
            }),
        )
    );
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "log",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Append-only producers for session logs",
        "commands": [
            { "name": "skill-step", "parameters": ["skill", "step", "status", "tool", "file", "governance", "detail"] },
            { "name": "event", "parameters": ["kind", "field"] },
            { "name": "show", "parameters": ["format"] }
        ],
        "storage": ["<prefix>-<session>.jsonl"]
    })
}
