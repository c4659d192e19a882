//! govtrail: a governance audit trail for multi-agent workflows
//!
//! **govtrail is a local, append-only event log with a role gate in front of it.**
//!
//! Independent producers (workflow steps, skill executions, role checks)
//! each append one JSON line per event to a log scoped to their session. A
//! separate aggregation pass later reads every session log in a directory
//! and produces a summary, without any coordination with the writers.
//!
//! # Components
//!
//! - **Event Writer** ([`core::writer`]): appends one self-contained record
//!   per call to `<prefix>-<session>.jsonl`
//! - **Role Enforcer** ([`plugins::enforce`]): compares the expected workflow
//!   stage (`W1`..`W4`) against the actual one, records the decision, and
//!   fails closed on mismatch
//! - **Aggregator** ([`plugins::aggregate`]): counts, groups and date-ranges
//!   every parseable record; malformed lines are skipped and counted
//!
//! # Log format
//!
//! UTF-8 JSON Lines. Every record carries `timestamp` (RFC 3339, UTC),
//! `session_id` (or the `unknown` sentinel), `event_kind` and a `payload`
//! object. Logs are only ever appended to.
//!
//! # Examples
//!
//! ```bash
//! # Gate a step: exit 0 on match, 1 on mismatch
//! govtrail enforce --expected W2 --actual W2 --session run-7 --log-dir .govtrail/logs
//!
//! # Record a skill step
//! govtrail log --log-dir .govtrail/logs --session run-7 skill-step --skill migrate --step 1 --file db/0001.py
//!
//! # Summarize everything
//! govtrail aggregate .govtrail/logs --format json
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: record model, log store layout, writer, config and errors
//! - [`plugins`]: the command surfaces (enforce, aggregate, log)

pub mod core;
pub mod plugins;

use crate::core::config::{self, TrailConfig};
use crate::core::error;
use crate::core::store::LogStore;
use crate::core::writer::EventWriter;
use crate::plugins::{aggregate, enforce, log};

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Environment fallback for `enforce --actual`.
pub const ENV_ROLE: &str = "GOVTRAIL_ROLE";
/// Environment fallback for `--session`.
pub const ENV_SESSION: &str = "GOVTRAIL_SESSION_ID";
/// Log filter directive for the tracing subscriber.
pub const ENV_LOG: &str = "GOVTRAIL_LOG";

#[derive(Parser, Debug)]
#[clap(
    name = "govtrail",
    version = env!("CARGO_PKG_VERSION"),
    about = "Governance audit trail: append, enforce, aggregate"
)]
pub struct Cli {
    /// Config file (defaults to ./govtrail.toml when present).
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Gate a workflow step on its expected role
    #[clap(name = "enforce", visible_alias = "e")]
    Enforce(enforce::EnforceCli),

    /// Summarize every session log in a directory
    #[clap(name = "aggregate", visible_alias = "a")]
    Aggregate(aggregate::AggregateCli),

    /// Append events to a session log, or show one
    #[clap(name = "log", visible_alias = "l")]
    Log(log::LogCli),
}

/// Non-empty environment value, if any. The core never reads the
/// environment; only this CLI layer does.
fn env_fallback(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn writer_for(log_dir: &Path, config: &TrailConfig) -> EventWriter {
    EventWriter::new(LogStore::new(log_dir, config.prefix()))
}

pub fn run() -> Result<(), error::GovtrailError> {
    run_with(Cli::parse())
}

pub fn run_with(cli: Cli) -> Result<(), error::GovtrailError> {
    let current_dir = std::env::current_dir()?;
    let config = config::load_config(cli.config.as_deref(), &current_dir)?;

    match cli.command {
        Command::Enforce(enforce_cli) => {
            let actual = enforce_cli
                .actual
                .or_else(|| env_fallback(ENV_ROLE))
                .ok_or_else(|| {
                    error::GovtrailError::Usage(format!(
                        "no actual role: pass --actual or set {}",
                        ENV_ROLE
                    ))
                })?;
            let session = enforce_cli.session.or_else(|| env_fallback(ENV_SESSION));
            let log_dir = enforce_cli.log_dir.or_else(|| config.log_dir.clone());
            let enforcer =
                enforce::RoleEnforcer::new(log_dir.as_deref().map(|d| writer_for(d, &config)));
            enforce::run_enforce(&enforcer, &enforce_cli.expected, &actual, session.as_deref())?;
        }
        Command::Aggregate(aggregate_cli) => {
            let defaults = aggregate::AggregateOptions {
                prefix: config.prefix().to_string(),
                top_n: config.top_n(),
                governance_field: config.governance_field().to_string(),
                group_by: None,
            };
            aggregate::run_aggregate_cli(aggregate_cli, defaults)?;
        }
        Command::Log(log_cli) => {
            let log_dir = log_cli
                .log_dir
                .or_else(|| config.log_dir.clone())
                .ok_or_else(|| {
                    error::GovtrailError::Usage(
                        "no log directory: pass --log-dir or set log_dir in govtrail.toml".into(),
                    )
                })?;
            let session = log_cli.session.or_else(|| env_fallback(ENV_SESSION));
            log::run_log_command(
                &writer_for(&log_dir, &config),
                session.as_deref(),
                log_cli.command,
            )?;
        }
    }
    Ok(())
}
