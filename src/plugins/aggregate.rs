//! Aggregator: read-side summary over every session log in a directory.
//!
//! Read-only. Lines that do not parse are skipped and counted, never fatal.
//! Files are discovered in lexicographic order and folded in that order, so
//! tie-breaking in the breakdowns is stable and repeated runs over the same
//! directory produce byte-identical reports.

use crate::core::config::{DEFAULT_GOVERNANCE_FIELD, DEFAULT_TOP_N};
use crate::core::error::GovtrailError;
use crate::core::event::EventRecord;
use crate::core::output::compact_line;
use crate::core::store::{DEFAULT_PREFIX, LogStore, is_sentinel_session};
use crate::core::time;
use chrono::NaiveDate;
use clap::Parser;
use colored::Colorize;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Bucket for records that lack a grouping field.
pub const UNKNOWN_BUCKET: &str = "unknown";

#[derive(Parser, Debug)]
#[clap(name = "aggregate", about = "Summarize all session logs in a directory")]
pub struct AggregateCli {
    /// Directory holding the session logs.
    pub log_dir: PathBuf,
    /// Output format: 'text' or 'json'
    #[clap(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
    /// Length of each top-N breakdown.
    #[clap(long)]
    pub top: Option<usize>,
    /// Extra breakdown by an arbitrary payload field.
    #[clap(long)]
    pub group_by: Option<String>,
    /// Producer family prefix of the log files to read.
    #[clap(long)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub prefix: String,
    pub top_n: usize,
    pub governance_field: String,
    pub group_by: Option<String>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            top_n: DEFAULT_TOP_N,
            governance_field: DEFAULT_GOVERNANCE_FIELD.to_string(),
            group_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCount {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupBreakdown {
    pub field: String,
    pub top: Vec<KeyCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    pub log_dir: String,
    pub files_scanned: usize,
    pub total_entries: usize,
    pub skipped_lines: usize,
    pub governance_entries: usize,
    pub non_governance_entries: usize,
    pub unique_files: usize,
    pub unique_sessions: usize,
    pub unknown_session_count: usize,
    /// `None` means no record carried a usable timestamp.
    pub date_range: Option<DateRange>,
    pub by_kind: Vec<KeyCount>,
    pub top_files: Vec<KeyCount>,
    pub top_tools: Vec<KeyCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBreakdown>,
}

/// Counter that remembers first-seen order for tie-breaking.
#[derive(Debug, Default)]
struct Tally {
    counts: Vec<KeyCount>,
    index: FxHashMap<String, usize>,
}

impl Tally {
    fn bump(&mut self, key: String) {
        if let Some(&i) = self.index.get(&key) {
            self.counts[i].count += 1;
        } else {
            self.index.insert(key.clone(), self.counts.len());
            self.counts.push(KeyCount { key, count: 1 });
        }
    }

    /// Highest counts first; `sort_by` is stable so equal counts keep
    /// first-seen order.
    fn top(&self, n: usize) -> Vec<KeyCount> {
        let mut sorted = self.counts.clone();
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        sorted.truncate(n);
        sorted
    }
}

/// Records and skip count from one file.
#[derive(Debug, Default)]
struct FileScan {
    records: Vec<EventRecord>,
    skipped: usize,
}

/// Lines are split on raw bytes so invalid UTF-8 only costs its own line.
fn scan_file(path: &Path) -> Result<FileScan, GovtrailError> {
    let bytes = fs::read(path).map_err(GovtrailError::IoError)?;
    let mut scan = FileScan::default();
    for raw in bytes.split(|b| *b == b'\n') {
        let Ok(line) = std::str::from_utf8(raw) else {
            scan.skipped += 1;
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match EventRecord::parse_line(line) {
            Some(record) => scan.records.push(record),
            None => scan.skipped += 1,
        }
    }
    if scan.skipped > 0 {
        tracing::debug!(
            path = %path.display(),
            skipped = scan.skipped,
            "skipped malformed lines"
        );
    }
    Ok(scan)
}

#[derive(Debug, Default)]
struct Accumulator {
    total: usize,
    skipped: usize,
    governance: usize,
    files: FxHashSet<String>,
    sessions: FxHashSet<String>,
    unknown_sessions: usize,
    first_day: Option<NaiveDate>,
    last_day: Option<NaiveDate>,
    kinds: Tally,
    file_tally: Tally,
    tool_tally: Tally,
    group_tally: Tally,
}

impl Accumulator {
    fn add(&mut self, record: &EventRecord, options: &AggregateOptions) {
        self.total += 1;

        if record.field(&options.governance_field).is_some() {
            self.governance += 1;
        }

        match record.session_id.as_deref() {
            Some(s) if !is_sentinel_session(s) => {
                self.sessions.insert(s.to_string());
            }
            _ => self.unknown_sessions += 1,
        }

        if let Some(day) = time::day_of(&record.timestamp) {
            self.first_day = Some(self.first_day.map_or(day, |d| d.min(day)));
            self.last_day = Some(self.last_day.map_or(day, |d| d.max(day)));
        }

        let file = record.field_key("file");
        if let Some(f) = &file {
            self.files.insert(f.clone());
        }
        self.file_tally.bump(file.unwrap_or_else(|| UNKNOWN_BUCKET.to_string()));
        self.tool_tally.bump(
            record
                .field_key("tool")
                .unwrap_or_else(|| UNKNOWN_BUCKET.to_string()),
        );
        self.kinds.bump(
            record
                .event_kind
                .clone()
                .unwrap_or_else(|| UNKNOWN_BUCKET.to_string()),
        );
        if let Some(field) = &options.group_by {
            self.group_tally.bump(
                record
                    .field_key(field)
                    .unwrap_or_else(|| UNKNOWN_BUCKET.to_string()),
            );
        }
    }

    fn finish(
        self,
        log_dir: &Path,
        files_scanned: usize,
        options: &AggregateOptions,
    ) -> AggregateReport {
        let date_range = match (self.first_day, self.last_day) {
            (Some(first), Some(last)) => Some(DateRange { first, last }),
            _ => None,
        };
        AggregateReport {
            log_dir: log_dir.display().to_string(),
            files_scanned,
            total_entries: self.total,
            skipped_lines: self.skipped,
            governance_entries: self.governance,
            non_governance_entries: self.total - self.governance,
            unique_files: self.files.len(),
            unique_sessions: self.sessions.len(),
            unknown_session_count: self.unknown_sessions,
            date_range,
            by_kind: self.kinds.top(options.top_n),
            top_files: self.file_tally.top(options.top_n),
            top_tools: self.tool_tally.top(options.top_n),
            group_by: options.group_by.as_ref().map(|field| GroupBreakdown {
                field: field.clone(),
                top: self.group_tally.top(options.top_n),
            }),
        }
    }
}

/// Summarize every `<prefix>-*.jsonl` log under `log_dir`.
///
/// A missing directory is a configuration error; an unreadable file is an
/// I/O error. Malformed lines only show up in `skipped_lines`.
pub fn aggregate(
    log_dir: &Path,
    options: &AggregateOptions,
) -> Result<AggregateReport, GovtrailError> {
    let store = LogStore::new(log_dir, options.prefix.clone());
    let logs = store.session_logs()?;

    // Per-file parsing is independent; collect keeps the lexicographic order.
    let scans = logs
        .par_iter()
        .map(|path| scan_file(path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut acc = Accumulator::default();
    for scan in &scans {
        acc.skipped += scan.skipped;
        for record in &scan.records {
            acc.add(record, options);
        }
    }

    tracing::debug!(
        log_dir = %log_dir.display(),
        files = logs.len(),
        total = acc.total,
        skipped = acc.skipped,
        "aggregation finished"
    );
    Ok(acc.finish(log_dir, logs.len(), options))
}

pub fn render_json(report: &AggregateReport) -> Result<String, GovtrailError> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn render_breakdown(out: &mut String, title: &str, rows: &[KeyCount]) {
    out.push_str(&format!("{}\n", title.bright_white().bold()));
    if rows.is_empty() {
        out.push_str("  (none)\n");
    }
    for row in rows {
        out.push_str(&format!("  {:>7}  {}\n", row.count, compact_line(&row.key, 60)));
    }
    out.push('\n');
}

pub fn render_text(report: &AggregateReport) -> String {
    let rule = "-------------------------------------------------------------------";
    let mut out = String::new();
    out.push_str("===================================================================\n");
    out.push_str(&format!(
        "          {}\n",
        "GOVERNANCE AUDIT TRAIL - SUMMARY".bright_cyan().bold()
    ));
    out.push_str("===================================================================\n\n");
    out.push_str(&format!("Log directory:        {}\n", report.log_dir));
    out.push_str(&format!("Files scanned:        {}\n", report.files_scanned));
    out.push_str(&format!("Total entries:        {}\n", report.total_entries));
    out.push_str(&format!("Skipped lines:        {}\n", report.skipped_lines));
    out.push_str(&format!("Governance entries:   {}\n", report.governance_entries));
    out.push_str(&format!("Other entries:        {}\n", report.non_governance_entries));
    out.push_str(&format!("Unique files:         {}\n", report.unique_files));
    out.push_str(&format!("Unique sessions:      {}\n", report.unique_sessions));
    let unknown = report.unknown_session_count.to_string();
    out.push_str(&format!(
        "Unattributed events:  {}\n",
        if report.unknown_session_count > 0 {
            unknown.bright_yellow().to_string()
        } else {
            unknown
        }
    ));
    match &report.date_range {
        Some(range) => out.push_str(&format!(
            "Date range:           {} .. {}\n",
            range.first, range.last
        )),
        None => out.push_str("Date range:           no data\n"),
    }
    out.push('\n');
    out.push_str(rule);
    out.push('\n');
    render_breakdown(&mut out, "EVENT KINDS", &report.by_kind);
    render_breakdown(&mut out, "TOP FILES", &report.top_files);
    render_breakdown(&mut out, "TOP TOOLS", &report.top_tools);
    if let Some(group) = &report.group_by {
        render_breakdown(&mut out, &format!("BY {}", group.field.to_uppercase()), &group.top);
    }
    out.push_str(rule);
    out.push('\n');
    out
}

pub fn run_aggregate_cli(
    cli: AggregateCli,
    defaults: AggregateOptions,
) -> Result<(), GovtrailError> {
    let top_n = cli.top.unwrap_or(defaults.top_n);
    if top_n == 0 {
        return Err(GovtrailError::Usage("--top must be at least 1".to_string()));
    }
    let options = AggregateOptions {
        prefix: cli.prefix.unwrap_or(defaults.prefix),
        top_n,
        governance_field: defaults.governance_field,
        group_by: cli.group_by.or(defaults.group_by),
    };
    let report = aggregate(&cli.log_dir, &options)?;
    if cli.format == "json" {
        println!("{}", render_json(&report)?);
    } else {
        print!("{}", render_text(&report));
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "aggregate",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Read-only summary over all session logs in a directory",
        "commands": [
            { "name": "aggregate", "parameters": ["log_dir", "format", "top", "group_by", "prefix"] }
        ],
        "storage": ["read-only over <prefix>-*.jsonl"],
        "notes": "Malformed lines are skipped and counted in skipped_lines"
    })
}
