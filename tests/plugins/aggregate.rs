use govtrail::core::event::{EventPayload, RoleCheck, SkillStep};
use govtrail::core::store::LogStore;
use govtrail::core::writer::EventWriter;
use govtrail::plugins::aggregate::{AggregateOptions, aggregate, render_json, render_text};
use serde_json::Map;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn role_check(expected: &str, actual: &str) -> EventPayload {
    EventPayload::RoleCheck(RoleCheck {
        expected_role: expected.to_string(),
        actual_role: actual.to_string(),
        matched: expected == actual,
    })
}

fn skill_step(file: Option<&str>, tool: Option<&str>, governance: Option<&str>) -> EventPayload {
    EventPayload::SkillStep(SkillStep {
        skill: "migrate".to_string(),
        step: "1".to_string(),
        status: "done".to_string(),
        tool: tool.map(String::from),
        file: file.map(String::from),
        governance: governance.map(String::from),
        detail: None,
    })
}

fn write_lines(dir: &Path, name: &str, lines: &[&str]) {
    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(dir.join(name), body).unwrap();
}

#[test]
fn test_two_session_files_example() {
    let tmp = tempdir().unwrap();
    let writer = EventWriter::new(LogStore::with_default_prefix(tmp.path()));
    writer.append(Some("s1"), &role_check("W1", "W1")).unwrap();
    writer.append(Some("s1"), &role_check("W2", "W1")).unwrap();
    writer
        .append(Some("s1"), &skill_step(Some("db/0001.py"), Some("alembic"), Some("schema-change")))
        .unwrap();
    fs::write(tmp.path().join("governance-s2.jsonl"), "").unwrap();

    let report = aggregate(tmp.path(), &AggregateOptions::default()).unwrap();
    assert_eq!(report.files_scanned, 2);
    assert_eq!(report.total_entries, 3);
    assert_eq!(report.governance_entries, 1);
    assert_eq!(report.non_governance_entries, 2);
    assert_eq!(report.unique_sessions, 1);
    assert_eq!(report.unknown_session_count, 0);
    assert_eq!(report.unique_files, 1);
    assert_eq!(report.skipped_lines, 0);

    assert_eq!(report.by_kind[0].key, "role_check");
    assert_eq!(report.by_kind[0].count, 2);
    assert_eq!(report.by_kind[1].key, "skill_step");

    // Role checks carry no file; they land in the explicit unknown bucket.
    assert_eq!(report.top_files[0].key, "unknown");
    assert_eq!(report.top_files[0].count, 2);
    assert_eq!(report.top_files[1].key, "db/0001.py");

    let range = report.date_range.unwrap();
    assert!(range.first <= range.last);
}

#[test]
fn test_round_trip_every_append_is_one_record() {
    let tmp = tempdir().unwrap();
    let writer = EventWriter::new(LogStore::with_default_prefix(tmp.path()));
    let mut fields = Map::new();
    fields.insert("tool".to_string(), serde_json::json!("grep"));
    fields.insert("note".to_string(), serde_json::json!("line one\nline two"));
    let custom = EventPayload::Custom {
        kind: "tool_use".to_string(),
        fields,
    };

    let mut appended = 0;
    for session in ["a", "b", "c"] {
        for _ in 0..4 {
            writer.append(Some(session), &custom).unwrap();
            writer.append(Some(session), &skill_step(None, None, None)).unwrap();
            appended += 2;
        }
    }

    let report = aggregate(tmp.path(), &AggregateOptions::default()).unwrap();
    assert_eq!(report.total_entries, appended);
    assert_eq!(report.skipped_lines, 0);
    assert_eq!(report.unique_sessions, 3);
    assert_eq!(report.files_scanned, 3);
}

#[test]
fn test_malformed_lines_are_skipped_not_fatal() {
    let tmp = tempdir().unwrap();
    write_lines(
        tmp.path(),
        "governance-s1.jsonl",
        &[
            "garbage",
            r#"{"timestamp":"2026-02-01T10:00:00.000Z","session_id":"s1","event_kind":"skill_step","payload":{}}"#,
            r#"{"timestamp":"2026-02-01T10:00:01.000Z","session_id":"s1","event_ki"#,
            "",
            r#"{"timestamp":"2026-02-03T10:00:00.000Z","session_id":"s1","event_kind":"skill_step","payload":{}}"#,
            r#"["not","an","object"]"#,
            r#"{"session_id":"s1","event_kind":"skill_step"}"#,
            r#"{"timestamp":"2026-02-02T23:59:59.999Z","session_id":"s1","event_kind":"role_check","payload":{"match":true}}"#,
        ],
    );

    let report = aggregate(tmp.path(), &AggregateOptions::default()).unwrap();
    assert_eq!(report.total_entries, 3);
    assert_eq!(report.skipped_lines, 4);
    let range = report.date_range.unwrap();
    assert_eq!(range.first.to_string(), "2026-02-01");
    assert_eq!(range.last.to_string(), "2026-02-03");
}

#[test]
fn test_aggregation_is_idempotent() {
    let tmp = tempdir().unwrap();
    let writer = EventWriter::new(LogStore::with_default_prefix(tmp.path()));
    for (i, session) in ["x", "y", "z", "x"].iter().enumerate() {
        let file = format!("src/f{}.rs", i % 2);
        writer
            .append(Some(session), &skill_step(Some(&file), Some("edit"), None))
            .unwrap();
    }
    fs::write(tmp.path().join("governance-junk.jsonl"), "{{{\n").unwrap();

    let options = AggregateOptions {
        group_by: Some("status".to_string()),
        ..AggregateOptions::default()
    };
    let first = render_json(&aggregate(tmp.path(), &options).unwrap()).unwrap();
    let second = render_json(&aggregate(tmp.path(), &options).unwrap()).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        render_text(&aggregate(tmp.path(), &options).unwrap()),
        render_text(&aggregate(tmp.path(), &options).unwrap())
    );
}

#[test]
fn test_unknown_sessions_are_counted_separately() {
    let tmp = tempdir().unwrap();
    write_lines(
        tmp.path(),
        "governance-mixed.jsonl",
        &[
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"real-1"}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"real-1"}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"real-2"}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"unknown"}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"no-session"}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":""}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z"}"#,
        ],
    );
    let report = aggregate(tmp.path(), &AggregateOptions::default()).unwrap();
    assert_eq!(report.total_entries, 7);
    assert_eq!(report.unique_sessions, 2);
    assert_eq!(report.unknown_session_count, 4);
    assert_eq!(report.by_kind[0].key, "unknown");
    assert_eq!(report.by_kind[0].count, 7);
}

#[test]
fn test_top_n_ties_follow_traversal_order() {
    let tmp = tempdir().unwrap();
    // File order is lexicographic: a before b.
    write_lines(
        tmp.path(),
        "governance-b.jsonl",
        &[
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"b","payload":{"tool":"sed"}}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"b","payload":{"tool":"grep"}}"#,
        ],
    );
    write_lines(
        tmp.path(),
        "governance-a.jsonl",
        &[
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"a","payload":{"tool":"grep"}}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"a","payload":{"tool":"awk"}}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"a","payload":{"tool":"cat"}}"#,
        ],
    );

    let options = AggregateOptions {
        top_n: 3,
        ..AggregateOptions::default()
    };
    let report = aggregate(tmp.path(), &options).unwrap();
    let keys: Vec<(&str, usize)> = report
        .top_tools
        .iter()
        .map(|k| (k.key.as_str(), k.count))
        .collect();
    assert_eq!(keys, vec![("grep", 2), ("awk", 1), ("cat", 1)]);
}

#[test]
fn test_group_by_arbitrary_field_and_flat_records() {
    let tmp = tempdir().unwrap();
    write_lines(
        tmp.path(),
        "governance-s1.jsonl",
        &[
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"s1","agent":"planner","governance":"approved"}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"s1","payload":{"agent":"coder"}}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"s1","payload":{"agent":"coder","governance":null}}"#,
            r#"{"timestamp":"2026-01-01T00:00:00Z","session_id":"s1"}"#,
        ],
    );
    let options = AggregateOptions {
        group_by: Some("agent".to_string()),
        ..AggregateOptions::default()
    };
    let report = aggregate(tmp.path(), &options).unwrap();
    assert_eq!(report.governance_entries, 1);
    let group = report.group_by.unwrap();
    assert_eq!(group.field, "agent");
    let keys: Vec<(&str, usize)> = group.top.iter().map(|k| (k.key.as_str(), k.count)).collect();
    assert_eq!(keys, vec![("coder", 2), ("planner", 1), ("unknown", 1)]);
}

#[test]
fn test_custom_governance_field_and_prefix() {
    let tmp = tempdir().unwrap();
    let writer = EventWriter::new(LogStore::new(tmp.path(), "skill"));
    let mut fields = Map::new();
    fields.insert("policy".to_string(), serde_json::json!("R-7"));
    writer
        .append(Some("s1"), &EventPayload::Custom { kind: "decision".to_string(), fields })
        .unwrap();
    writer.append(Some("s1"), &skill_step(None, None, Some("ignored"))).unwrap();
    // Different producer family; not read under the "skill" prefix.
    EventWriter::new(LogStore::with_default_prefix(tmp.path()))
        .append(Some("s1"), &role_check("W1", "W1"))
        .unwrap();

    let options = AggregateOptions {
        prefix: "skill".to_string(),
        governance_field: "policy".to_string(),
        ..AggregateOptions::default()
    };
    let report = aggregate(tmp.path(), &options).unwrap();
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.total_entries, 2);
    assert_eq!(report.governance_entries, 1);
}

#[test]
fn test_missing_directory_is_configuration_error() {
    let tmp = tempdir().unwrap();
    let err = aggregate(&tmp.path().join("absent"), &AggregateOptions::default()).unwrap_err();
    assert_eq!(err.kind(), "configuration");
    assert!(err.to_string().contains("absent"));
}

#[test]
fn test_top_n_truncates() {
    let tmp = tempdir().unwrap();
    let writer = EventWriter::new(LogStore::with_default_prefix(tmp.path()));
    for i in 0..15 {
        let file = format!("src/m{}.rs", i);
        writer.append(Some("s1"), &skill_step(Some(&file), None, None)).unwrap();
    }
    let report = aggregate(tmp.path(), &AggregateOptions::default()).unwrap();
    assert_eq!(report.unique_files, 15);
    assert_eq!(report.top_files.len(), 10);
    assert_eq!(report.top_files[0].key, "src/m0.rs");
}
