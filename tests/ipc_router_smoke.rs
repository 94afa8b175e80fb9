mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{entries, request, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("attendanced-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let methods = [
        ("health", json!({})),
        ("workspace.select", json!({ "path": workspace.to_string_lossy() })),
        (
            "roster.set",
            json!({ "classId": "10-A", "name": "10", "section": "A", "studentIds": ["S1"] }),
        ),
        ("roster.get", json!({ "classId": "10-A" })),
        (
            "attendance.submitBatch",
            json!({ "date": "2024-03-04", "classId": "10-A", "entries": entries(&[("S1", "present")]) }),
        ),
        ("attendance.query", json!({ "classId": "10-A" })),
        ("attendance.forDate", json!({ "date": "2024-03-04" })),
        ("analytics.stats", json!({})),
        ("analytics.class.open", json!({ "classId": "10-A" })),
        ("analytics.student.open", json!({ "classId": "10-A", "studentId": "S1" })),
        ("analytics.student.yearly", json!({ "studentId": "S1", "year": 2024 })),
        ("analytics.classes.overview", json!({})),
        ("analytics.periods", json!({})),
        ("events.revisions", json!({})),
        ("attendance.purge", json!({ "classId": "10-A" })),
    ];
    for (i, (method, params)) in methods.into_iter().enumerate() {
        let value = request(&mut stdin, &mut reader, &i.to_string(), method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
    }

    let unknown = request(&mut stdin, &mut reader, "u", "grades.list", json!({}));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    // Garbage lines get a bad_json reply and the loop keeps going.
    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse reply");
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_json")
    );
    let health = request(&mut stdin, &mut reader, "h", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
