mod test_support;

use serde_json::json;
use test_support::{entries, request_err_code, request_ok, spawn_sidecar, temp_dir};

fn revision(result: &serde_json::Value, channel: &str) -> u64 {
    result
        .get("revisions")
        .and_then(|r| r.get(channel))
        .and_then(|v| v.as_u64())
        .expect("revision counter")
}

#[test]
fn only_successful_mutations_bump_the_attendance_revision() {
    let workspace = temp_dir("attendanced-events");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let start = request_ok(&mut stdin, &mut reader, "2", "events.revisions", json!({}));
    assert_eq!(revision(&start, "attendance_updates"), 0);

    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.submitBatch",
        json!({ "date": "2024-03-04", "classId": "10-A", "entries": entries(&[("S1", "present")]) }),
    );
    assert_eq!(submitted.get("notified").and_then(|v| v.as_u64()), Some(1));

    let _ = request_err_code(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.submitBatch",
        json!({ "date": "2024-03-04", "classId": "10-A", "entries": [] }),
    );
    // Purging nothing is not a change.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.purge",
        json!({ "studentId": "nobody" }),
    );

    let after = request_ok(&mut stdin, &mut reader, "6", "events.revisions", json!({}));
    assert_eq!(revision(&after, "attendance_updates"), 1);
    assert_eq!(revision(&after, "assignment_updates"), 0);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn collaborators_can_publish_on_their_own_channel() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let published = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "events.publish",
        json!({ "channel": "assignment", "payload": { "assignmentId": "A1" } }),
    );
    assert_eq!(
        published.get("channel").and_then(|v| v.as_str()),
        Some("assignment_updates")
    );
    assert_eq!(published.get("delivered").and_then(|v| v.as_u64()), Some(1));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "2",
        "events.publish",
        json!({ "channel": "chat" }),
    );
    assert_eq!(code, "bad_params");

    let revisions = request_ok(&mut stdin, &mut reader, "3", "events.revisions", json!({}));
    assert_eq!(revision(&revisions, "assignment_updates"), 1);
    assert_eq!(revision(&revisions, "attendance_updates"), 0);
}
