use crate::channel::Channel;
use crate::db::SqliteAttendance;
use crate::ipc::helpers::{
    db_conn, get_optional_date, get_optional_str, get_required_date, get_required_str, respond,
    to_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttendanceBatch, AttendanceStatus, BatchEntry, DateRange};
use crate::store::{AttendanceQuery, AttendanceStore, PurgeTarget};
use serde_json::json;
use tracing::warn;

fn parse_entries(params: &serde_json::Value) -> Result<Vec<BatchEntry>, HandlerErr> {
    let Some(arr) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing entries"));
    };
    arr.iter()
        .enumerate()
        .map(|(i, v)| {
            let student_id = get_required_str(v, "studentId").map_err(|e| {
                e.with_details(json!({ "entryIndex": i }))
            })?;
            let status = get_required_str(v, "status")
                .map_err(|e| e.with_details(json!({ "entryIndex": i })))?;
            Ok(BatchEntry {
                student_id,
                status: AttendanceStatus::from(status),
            })
        })
        .collect()
}

/// Commits in memory, writes through, and only then announces the change.
/// A failed write restores the previous record set.
fn attendance_submit_batch(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let date = get_required_date(params, "date")?;
    let class_id = get_required_str(params, "classId")?;
    let marked_by = get_optional_str(params, "markedBy")?.unwrap_or_default();
    let entries = parse_entries(params)?;

    let batch = AttendanceBatch::new(date, class_id, marked_by, entries)?;

    let before = state.store.snapshot()?;
    let summary = state.store.submit_batch(batch)?;

    let saved = state.store.save_to(&SqliteAttendance::new(conn));
    if let Err(e) = saved {
        warn!(error = %e, "attendance write-through failed; restoring previous records");
        state.store = AttendanceStore::with_records(before);
        return Err(HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "attendance_records" })));
    }

    let payload = json!({
        "kind": "batchSubmitted",
        "date": summary.date,
        "classId": summary.class_id,
    });
    let report = state.updates.publish(Channel::Attendance, &payload);

    let mut result = to_json(&summary)?;
    result["notified"] = json!(report.delivered);
    Ok(result)
}

fn attendance_query(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    db_conn(state)?;
    let filter = AttendanceQuery {
        student_id: get_optional_str(params, "studentId")?,
        class_id: get_optional_str(params, "classId")?,
        date_range: DateRange {
            from: get_optional_date(params, "from")?,
            to: get_optional_date(params, "to")?,
        },
    };
    let mut records = state.store.query(&filter)?;
    crate::analytics::sort_newest_first(&mut records);
    Ok(json!({ "records": to_json(&records)? }))
}

fn attendance_for_date(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    db_conn(state)?;
    let date = get_required_date(params, "date")?;
    let class_id = get_optional_str(params, "classId")?;
    let mut records = state.store.records_for_date(date, class_id.as_deref())?;
    records.sort_by(|a, b| a.class_id.cmp(&b.class_id).then_with(|| a.student_id.cmp(&b.student_id)));
    Ok(json!({ "date": date, "records": to_json(&records)? }))
}

fn attendance_purge(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let target = match (
        get_optional_str(params, "studentId")?,
        get_optional_str(params, "classId")?,
    ) {
        (Some(student_id), None) => PurgeTarget::Student(student_id),
        (None, Some(class_id)) => PurgeTarget::Class(class_id),
        _ => {
            return Err(HandlerErr::bad_params(
                "exactly one of studentId or classId is required",
            ))
        }
    };

    let before = state.store.snapshot()?;
    let removed = state.store.purge(&target)?;
    if removed == 0 {
        return Ok(json!({ "removed": 0 }));
    }

    let saved = state.store.save_to(&SqliteAttendance::new(conn));
    if let Err(e) = saved {
        warn!(error = %e, "attendance write-through failed; restoring previous records");
        state.store = AttendanceStore::with_records(before);
        return Err(HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "attendance_records" })));
    }

    let payload = match &target {
        PurgeTarget::Student(id) => json!({ "kind": "purged", "studentId": id }),
        PurgeTarget::Class(id) => json!({ "kind": "purged", "classId": id }),
    };
    state.updates.publish(Channel::Attendance, &payload);
    Ok(json!({ "removed": removed }))
}

fn handle_attendance_submit_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = attendance_submit_batch(state, &req.params);
    respond(req, result)
}

fn handle_attendance_query(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, attendance_query(state, &req.params))
}

fn handle_attendance_for_date(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, attendance_for_date(state, &req.params))
}

fn handle_attendance_purge(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = attendance_purge(state, &req.params);
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.submitBatch" => Some(handle_attendance_submit_batch(state, req)),
        "attendance.query" => Some(handle_attendance_query(state, req)),
        "attendance.forDate" => Some(handle_attendance_for_date(state, req)),
        "attendance.purge" => Some(handle_attendance_purge(state, req)),
        _ => None,
    }
}
