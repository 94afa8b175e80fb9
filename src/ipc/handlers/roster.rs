use crate::db::{self, SqliteRoster};
use crate::ipc::helpers::{db_conn, get_optional_str, get_required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::{ClassInfo, Roster};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn parse_student_ids(params: &serde_json::Value) -> Result<Vec<String>, HandlerErr> {
    let Some(arr) = params.get("studentIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing studentIds"));
    };
    let mut ids = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(HandlerErr::bad_params("studentIds must be non-empty strings"));
        };
        if !ids.iter().any(|x: &String| x == s) {
            ids.push(s.to_string());
        }
    }
    Ok(ids)
}

fn roster_set(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_optional_str(params, "name")?.unwrap_or_else(|| class_id.clone());
    let section = get_optional_str(params, "section")?.unwrap_or_default();
    let student_ids = parse_student_ids(params)?;

    let info = ClassInfo {
        id: class_id,
        name,
        section,
    };
    db::upsert_class(conn, &info, &student_ids).map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string()).with_details(json!({ "table": "class_students" }))
    })?;
    info!(class_id = %info.id, students = student_ids.len(), "roster updated");
    Ok(json!({ "classId": info.id, "studentCount": student_ids.len() }))
}

fn roster_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let Some(info) = db::get_class(conn, &class_id).map_err(HandlerErr::query_failed)? else {
        return Err(HandlerErr::new("not_found", "class not found"));
    };
    let students = SqliteRoster::new(conn)
        .students_in_class(&class_id)
        .map_err(HandlerErr::query_failed)?;
    Ok(json!({
        "class": info,
        "studentIds": students
    }))
}

fn handle_roster_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| roster_set(conn, &req.params));
    respond(req, result)
}

fn handle_roster_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| roster_get(conn, &req.params));
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.set" => Some(handle_roster_set(state, req)),
        "roster.get" => Some(handle_roster_get(state, req)),
        _ => None,
    }
}
