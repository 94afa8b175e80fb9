use crate::db::{self, SqliteAttendance};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::AttendanceStore;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let record_count = match state.store.len() {
        Ok(n) => n,
        Err(e) => return err(&req.id, e.code(), e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "recordCount": record_count
        }),
    )
}

/// Opens the workspace database and replaces the in-memory store with its contents.
pub fn select_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<usize> {
    let conn = db::open_db(path)?;
    let store = AttendanceStore::load(&SqliteAttendance::new(&conn))?;
    let count = store.len()?;
    state.store = store;
    state.db = Some(conn);
    state.workspace = Some(path.to_path_buf());
    info!(workspace = %path.display(), records = count, "workspace selected");
    Ok(count)
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match select_workspace(state, &path) {
        Ok(count) => ok(
            &req.id,
            json!({ "workspacePath": path.to_string_lossy(), "recordCount": count }),
        ),
        Err(e) => {
            warn!(workspace = %path.display(), error = %e, "workspace open failed");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
