use crate::analytics::{self, PeriodFilter};
use crate::db::{self, SqliteRoster};
use crate::ipc::helpers::{
    db_conn, get_optional_str, get_period_filter, get_required_str, get_required_year, respond,
    to_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::AttendanceRecord;
use crate::roster::{ClassInfo, Roster};
use crate::store::AttendanceQuery;
use chrono::Datelike;
use rusqlite::Connection;
use serde_json::json;

fn scoped_records(
    state: &AppState,
    student_id: Option<String>,
    class_id: Option<String>,
    period: Option<PeriodFilter>,
) -> Result<Vec<AttendanceRecord>, HandlerErr> {
    let query = AttendanceQuery {
        student_id,
        class_id,
        ..AttendanceQuery::default()
    };
    let records = state.store.query(&query)?;
    Ok(match period {
        Some(p) => analytics::filter_by_period(&records, p.period, p.anchor),
        None => records,
    })
}

fn require_class(conn: &Connection, class_id: &str) -> Result<ClassInfo, HandlerErr> {
    db::get_class(conn, class_id)
        .map_err(HandlerErr::query_failed)?
        .ok_or_else(|| HandlerErr::new("not_found", "class not found"))
}

fn analytics_stats(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    db_conn(state)?;
    let period = get_period_filter(params)?;
    let records = scoped_records(
        state,
        get_optional_str(params, "studentId")?,
        get_optional_str(params, "classId")?,
        period,
    )?;
    Ok(json!({
        "period": to_json(&period)?,
        "periodLabel": period.map(|p| p.label()),
        "stats": to_json(&analytics::compute_stats(&records))?,
        "unrecognizedCount": analytics::unrecognized_count(&records)
    }))
}

fn analytics_class_open(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_id = get_required_str(params, "classId")?;
    let period = get_period_filter(params)?;
    let class = require_class(conn, &class_id)?;
    let roster = SqliteRoster::new(conn)
        .students_in_class(&class_id)
        .map_err(HandlerErr::query_failed)?;

    let records = scoped_records(state, None, Some(class_id.clone()), None)?;
    let drilldown = analytics::class_drilldown(&records, &class_id, &roster, period);

    let mut result = to_json(&drilldown)?;
    result["class"] = to_json(&class)?;
    result["periodLabel"] = json!(period.map(|p| p.label()));
    Ok(result)
}

fn analytics_student_open(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    db_conn(state)?;
    let class_id = get_required_str(params, "classId")?;
    let student_id = get_required_str(params, "studentId")?;
    let period = get_period_filter(params)?;

    let records = scoped_records(state, Some(student_id.clone()), Some(class_id.clone()), None)?;
    let drilldown = analytics::student_drilldown(&records, &student_id, &class_id, period);
    to_json(&drilldown)
}

fn analytics_student_yearly(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    db_conn(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let year = get_required_year(params, "year")?;
    let records = scoped_records(state, Some(student_id.clone()), None, None)?;
    to_json(&analytics::student_yearly_summary(&records, &student_id, year))
}

fn analytics_classes_overview(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let classes = SqliteRoster::new(conn)
        .classes_with_students()
        .map_err(HandlerErr::query_failed)?;
    let records = state.store.snapshot()?;
    Ok(json!({ "classes": to_json(&analytics::class_overview(&records, &classes))? }))
}

fn analytics_periods(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    db_conn(state)?;
    let records = scoped_records(
        state,
        get_optional_str(params, "studentId")?,
        get_optional_str(params, "classId")?,
        None,
    )?;
    let years = analytics::available_years(&records);
    let year = match params.get("year") {
        Some(v) if !v.is_null() => Some(get_required_year(params, "year")?),
        _ => years.first().copied(),
    };
    let months = year
        .map(|y| analytics::available_months(&records, y))
        .unwrap_or_default();
    let latest = records.iter().map(|r| r.date).max();
    Ok(json!({
        "years": years,
        "year": year,
        "months": months,
        "latestDate": latest,
        "latestYear": latest.map(|d| d.year())
    }))
}

fn handle_analytics_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, analytics_stats(state, &req.params))
}

fn handle_analytics_class_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, analytics_class_open(state, &req.params))
}

fn handle_analytics_student_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, analytics_student_open(state, &req.params))
}

fn handle_analytics_student_yearly(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, analytics_student_yearly(state, &req.params))
}

fn handle_analytics_classes_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, analytics_classes_overview(state))
}

fn handle_analytics_periods(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, analytics_periods(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.stats" => Some(handle_analytics_stats(state, req)),
        "analytics.class.open" => Some(handle_analytics_class_open(state, req)),
        "analytics.student.open" => Some(handle_analytics_student_open(state, req)),
        "analytics.student.yearly" => Some(handle_analytics_student_yearly(state, req)),
        "analytics.classes.overview" => Some(handle_analytics_classes_overview(state, req)),
        "analytics.periods" => Some(handle_analytics_periods(state, req)),
        _ => None,
    }
}
