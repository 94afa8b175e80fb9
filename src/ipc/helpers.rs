use crate::analytics::{Period, PeriodFilter};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::StoreError;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn query_failed(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        HandlerErr::new(e.code(), e.to_string())
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    get_optional_str(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{} must be a string", key)));
            };
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
    }
}

pub fn parse_date(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    parse_date(&get_required_str(params, key)?, key)
}

pub fn get_optional_date(params: &serde_json::Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    get_optional_str(params, key)?
        .map(|s| parse_date(&s, key))
        .transpose()
}

/// `period` + `anchor`; both absent means "all time".
pub fn get_period_filter(params: &serde_json::Value) -> Result<Option<PeriodFilter>, HandlerErr> {
    let Some(raw) = get_optional_str(params, "period")? else {
        return Ok(None);
    };
    let period = match raw.to_ascii_lowercase().as_str() {
        "all" => return Ok(None),
        "day" => Period::Day,
        "month" => Period::Month,
        "year" => Period::Year,
        _ => {
            return Err(HandlerErr::bad_params(
                "period must be day, month, year or all",
            ))
        }
    };
    let anchor = get_required_date(params, "anchor")?;
    Ok(Some(PeriodFilter::new(period, anchor)))
}

pub fn get_required_year(params: &serde_json::Value, key: &str) -> Result<i32, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .and_then(|y| i32::try_from(y).ok())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("encode_failed", e.to_string()))
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}
