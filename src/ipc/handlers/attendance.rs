use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::validate::{self, EntryError};
use chrono::Local;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn query_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    }
}

fn update_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: None,
    }
}

fn entry_err(e: EntryError, value: &str) -> HandlerErr {
    HandlerErr {
        code: e.code(),
        message: e.message().to_string(),
        details: Some(json!({ "value": value })),
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn iso(date: chrono::NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Manual entry: validate, resolve or create the student, mark present.
/// Validation failures leave the store untouched.
fn attendance_add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let full_name = get_required_str(params, "fullName")?.trim().to_string();
    let group = get_required_str(params, "group")?.trim().to_string();
    let date_raw = get_required_str(params, "date")?.trim().to_string();
    if full_name.is_empty() || group.is_empty() || date_raw.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "fullName, group and date must all be filled".to_string(),
            details: None,
        });
    }

    validate::validate_full_name(&full_name).map_err(|e| entry_err(e, &full_name))?;
    validate::validate_group(&group).map_err(|e| entry_err(e, &group))?;
    let date = validate::parse_entry_date(&date_raw, Local::now().date_naive())
        .map_err(|e| entry_err(e, &date_raw))?;

    let existing = db::find_student_id(conn, &full_name, &group).map_err(query_err)?;
    let (student_id, created) = match existing {
        Some(id) => (id, false),
        None => {
            let Some((last, first, patronymic)) = validate::split_name(&full_name) else {
                return Err(entry_err(EntryError::Name, &full_name));
            };
            let id = Uuid::new_v4().to_string();
            db::insert_student(conn, &id, &last, &first, &patronymic, &group, &full_name)
                .map_err(update_err)?;
            (id, true)
        }
    };

    db::upsert_mark(conn, &student_id, &iso(date), db::STATUS_PRESENT).map_err(update_err)?;
    Ok(json!({ "studentId": student_id, "created": created }))
}

fn attendance_mark_day(
    conn: &Connection,
    params: &serde_json::Value,
    status: &'static str,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let date_raw = get_required_str(params, "date")?;
    let date = validate::parse_entry_date(date_raw.trim(), Local::now().date_naive())
        .map_err(|e| entry_err(e, &date_raw))?;

    if !db::student_exists(conn, &student_id).map_err(query_err)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        });
    }
    db::upsert_mark(conn, &student_id, &iso(date), status).map_err(update_err)?;
    Ok(json!({ "studentId": student_id, "date": iso(date), "status": status }))
}

fn attendance_clear_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if !db::student_exists(conn, &student_id).map_err(query_err)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        });
    }
    let removed = db::clear_student_marks(conn, &student_id).map_err(update_err)?;
    Ok(json!({ "studentId": student_id, "removed": removed }))
}

/// Stamps one date for many students in a single transaction, with
/// per-entry diagnostics instead of an all-or-nothing failure.
fn attendance_roll_call(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date_raw = get_required_str(params, "date")?;
    let date = validate::parse_entry_date(date_raw.trim(), Local::now().date_naive())
        .map_err(|e| entry_err(e, &date_raw))?;
    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing entries[]".to_string(),
            details: None,
        });
    };

    let day = iso(date);
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;

    let mut updated = 0usize;
    let mut errors: Vec<serde_json::Value> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let Some(student_id) = entry.get("studentId").and_then(|v| v.as_str()) else {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": "entry missing studentId"
            }));
            continue;
        };
        let status = match entry.get("status").and_then(|v| v.as_str()) {
            Some("present") => db::STATUS_PRESENT,
            Some("absent") => db::STATUS_ABSENT,
            _ => {
                errors.push(json!({
                    "index": i,
                    "studentId": student_id,
                    "code": "bad_params",
                    "message": "status must be present or absent"
                }));
                continue;
            }
        };
        if !db::student_exists(&tx, student_id).map_err(query_err)? {
            errors.push(json!({
                "index": i,
                "studentId": student_id,
                "code": "not_found",
                "message": "student not found"
            }));
            continue;
        }
        db::upsert_mark(&tx, student_id, &day, status).map_err(update_err)?;
        updated += 1;
    }

    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    let rejected = errors.len();
    let mut result = json!({ "updated": updated, "rejected": rejected });
    if !errors.is_empty() {
        result["errors"] = json!(errors);
    }
    Ok(result)
}

fn handle_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    match attendance_add(&state.db, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_mark_present(state: &mut AppState, req: &Request) -> serde_json::Value {
    match attendance_mark_day(&state.db, &req.params, db::STATUS_PRESENT) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_mark_absent(state: &mut AppState, req: &Request) -> serde_json::Value {
    match attendance_mark_day(&state.db, &req.params, db::STATUS_ABSENT) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_clear_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    match attendance_clear_student(&state.db, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_roll_call(state: &mut AppState, req: &Request) -> serde_json::Value {
    match attendance_roll_call(&state.db, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.add" => Some(handle_add(state, req)),
        "attendance.markPresent" => Some(handle_mark_present(state, req)),
        "attendance.markAbsent" => Some(handle_mark_absent(state, req)),
        "attendance.clearStudent" => Some(handle_clear_student(state, req)),
        "attendance.rollCall" => Some(handle_roll_call(state, req)),
        _ => None,
    }
}
