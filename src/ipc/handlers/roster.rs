use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use log::info;
use serde_json::json;
use std::collections::HashMap;

fn handle_roster_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.db;

    let mut stmt = match conn
        .prepare("SELECT id, full_name, group_code FROM students ORDER BY sort_order")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = match stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut present: HashMap<String, Vec<String>> = HashMap::new();
    let mut absent: HashMap<String, Vec<String>> = HashMap::new();
    let mut mark_stmt = match conn.prepare("SELECT student_id, date, status FROM marks ORDER BY date")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mark_rows = match mark_stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    for (student_id, date, status) in mark_rows {
        if status == db::STATUS_PRESENT {
            present.entry(student_id).or_default().push(date);
        } else {
            absent.entry(student_id).or_default().push(date);
        }
    }

    let students_json: Vec<serde_json::Value> = students
        .iter()
        .map(|(id, name, group)| {
            json!({
                "studentId": id,
                "name": name,
                "group": group,
                "presentDates": present.get(id).cloned().unwrap_or_default(),
                "absentDates": absent.get(id).cloned().unwrap_or_default()
            })
        })
        .collect();

    let count = students_json.len();
    ok(
        &req.id,
        json!({
            "students": students_json,
            "count": count
        }),
    )
}

fn handle_roster_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let tx = match state.db.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM marks", []) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    let cleared = match tx.execute("DELETE FROM students", []) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    if let Some(view) = state.view.as_mut() {
        view.visible = None;
    }
    info!("roster cleared students={}", cleared);
    ok(&req.id, json!({ "cleared": cleared }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.list" => Some(handle_roster_list(state, req)),
        "roster.clear" => Some(handle_roster_clear(state, req)),
        _ => None,
    }
}
