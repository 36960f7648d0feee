use crate::grid::{self, CommitRow};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, GridView, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

fn parse_rows(params: &serde_json::Value) -> Result<Vec<CommitRow>, String> {
    match params.get("rows") {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| format!("rows must be an array of {{studentId, marks}}: {}", e)),
    }
}

pub(crate) fn grid_payload(
    conn: &Connection,
    month: NaiveDate,
    visible: Option<&[String]>,
) -> rusqlite::Result<serde_json::Value> {
    let rows = grid::project_rows(conn, month, visible)?;
    let row_count = rows.len();
    Ok(json!({
        "month": grid::month_key(month),
        "columns": grid::columns_for(month),
        "rowCount": row_count,
        "rows": rows
    }))
}

fn handle_grid_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let month_raw = req.params.get("month").and_then(|v| v.as_str()).unwrap_or("");
    let month = match grid::parse_month_key(month_raw) {
        Ok(m) => m,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let rows = match parse_rows(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    // Opening over a live session is a grid replacement like any other:
    // in-progress edits reconcile against the month they were made in.
    let mut commit_warnings: Vec<serde_json::Value> = Vec::new();
    if !rows.is_empty() {
        if let Some(view) = state.view.as_ref() {
            match grid::commit_rows(&state.db, view.month, &rows) {
                Ok(outcome) => commit_warnings = outcome.warnings,
                Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
            }
        }
    }

    state.view = Some(GridView {
        month,
        visible: None,
    });
    match grid_payload(&state.db, month, None) {
        Ok(mut result) => {
            if !commit_warnings.is_empty() {
                result["warnings"] = json!(commit_warnings);
            }
            ok(&req.id, result)
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_grid_select_month(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(view) = state.view.as_ref() else {
        return err(&req.id, "no_grid", "open a grid first", None);
    };
    let prev_month = view.month;
    let visible = view.visible.clone();

    let month_raw = req.params.get("month").and_then(|v| v.as_str()).unwrap_or("");
    let month = match grid::parse_month_key(month_raw) {
        Ok(m) => m,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let rows = match parse_rows(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    // Displayed edits belong to the previous reference month; fold them
    // in before the columns change shape.
    let mut commit_warnings: Vec<serde_json::Value> = Vec::new();
    if !rows.is_empty() {
        match grid::commit_rows(&state.db, prev_month, &rows) {
            Ok(outcome) => commit_warnings = outcome.warnings,
            Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
        }
    }

    state.view = Some(GridView {
        month,
        visible: visible.clone(),
    });
    match grid_payload(&state.db, month, visible.as_deref()) {
        Ok(mut result) => {
            if !commit_warnings.is_empty() {
                result["warnings"] = json!(commit_warnings);
            }
            ok(&req.id, result)
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_grid_commit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(view) = state.view.as_ref() else {
        return err(&req.id, "no_grid", "open a grid first", None);
    };
    let month = view.month;
    let rows = match parse_rows(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    match grid::commit_rows(&state.db, month, &rows) {
        Ok(outcome) => {
            let mut result = json!({ "updated": outcome.updated });
            if !outcome.warnings.is_empty() {
                result["warnings"] = json!(outcome.warnings);
            }
            ok(&req.id, result)
        }
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grid.open" => Some(handle_grid_open(state, req)),
        "grid.selectMonth" => Some(handle_grid_select_month(state, req)),
        "grid.commit" => Some(handle_grid_commit(state, req)),
        _ => None,
    }
}
