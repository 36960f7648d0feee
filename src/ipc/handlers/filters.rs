use crate::grid;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::grid::grid_payload;
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

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

enum FilterKind {
    ByDate,
    ByGroup,
    ByName,
}

fn parse_kind(raw: &str) -> Option<FilterKind> {
    match raw {
        "by-date" => Some(FilterKind::ByDate),
        "by-group" => Some(FilterKind::ByGroup),
        "by-name" => Some(FilterKind::ByName),
        _ => None,
    }
}

fn matching_ids(
    conn: &Connection,
    kind: &FilterKind,
    input: &str,
) -> Result<Vec<String>, HandlerErr> {
    match kind {
        FilterKind::ByDate => {
            let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| HandlerErr {
                code: "bad_date",
                message: "filter date must be a valid yyyy-mm-dd calendar date".to_string(),
                details: Some(json!({ "value": input })),
            })?;
            let day = date.format("%Y-%m-%d").to_string();
            let mut stmt = conn
                .prepare(
                    "SELECT s.id FROM students s
                     JOIN marks m ON m.student_id = s.id
                     WHERE m.date = ? AND m.status = 'present'
                     ORDER BY s.sort_order",
                )
                .map_err(query_err)?;
            stmt.query_map([&day], |r| r.get::<_, String>(0))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(query_err)
        }
        FilterKind::ByGroup | FilterKind::ByName => {
            // SQLite LIKE folds case for ASCII only; Cyrillic names need
            // Rust-side folding.
            let needle = input.to_lowercase();
            let mut stmt = conn
                .prepare("SELECT id, full_name, group_code FROM students ORDER BY sort_order")
                .map_err(query_err)?;
            let rows = stmt
                .query_map([], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                    ))
                })
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(query_err)?;
            Ok(rows
                .into_iter()
                .filter(|(_, name, group)| match kind {
                    FilterKind::ByGroup => group.to_lowercase() == needle,
                    _ => name.to_lowercase().contains(&needle),
                })
                .map(|(id, _, _)| id)
                .collect())
        }
    }
}

fn parse_rows(params: &serde_json::Value) -> Result<Vec<grid::CommitRow>, HandlerErr> {
    match params.get("rows") {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| HandlerErr {
            code: "bad_params",
            message: format!("rows must be an array of {{studentId, marks}}: {}", e),
            details: None,
        }),
    }
}

fn handle_filter_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(view) = state.view.as_ref() else {
        return err(&req.id, "no_grid", "open a grid first", None);
    };
    let month = view.month;

    let kind_raw = match req.params.get("kind").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing kind", None),
    };
    let Some(kind) = parse_kind(&kind_raw) else {
        return err(
            &req.id,
            "bad_params",
            "kind must be one of: by-date, by-group, by-name",
            Some(json!({ "kind": kind_raw })),
        );
    };
    let input = match req.params.get("input").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing input", None),
    };
    if input.is_empty() {
        return err(&req.id, "bad_params", "filter input must not be empty", None);
    }
    let rows = match parse_rows(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Unsaved edits fold into the store before the view narrows, so edits
    // on rows the filter hides are never lost.
    if !rows.is_empty() {
        if let Err(e) = grid::commit_rows(&state.db, month, &rows) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    let ids = match matching_ids(&state.db, &kind, &input) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Some(view) = state.view.as_mut() {
        view.visible = Some(ids.clone());
    }

    match grid_payload(&state.db, month, Some(ids.as_slice())) {
        Ok(mut result) => {
            result["matched"] = json!(ids.len());
            ok(&req.id, result)
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_filter_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(view) = state.view.as_ref() else {
        return err(&req.id, "no_grid", "open a grid first", None);
    };
    let month = view.month;

    let rows = match parse_rows(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if !rows.is_empty() {
        if let Err(e) = grid::commit_rows(&state.db, month, &rows) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    if let Some(view) = state.view.as_mut() {
        view.visible = None;
    }
    match grid_payload(&state.db, month, None) {
        Ok(result) => ok(&req.id, result),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "filter.apply" => Some(handle_filter_apply(state, req)),
        "filter.reset" => Some(handle_filter_reset(state, req)),
        _ => None,
    }
}
