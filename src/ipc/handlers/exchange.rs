use crate::grid;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::validate;
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
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

fn required_path(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        }),
    }
}

/// A row as displayed: cells go to the file verbatim.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportRow {
    #[serde(default)]
    name: String,
    #[serde(default)]
    group: String,
    #[serde(default)]
    count: serde_json::Value,
    #[serde(default)]
    marks: Vec<String>,
}

fn cell_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn write_workbook(path: &Path, columns: &[String], rows: &[ExportRow]) -> anyhow::Result<()> {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| anyhow::anyhow!("workbook template has no sheet"))?;
    sheet.set_name("Attendance");

    for (i, col) in columns.iter().enumerate() {
        sheet.get_cell_mut(((i + 1) as u32, 1u32)).set_value_string(col.as_str());
    }
    for (r, row) in rows.iter().enumerate() {
        let row_no = (r + 2) as u32;
        sheet.get_cell_mut((1u32, row_no)).set_value(row.name.as_str());
        sheet.get_cell_mut((2u32, row_no)).set_value(row.group.as_str());
        sheet
            .get_cell_mut((3u32, row_no))
            .set_value(cell_text(&row.count));
        for (c, mark) in row.marks.iter().enumerate() {
            sheet
                .get_cell_mut(((c + 4) as u32, row_no))
                .set_value(mark.as_str());
        }
    }

    // Write beside the target and rename, so a failed export never
    // clobbers an existing file.
    let tmp = path.with_extension("xlsx.tmp");
    umya_spreadsheet::writer::xlsx::write(&book, &tmp)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn exchange_export(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(view) = state.view.as_ref() else {
        return Err(HandlerErr {
            code: "no_grid",
            message: "open a grid first".to_string(),
            details: None,
        });
    };

    let mut out_path = required_path(params, "outPath")?;
    if !out_path.to_ascii_lowercase().ends_with(".xlsx") {
        out_path.push_str(".xlsx");
    }

    let columns = grid::columns_for(view.month);
    let rows: Vec<ExportRow> = match params.get("rows") {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone()).map_err(|e| HandlerErr {
            code: "bad_params",
            message: format!("rows must be an array of grid rows: {}", e),
            details: None,
        })?,
        _ => grid::project_rows(&state.db, view.month, view.visible.as_deref())
            .map_err(query_err)?
            .into_iter()
            .map(|r| ExportRow {
                name: r.name,
                group: r.group,
                count: json!(r.count),
                marks: r.marks,
            })
            .collect(),
    };

    let path = PathBuf::from(&out_path);
    write_workbook(&path, &columns, &rows).map_err(|e| HandlerErr {
        code: "io_failed",
        message: e.to_string(),
        details: Some(json!({ "path": out_path })),
    })?;

    info!("exported grid rows={} path={}", rows.len(), out_path);
    Ok(json!({ "path": out_path, "rowsExported": rows.len() }))
}

struct StagedStudent {
    last_name: String,
    first_name: String,
    patronymic: String,
    group: String,
    full_name: String,
}

fn exchange_import(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let in_path = required_path(params, "inPath")?;
    let book = umya_spreadsheet::reader::xlsx::read(Path::new(&in_path)).map_err(|e| HandlerErr {
        code: "io_failed",
        message: e.to_string(),
        details: Some(json!({ "path": in_path })),
    })?;
    let Some(sheet) = book.get_sheet(&0) else {
        return Err(HandlerErr {
            code: "bad_workbook",
            message: "workbook has no sheets".to_string(),
            details: None,
        });
    };

    // Row 1 is the header; every later row supplies name and group.
    let mut staged: Vec<StagedStudent> = Vec::new();
    let mut warnings: Vec<serde_json::Value> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for row_no in 2..=sheet.get_highest_row() {
        let full_name = sheet.get_value((1u32, row_no)).trim().to_string();
        let group = sheet.get_value((2u32, row_no)).trim().to_string();
        if full_name.is_empty() && group.is_empty() {
            continue;
        }
        if full_name.is_empty() || group.is_empty() {
            warnings.push(json!({
                "row": row_no,
                "code": "empty_fields",
                "message": "name and group must both be present"
            }));
            continue;
        }
        let Some((last_name, first_name, patronymic)) = validate::split_name(&full_name) else {
            warnings.push(json!({
                "row": row_no,
                "code": "bad_full_name",
                "message": format!(
                    "name must contain at least surname and given name: {}",
                    full_name
                )
            }));
            continue;
        };
        let canonical = if patronymic.is_empty() {
            format!("{} {}", last_name, first_name)
        } else {
            format!("{} {} {}", last_name, first_name, patronymic)
        };
        if !seen.insert((canonical.clone(), group.clone())) {
            warnings.push(json!({
                "row": row_no,
                "code": "duplicate_student",
                "message": format!("duplicate name and group: {}", canonical)
            }));
            continue;
        }
        staged.push(StagedStudent {
            last_name,
            first_name,
            patronymic,
            group,
            full_name: canonical,
        });
    }

    // The replacement roster builds inside one transaction; a failure
    // rolls back to the pre-import roster.
    let tx = state.db.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    tx.execute("DELETE FROM marks", []).map_err(update_err)?;
    tx.execute("DELETE FROM students", []).map_err(update_err)?;
    for (i, s) in staged.iter().enumerate() {
        tx.execute(
            "INSERT INTO students(id, last_name, first_name, patronymic, group_code, full_name, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &s.last_name,
                &s.first_name,
                &s.patronymic,
                &s.group,
                &s.full_name,
                i as i64,
            ),
        )
        .map_err(update_err)?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    if let Some(view) = state.view.as_mut() {
        view.visible = None;
    }
    for w in &warnings {
        warn!("import row skipped: {}", w);
    }
    info!(
        "imported roster rows={} skipped={} path={}",
        staged.len(),
        warnings.len(),
        in_path
    );
    Ok(json!({
        "imported": staged.len(),
        "skipped": warnings.len(),
        "warnings": warnings
    }))
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    match exchange_export(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    match exchange_import(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.exportXlsx" => Some(handle_export(state, req)),
        "exchange.importXlsx" => Some(handle_import(state, req)),
        _ => None,
    }
}
