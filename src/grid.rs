use chrono::{Datelike, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use crate::db;

pub const MARK_PRESENT: &str = "✓";
pub const MARK_ABSENT: &str = "✗";
pub const FIXED_COLUMNS: [&str; 3] = ["Name", "Group", "Count"];

/// Parses a `YYYY-MM` key into the first day of that month.
///
/// Bare `MM` keys are rejected: resolving them would need the wall-clock
/// year, and reconciliation must only ever use the month that shaped the
/// displayed columns.
pub fn parse_month_key(raw: &str) -> Result<NaiveDate, String> {
    let t = raw.trim();
    let Some((y, m)) = t.split_once('-') else {
        return Err("month must be YYYY-MM".to_string());
    };
    let year = y
        .parse::<i32>()
        .map_err(|_| "month year must be numeric".to_string())?;
    let month = m
        .parse::<u32>()
        .map_err(|_| "month must be YYYY-MM".to_string())?;
    if !(1..=12).contains(&month) {
        return Err("month must be between 01 and 12".to_string());
    }
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| "month is out of range".to_string())
}

pub fn month_key(month: NaiveDate) -> String {
    month.format("%Y-%m").to_string()
}

/// Every calendar day of the month, first to last inclusive.
pub fn month_days(month: NaiveDate) -> Vec<NaiveDate> {
    month
        .with_day(1)
        .unwrap_or(month)
        .iter_days()
        .take_while(|d| d.month() == month.month() && d.year() == month.year())
        .collect()
}

/// Column schema for a reference month: the three fixed columns followed
/// by one `dd.mm` label per calendar day.
pub fn columns_for(month: NaiveDate) -> Vec<String> {
    let mut cols: Vec<String> = FIXED_COLUMNS.iter().map(|s| s.to_string()).collect();
    cols.extend(
        month_days(month)
            .iter()
            .map(|d| d.format("%d.%m").to_string()),
    );
    cols
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRow {
    pub student_id: String,
    pub name: String,
    pub group: String,
    pub count: usize,
    pub marks: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRow {
    pub student_id: String,
    #[serde(default)]
    pub marks: Vec<String>,
}

pub struct CommitOutcome {
    pub updated: usize,
    pub warnings: Vec<serde_json::Value>,
}

struct RosterRow {
    id: String,
    name: String,
    group: String,
}

fn map_roster_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<RosterRow> {
    Ok(RosterRow {
        id: r.get(0)?,
        name: r.get(1)?,
        group: r.get(2)?,
    })
}

fn roster_rows(conn: &Connection, visible: Option<&[String]>) -> rusqlite::Result<Vec<RosterRow>> {
    match visible {
        None => {
            let mut stmt = conn
                .prepare("SELECT id, full_name, group_code FROM students ORDER BY sort_order")?;
            let rows = stmt.query_map([], map_roster_row)?;
            rows.collect()
        }
        Some(ids) => {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = std::iter::repeat_n("?", ids.len())
                .collect::<Vec<_>>()
                .join(",");
            let sql = format!(
                "SELECT id, full_name, group_code FROM students
                 WHERE id IN ({})
                 ORDER BY sort_order",
                placeholders
            );
            let binds: Vec<Value> = ids.iter().map(|id| Value::Text(id.clone())).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(binds), map_roster_row)?;
            rows.collect()
        }
    }
}

/// Projects the store into one dense row per visible student for the
/// reference month. One range query over marks, indexed per student, so
/// the refresh stays linear in students × days.
pub fn project_rows(
    conn: &Connection,
    month: NaiveDate,
    visible: Option<&[String]>,
) -> rusqlite::Result<Vec<GridRow>> {
    let students = roster_rows(conn, visible)?;
    let days = month_days(month);
    let iso_days: Vec<String> = days.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect();

    let mut by_student: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut stmt =
        conn.prepare("SELECT student_id, date, status FROM marks WHERE date >= ? AND date <= ?")?;
    let mark_rows = stmt.query_map((&iso_days[0], &iso_days[iso_days.len() - 1]), |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
        ))
    })?;
    for row in mark_rows {
        let (student_id, date, status) = row?;
        by_student.entry(student_id).or_default().insert(date, status);
    }

    Ok(students
        .into_iter()
        .map(|s| {
            let day_marks = by_student.get(&s.id);
            // Count comes from the store's attendance dates inside the
            // month, not from the rendered symbols.
            let count = day_marks
                .map(|m| m.values().filter(|v| *v == db::STATUS_PRESENT).count())
                .unwrap_or(0);
            let marks = iso_days
                .iter()
                .map(|iso| {
                    match day_marks.and_then(|m| m.get(iso)).map(String::as_str) {
                        Some(db::STATUS_PRESENT) => MARK_PRESENT.to_string(),
                        Some(db::STATUS_ABSENT) => MARK_ABSENT.to_string(),
                        _ => String::new(),
                    }
                })
                .collect();
            GridRow {
                student_id: s.id,
                name: s.name,
                group: s.group,
                count,
                marks,
            }
        })
        .collect())
}

/// Folds displayed rows back into the store for one reference month.
///
/// Per row: clear the student's marks inside the displayed window, then
/// re-derive each day from its cell symbol with the same date-to-column
/// mapping the projection used. Dates outside the window are untouched;
/// rows naming unknown students are reported, not fatal.
pub fn commit_rows(
    conn: &Connection,
    month: NaiveDate,
    rows: &[CommitRow],
) -> rusqlite::Result<CommitOutcome> {
    let days = month_days(month);
    let iso_days: Vec<String> = days.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect();
    let first = &iso_days[0];
    let last = &iso_days[iso_days.len() - 1];

    let tx = conn.unchecked_transaction()?;
    let mut updated = 0usize;
    let mut warnings: Vec<serde_json::Value> = Vec::new();

    for row in rows {
        if !db::student_exists(&tx, &row.student_id)? {
            warnings.push(json!({
                "studentId": row.student_id,
                "code": "unknown_student",
                "message": "student not in roster"
            }));
            continue;
        }
        tx.execute(
            "DELETE FROM marks WHERE student_id = ? AND date >= ? AND date <= ?",
            (&row.student_id, first, last),
        )?;
        for (i, iso) in iso_days.iter().enumerate() {
            // Rows may arrive shorter or longer than the month; missing
            // cells are unmarked.
            let cell = row.marks.get(i).map(String::as_str).unwrap_or("");
            let status = match cell.trim() {
                MARK_PRESENT => db::STATUS_PRESENT,
                MARK_ABSENT => db::STATUS_ABSENT,
                _ => continue,
            };
            db::upsert_mark(&tx, &row.student_id, iso, status)?;
        }
        updated += 1;
    }

    tx.commit()?;
    Ok(CommitOutcome { updated, warnings })
}
