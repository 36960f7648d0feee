use log::info;
use rusqlite::{Connection, OptionalExtension};

pub const STATUS_PRESENT: &str = "present";
pub const STATUS_ABSENT: &str = "absent";

/// Opens the session store. All state is in-memory; process exit discards it.
pub fn open_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            patronymic TEXT NOT NULL DEFAULT '',
            group_code TEXT NOT NULL,
            full_name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            UNIQUE(full_name, group_code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX idx_students_sort ON students(sort_order)",
        [],
    )?;

    // One row per (student, day): a date is present, absent, or unmarked,
    // never two of those at once.
    conn.execute(
        "CREATE TABLE marks(
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('present','absent')),
            PRIMARY KEY(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute("CREATE INDEX idx_marks_date ON marks(date)", [])?;

    info!("store open mode=memory");
    Ok(conn)
}

pub fn student_exists(conn: &Connection, student_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

pub fn find_student_id(
    conn: &Connection,
    full_name: &str,
    group_code: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM students WHERE full_name = ? AND group_code = ?",
        (full_name, group_code),
        |r| r.get(0),
    )
    .optional()
}

pub fn insert_student(
    conn: &Connection,
    id: &str,
    last_name: &str,
    first_name: &str,
    patronymic: &str,
    group_code: &str,
    full_name: &str,
) -> rusqlite::Result<()> {
    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students",
        [],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO students(id, last_name, first_name, patronymic, group_code, full_name, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (id, last_name, first_name, patronymic, group_code, full_name, sort_order),
    )?;
    Ok(())
}

pub fn upsert_mark(
    conn: &Connection,
    student_id: &str,
    date_iso: &str,
    status: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO marks(student_id, date, status)
         VALUES(?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET
           status = excluded.status",
        (student_id, date_iso, status),
    )?;
    Ok(())
}

pub fn clear_student_marks(conn: &Connection, student_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM marks WHERE student_id = ?", [student_id])
}
