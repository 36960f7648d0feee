use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn columns(result: &serde_json::Value) -> Vec<String> {
    result
        .get("columns")
        .and_then(|v| v.as_array())
        .expect("columns")
        .iter()
        .map(|v| v.as_str().expect("column string").to_string())
        .collect()
}

#[test]
fn column_schema_matches_month_length() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let feb24 = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grid.open",
        json!({ "month": "2024-02" }),
    );
    let cols = columns(&feb24);
    assert_eq!(cols.len(), 3 + 29);
    assert_eq!(&cols[0..3], &["Name", "Group", "Count"]);
    assert_eq!(cols[3], "01.02");
    assert_eq!(cols.last().map(String::as_str), Some("29.02"));

    let feb23 = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grid.selectMonth",
        json!({ "month": "2023-02" }),
    );
    let cols = columns(&feb23);
    assert_eq!(cols.len(), 3 + 28);
    assert_eq!(cols.last().map(String::as_str), Some("28.02"));

    let apr24 = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grid.selectMonth",
        json!({ "month": "2024-04" }),
    );
    let cols = columns(&apr24);
    assert_eq!(cols.len(), 3 + 30);
    assert_eq!(cols.last().map(String::as_str), Some("30.04"));
}

#[test]
fn rows_project_store_marks_and_month_count() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.add",
        json!({
            "fullName": "Иванов Иван Иванович",
            "group": "12345678",
            "date": "2024-03-05"
        }),
    );
    let student_id = added
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.markAbsent",
        json!({ "studentId": student_id, "date": "2024-03-12" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.markPresent",
        json!({ "studentId": student_id, "date": "2024-03-20" }),
    );
    // A mark outside the reference month must not leak into the grid.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.markPresent",
        json!({ "studentId": student_id, "date": "2024-04-02" }),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grid.open",
        json!({ "month": "2024-03" }),
    );
    let rows = opened.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(
        row.get("name").and_then(|v| v.as_str()),
        Some("Иванов Иван Иванович")
    );
    assert_eq!(row.get("group").and_then(|v| v.as_str()), Some("12345678"));
    assert_eq!(row.get("count").and_then(|v| v.as_u64()), Some(2));

    let marks: Vec<&str> = row
        .get("marks")
        .and_then(|v| v.as_array())
        .expect("marks")
        .iter()
        .map(|v| v.as_str().expect("mark string"))
        .collect();
    assert_eq!(marks.len(), 31);
    for (i, mark) in marks.iter().enumerate() {
        match i {
            4 => assert_eq!(*mark, "✓"),
            11 => assert_eq!(*mark, "✗"),
            19 => assert_eq!(*mark, "✓"),
            _ => assert_eq!(*mark, "", "unexpected mark on day {}", i + 1),
        }
    }
}
