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

fn add_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    full_name: &str,
    group: &str,
    date: &str,
) -> String {
    let added = request_ok(
        stdin,
        reader,
        id,
        "attendance.add",
        json!({ "fullName": full_name, "group": group, "date": date }),
    );
    added
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string()
}

fn student_dates(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student_id: &str,
) -> (Vec<String>, Vec<String>) {
    let roster = request_ok(stdin, reader, id, "roster.list", json!({}));
    let student = roster
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students")
        .iter()
        .find(|s| s.get("studentId").and_then(|v| v.as_str()) == Some(student_id))
        .expect("student in roster")
        .clone();
    let dates = |key: &str| -> Vec<String> {
        student
            .get(key)
            .and_then(|v| v.as_array())
            .expect("dates")
            .iter()
            .map(|v| v.as_str().expect("date string").to_string())
            .collect()
    };
    (dates("presentDates"), dates("absentDates"))
}

#[test]
fn present_and_absent_are_mutually_exclusive() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let sid = add_student(
        &mut stdin,
        &mut reader,
        "1",
        "Иванов Иван Иванович",
        "12345678",
        "2024-03-05",
    );

    let (present, absent) = student_dates(&mut stdin, &mut reader, "2", &sid);
    assert_eq!(present, vec!["2024-03-05".to_string()]);
    assert!(absent.is_empty());

    // Flipping to absent evicts the attendance entry for that day.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.markAbsent",
        json!({ "studentId": sid, "date": "2024-03-05" }),
    );
    let (present, absent) = student_dates(&mut stdin, &mut reader, "4", &sid);
    assert!(present.is_empty());
    assert_eq!(absent, vec!["2024-03-05".to_string()]);

    // And back again.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.markPresent",
        json!({ "studentId": sid, "date": "2024-03-05" }),
    );
    let (present, absent) = student_dates(&mut stdin, &mut reader, "6", &sid);
    assert_eq!(present, vec!["2024-03-05".to_string()]);
    assert!(absent.is_empty());

    // Re-marking the same day is idempotent.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.markPresent",
        json!({ "studentId": sid, "date": "2024-03-05" }),
    );
    let (present, _) = student_dates(&mut stdin, &mut reader, "8", &sid);
    assert_eq!(present.len(), 1);
}

#[test]
fn clear_student_empties_both_sets_and_keeps_the_student() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let sid = add_student(
        &mut stdin,
        &mut reader,
        "1",
        "Петров Петр Петрович",
        "11112222",
        "2024-03-05",
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.markAbsent",
        json!({ "studentId": sid, "date": "2024-03-06" }),
    );

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.clearStudent",
        json!({ "studentId": sid }),
    );
    assert_eq!(cleared.get("removed").and_then(|v| v.as_u64()), Some(2));

    let (present, absent) = student_dates(&mut stdin, &mut reader, "4", &sid);
    assert!(present.is_empty());
    assert!(absent.is_empty());
}

#[test]
fn roll_call_stamps_one_day_with_diagnostics() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let a = add_student(
        &mut stdin,
        &mut reader,
        "1",
        "Иванов Иван Иванович",
        "12345678",
        "2024-03-01",
    );
    let b = add_student(
        &mut stdin,
        &mut reader,
        "2",
        "Петров Петр Петрович",
        "12345678",
        "2024-03-01",
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.rollCall",
        json!({
            "date": "2024-03-07",
            "entries": [
                { "studentId": a, "status": "present" },
                { "studentId": b, "status": "absent" },
                { "studentId": "no-such-student", "status": "present" },
                { "studentId": a, "status": "late" }
            ]
        }),
    );
    assert_eq!(result.get("updated").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(result.get("rejected").and_then(|v| v.as_u64()), Some(2));
    let errors = result
        .get("errors")
        .and_then(|v| v.as_array())
        .expect("errors");
    assert!(errors
        .iter()
        .any(|e| e.get("code").and_then(|v| v.as_str()) == Some("not_found")));
    assert!(errors
        .iter()
        .any(|e| e.get("code").and_then(|v| v.as_str()) == Some("bad_params")));

    let (present_a, _) = student_dates(&mut stdin, &mut reader, "4", &a);
    assert!(present_a.contains(&"2024-03-07".to_string()));
    let (_, absent_b) = student_dates(&mut stdin, &mut reader, "5", &b);
    assert!(absent_b.contains(&"2024-03-07".to_string()));
}
