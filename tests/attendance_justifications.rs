use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_nexusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn nexusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    token: Option<&str>,
    params: serde_json::Value,
) -> serde_json::Value {
    let mut payload = json!({ "id": id, "method": method, "params": params });
    if let Some(token) = token {
        payload["token"] = json!(token);
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn result(value: &serde_json::Value) -> serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "call failed: {}",
        value
    );
    value["result"].clone()
}

#[test]
fn justification_decisions_drive_attendance_status() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    result(&request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        None,
        json!({ "path": workspace.path().to_string_lossy() }),
    ));
    let registered = result(&request(
        &mut stdin,
        &mut reader,
        "2",
        "auth.register",
        None,
        json!({
            "username": "homeroom",
            "email": "homeroom@example.com",
            "password": "password123",
            "schoolName": "Attendance School"
        }),
    ));
    let token = registered["token"].as_str().expect("token").to_string();

    let classroom = result(&request(
        &mut stdin,
        &mut reader,
        "3",
        "classrooms.create",
        Some(&token),
        json!({ "name": "3C", "year": 2024 }),
    ));
    let classroom_id = classroom["data"]["id"].as_str().expect("id").to_string();
    let student = result(&request(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        Some(&token),
        json!({ "firstName": "Joao", "lastName": "Pereira", "autoCreateUser": false }),
    ));
    let student_id = student["data"]["id"].as_str().expect("id").to_string();

    let absent = result(&request(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.upsert",
        Some(&token),
        json!({
            "studentId": student_id,
            "classroomId": classroom_id,
            "date": "2024-04-03",
            "status": "absent",
            "subject": "Mathematics"
        }),
    ));
    let attendance_id = absent["data"]["id"].as_str().expect("id").to_string();
    assert_eq!(absent["data"]["justified"].as_bool(), Some(false));

    // Re-recording the same key is an upsert, not a duplicate.
    let rerecorded = result(&request(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.upsert",
        Some(&token),
        json!({
            "studentId": student_id,
            "classroomId": classroom_id,
            "date": "2024-04-03",
            "status": "absent",
            "subject": "Mathematics"
        }),
    ));
    assert_eq!(
        rerecorded["data"]["id"].as_str(),
        Some(attendance_id.as_str())
    );

    // Default decision is approval, which excuses the absence.
    let justified = result(&request(
        &mut stdin,
        &mut reader,
        "7",
        "justifications.upsert",
        Some(&token),
        json!({ "attendanceId": attendance_id, "reason": "medical appointment" }),
    ));
    let justification_id = justified["data"]["id"].as_str().expect("id").to_string();
    assert_eq!(justified["data"]["status"].as_str(), Some("approved"));

    let listed = result(&request(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.list",
        Some(&token),
        json!({ "studentId": student_id }),
    ));
    assert_eq!(listed["data"][0]["status"].as_str(), Some("excused"));
    assert_eq!(listed["data"][0]["justified"].as_bool(), Some(true));

    // Rejecting flips the record back to absent.
    result(&request(
        &mut stdin,
        &mut reader,
        "9",
        "justifications.update",
        Some(&token),
        json!({ "justificationId": justification_id, "status": "rejected" }),
    ));
    let listed = result(&request(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.list",
        Some(&token),
        json!({ "studentId": student_id }),
    ));
    assert_eq!(listed["data"][0]["status"].as_str(), Some("absent"));
    assert_eq!(listed["data"][0]["justified"].as_bool(), Some(false));

    // Approve again, then delete: the excuse is withdrawn with it.
    result(&request(
        &mut stdin,
        &mut reader,
        "11",
        "justifications.update",
        Some(&token),
        json!({ "justificationId": justification_id, "status": "approved" }),
    ));
    result(&request(
        &mut stdin,
        &mut reader,
        "12",
        "justifications.delete",
        Some(&token),
        json!({ "justificationId": justification_id }),
    ));
    let listed = result(&request(
        &mut stdin,
        &mut reader,
        "13",
        "attendance.list",
        Some(&token),
        json!({ "studentId": student_id }),
    ));
    assert_eq!(listed["data"][0]["status"].as_str(), Some("absent"));
    assert!(listed["data"][0]["justification"].is_null());

    drop(stdin);
    let _ = child.wait();
}
