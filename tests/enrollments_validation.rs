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
fn enrollment_date_invariants() {
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
            "username": "enroller",
            "email": "enroller@example.com",
            "password": "password123",
            "schoolName": "Enrollment School"
        }),
    ));
    let token = registered["token"].as_str().expect("token").to_string();

    let classroom = result(&request(
        &mut stdin,
        &mut reader,
        "3",
        "classrooms.create",
        Some(&token),
        json!({ "name": "1A", "year": 2024 }),
    ));
    let classroom_id = classroom["data"]["id"].as_str().expect("id").to_string();
    let student = result(&request(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        Some(&token),
        json!({ "firstName": "Ana", "lastName": "Silva", "autoCreateUser": false }),
    ));
    let student_id = student["data"]["id"].as_str().expect("id").to_string();

    // Nonsense calendar dates are rejected with the offending field named.
    let bad_date = request(
        &mut stdin,
        &mut reader,
        "5",
        "enrollments.create",
        Some(&token),
        json!({
            "studentId": student_id,
            "classroomId": classroom_id,
            "startDate": "2024-13-40"
        }),
    );
    assert_eq!(bad_date["ok"].as_bool(), Some(false));
    assert_eq!(
        bad_date["error"]["details"]["field"].as_str(),
        Some("startDate")
    );

    let inverted = request(
        &mut stdin,
        &mut reader,
        "6",
        "enrollments.create",
        Some(&token),
        json!({
            "studentId": student_id,
            "classroomId": classroom_id,
            "startDate": "2024-03-01",
            "endDate": "2024-02-01"
        }),
    );
    assert_eq!(inverted["ok"].as_bool(), Some(false));

    let incomplete = request(
        &mut stdin,
        &mut reader,
        "7",
        "enrollments.create",
        Some(&token),
        json!({
            "studentId": student_id,
            "classroomId": classroom_id,
            "startDate": "2024-03-01",
            "status": "completed"
        }),
    );
    assert_eq!(incomplete["ok"].as_bool(), Some(false));

    let created = result(&request(
        &mut stdin,
        &mut reader,
        "8",
        "enrollments.create",
        Some(&token),
        json!({
            "studentId": student_id,
            "classroomId": classroom_id,
            "startDate": "2024-03-01"
        }),
    ));
    let enrollment_id = created["data"]["id"].as_str().expect("id").to_string();

    // The same invariants hold on update.
    let bad_update = request(
        &mut stdin,
        &mut reader,
        "9",
        "enrollments.update",
        Some(&token),
        json!({ "enrollmentId": enrollment_id, "status": "completed" }),
    );
    assert_eq!(bad_update["ok"].as_bool(), Some(false));

    let completed = result(&request(
        &mut stdin,
        &mut reader,
        "10",
        "enrollments.update",
        Some(&token),
        json!({
            "enrollmentId": enrollment_id,
            "status": "completed",
            "endDate": "2024-12-15"
        }),
    ));
    assert_eq!(completed["data"]["status"].as_str(), Some("completed"));

    drop(stdin);
    let _ = child.wait();
}
