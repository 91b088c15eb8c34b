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
fn term_defaults_and_recovery_rules_follow_config() {
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
            "username": "assessor",
            "email": "assessor@example.com",
            "password": "password123",
            "schoolName": "Grading School"
        }),
    ));
    let token = registered["token"].as_str().expect("token").to_string();

    let classroom = result(&request(
        &mut stdin,
        &mut reader,
        "3",
        "classrooms.create",
        Some(&token),
        json!({ "name": "2A", "year": 2024 }),
    ));
    let classroom_id = classroom["data"]["id"].as_str().expect("id").to_string();
    let student = result(&request(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        Some(&token),
        json!({ "firstName": "Ana", "lastName": "Costa", "autoCreateUser": false }),
    ));
    let student_id = student["data"]["id"].as_str().expect("id").to_string();

    result(&request(
        &mut stdin,
        &mut reader,
        "5",
        "gradingConfig.update",
        Some(&token),
        json!({ "system": "trimestral", "calculationMethod": "arithmetic", "recoveryRule": "max" }),
    ));

    // May is the second trimester; max(avg 5, recovery 8) = 8.
    let grade = result(&request(
        &mut stdin,
        &mut reader,
        "6",
        "grades.upsert",
        Some(&token),
        json!({
            "studentId": student_id,
            "classroomId": classroom_id,
            "subject": "Mathematics",
            "grade1": 6,
            "grade2": 4,
            "recoveryGrade": 8,
            "date": "2024-05-10"
        }),
    ));
    assert_eq!(grade["data"]["term"].as_str(), Some("2"));
    assert_eq!(grade["data"]["average"].as_f64(), Some(5.0));
    assert_eq!(grade["data"]["finalGrade"].as_f64(), Some(8.0));

    // Weighted 70/30 with replace: average shifts, recovery wins outright.
    result(&request(
        &mut stdin,
        &mut reader,
        "7",
        "gradingConfig.update",
        Some(&token),
        json!({
            "calculationMethod": "weighted",
            "weights": { "exam": 70, "activities": 30 },
            "recoveryRule": "replace"
        }),
    ));
    let weighted = result(&request(
        &mut stdin,
        &mut reader,
        "8",
        "grades.upsert",
        Some(&token),
        json!({
            "studentId": student_id,
            "classroomId": classroom_id,
            "subject": "History",
            "grade1": 8,
            "grade2": 4,
            "date": "2024-05-12"
        }),
    ));
    let avg = weighted["data"]["average"].as_f64().expect("average");
    assert!((avg - 6.8).abs() < 1e-9, "weighted average was {}", avg);
    assert_eq!(weighted["data"]["finalGrade"].as_f64(), Some(avg));

    let replaced = result(&request(
        &mut stdin,
        &mut reader,
        "9",
        "grades.update",
        Some(&token),
        json!({
            "gradeId": weighted["data"]["id"],
            "recoveryGrade": 5
        }),
    ));
    assert_eq!(replaced["data"]["finalGrade"].as_f64(), Some(5.0));

    // Same upsert key overwrites in place instead of duplicating.
    let rewritten = result(&request(
        &mut stdin,
        &mut reader,
        "10",
        "grades.upsert",
        Some(&token),
        json!({
            "studentId": student_id,
            "classroomId": classroom_id,
            "subject": "Mathematics",
            "grade1": 9,
            "grade2": 9,
            "term": "2",
            "date": "2024-05-20"
        }),
    ));
    assert_eq!(rewritten["data"]["average"].as_f64(), Some(9.0));
    let listed = result(&request(
        &mut stdin,
        &mut reader,
        "11",
        "grades.list",
        Some(&token),
        json!({ "subject": "Mathematics" }),
    ));
    assert_eq!(listed["pagination"]["total"].as_i64(), Some(1));

    // Out-of-range grades are rejected.
    let out_of_range = request(
        &mut stdin,
        &mut reader,
        "12",
        "grades.upsert",
        Some(&token),
        json!({
            "studentId": student_id,
            "classroomId": classroom_id,
            "subject": "Science",
            "grade1": 11
        }),
    );
    assert_eq!(out_of_range["ok"].as_bool(), Some(false));
    assert_eq!(
        out_of_range["error"]["details"]["field"].as_str(),
        Some("grade1")
    );

    drop(stdin);
    let _ = child.wait();
}
