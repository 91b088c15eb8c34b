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
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(token) = token {
        payload["token"] = json!(token);
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn expect_ok(value: &serde_json::Value, method: &str) -> serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let upload_src = workspace.path().join("handbook.txt");
    std::fs::write(&upload_src, b"smoke upload contents").expect("write upload source");
    let bundle_out = workspace.path().join("smoke-backup.nexusbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request(&mut stdin, &mut reader, "1", "health", None, json!({}));
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "2",
            "workspace.select",
            None,
            json!({ "path": workspace.path().to_string_lossy() }),
        ),
        "workspace.select",
    );

    let registered = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "3",
            "auth.register",
            None,
            json!({
                "username": "principal",
                "email": "principal@example.com",
                "password": "password123",
                "schoolName": "Central School"
            }),
        ),
        "auth.register",
    );
    let token = registered["token"].as_str().expect("token").to_string();
    let token = token.as_str();

    let me = expect_ok(
        &request(&mut stdin, &mut reader, "4", "me.get", Some(token), json!({})),
        "me.get",
    );
    assert_eq!(me["role"].as_str(), Some("admin"));
    assert!(me["school"]["id"].is_string());

    let classroom = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "5",
            "classrooms.create",
            Some(token),
            json!({ "name": "1A", "year": 2026, "shift": "morning" }),
        ),
        "classrooms.create",
    );
    let classroom_id = classroom["data"]["id"].as_str().expect("classroom id").to_string();

    let student = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "6",
            "students.create",
            Some(token),
            json!({
                "firstName": "Ana",
                "lastName": "Silva",
                "autoCreateUser": false
            }),
        ),
        "students.create",
    );
    let student_id = student["data"]["id"].as_str().expect("student id").to_string();

    let guardian = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "7",
            "guardians.create",
            Some(token),
            json!({ "name": "Marta Silva", "relation": "mother" }),
        ),
        "guardians.create",
    );
    let guardian_id = guardian["data"]["id"].as_str().expect("guardian id").to_string();
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "8",
            "studentGuardians.set",
            Some(token),
            json!({ "studentId": student_id, "guardianId": guardian_id, "isPrimary": true }),
        ),
        "studentGuardians.set",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "8b",
            "students.parents.set",
            Some(token),
            json!({ "studentId": student_id, "guardianId": guardian_id }),
        ),
        "students.parents.set",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "8c",
            "students.contacts.add",
            Some(token),
            json!({ "studentId": student_id, "name": "Uncle Bob", "phone": "555-1234" }),
        ),
        "students.contacts.add",
    );

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "9",
            "enrollments.create",
            Some(token),
            json!({
                "studentId": student_id,
                "classroomId": classroom_id,
                "startDate": "2026-02-01"
            }),
        ),
        "enrollments.create",
    );

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "10",
            "invoices.create",
            Some(token),
            json!({
                "studentId": student_id,
                "amount": "350.00",
                "dueDate": "2026-03-05"
            }),
        ),
        "invoices.create",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "11",
            "cashflow.summary",
            Some(token),
            json!({}),
        ),
        "cashflow.summary",
    );

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "12",
            "gradingConfig.get",
            Some(token),
            json!({}),
        ),
        "gradingConfig.get",
    );
    let grade = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "13",
            "grades.upsert",
            Some(token),
            json!({
                "studentId": student_id,
                "classroomId": classroom_id,
                "subject": "Mathematics",
                "grade1": 7,
                "grade2": 9,
                "date": "2026-03-10"
            }),
        ),
        "grades.upsert",
    );
    assert_eq!(grade["data"]["average"].as_f64(), Some(8.0));

    let attendance = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "14",
            "attendance.upsert",
            Some(token),
            json!({
                "studentId": student_id,
                "classroomId": classroom_id,
                "date": "2026-03-10",
                "status": "absent",
                "subject": "Mathematics"
            }),
        ),
        "attendance.upsert",
    );
    let attendance_id = attendance["data"]["id"].as_str().expect("attendance id").to_string();
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "15",
            "justifications.upsert",
            Some(token),
            json!({ "attendanceId": attendance_id, "reason": "medical appointment" }),
        ),
        "justifications.upsert",
    );

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "16",
            "diary.create",
            Some(token),
            json!({
                "classroomId": classroom_id,
                "subject": "Mathematics",
                "date": "2026-03-10",
                "topic": "Fractions"
            }),
        ),
        "diary.create",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "17",
            "materials.create",
            Some(token),
            json!({
                "classroomId": classroom_id,
                "title": "Fractions worksheet",
                "date": "2026-03-10"
            }),
        ),
        "materials.create",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "18",
            "syllabi.create",
            Some(token),
            json!({ "subject": "Mathematics", "objectives": ["master fractions"] }),
        ),
        "syllabi.create",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "19",
            "academicTargets.create",
            Some(token),
            json!({
                "month": "March 2026",
                "requiredClasses": 20,
                "gradeSubmissionDeadline": "2026-03-25",
                "examSubmissionDeadline": "2026-03-20"
            }),
        ),
        "academicTargets.create",
    );

    let exam = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "20",
            "examSubmissions.create",
            Some(token),
            json!({ "title": "Midterm", "subject": "Mathematics" }),
        ),
        "examSubmissions.create",
    );
    let exam_id = exam["data"]["id"].as_str().expect("exam id").to_string();

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "21",
            "uploads.create",
            Some(token),
            json!({
                "entityType": "exam",
                "entityId": exam_id,
                "sourcePath": upload_src.to_string_lossy()
            }),
        ),
        "uploads.create",
    );

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "22",
            "inventory.create",
            Some(token),
            json!({ "name": "Whiteboard markers", "category": "Stationery", "quantity": 12 }),
        ),
        "inventory.create",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "23",
            "notices.create",
            Some(token),
            json!({ "title": "Welcome back", "content": "Classes resume on Monday." }),
        ),
        "notices.create",
    );

    let conversation = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "24",
            "conversations.open",
            Some(token),
            json!({ "studentId": student_id }),
        ),
        "conversations.open",
    );
    let conversation_id = conversation["data"]["id"].as_str().expect("conversation id").to_string();
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "25",
            "conversations.messages.send",
            Some(token),
            json!({ "conversationId": conversation_id, "text": "Report cards are ready." }),
        ),
        "conversations.messages.send",
    );

    let slot = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "26",
            "timeSlots.create",
            Some(token),
            json!({ "label": "07:30 - 08:20", "startTime": "07:30", "endTime": "08:20", "sortOrder": 1 }),
        ),
        "timeSlots.create",
    );
    let slot_id = slot["data"]["id"].as_str().expect("slot id").to_string();
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "27",
            "schedules.set",
            Some(token),
            json!({
                "classroomId": classroom_id,
                "timeSlotId": slot_id,
                "dayOfWeek": 1,
                "subject": "Mathematics"
            }),
        ),
        "schedules.set",
    );

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "28",
            "dashboard.admin",
            Some(token),
            json!({}),
        ),
        "dashboard.admin",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "29",
            "dashboard.student",
            Some(token),
            json!({ "studentId": student_id }),
        ),
        "dashboard.student",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "30",
            "teacherActivities.list",
            Some(token),
            json!({}),
        ),
        "teacherActivities.list",
    );
    let audit = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "31",
            "auditLogs.list",
            Some(token),
            json!({}),
        ),
        "auditLogs.list",
    );
    assert!(audit["pagination"]["total"].as_i64().unwrap_or(0) > 0);

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "32",
            "backup.exportBundle",
            Some(token),
            json!({ "outPath": bundle_out.to_string_lossy() }),
        ),
        "backup.exportBundle",
    );

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "33",
            "classrooms.delete",
            Some(token),
            json!({ "classroomId": classroom_id }),
        ),
        "classrooms.delete",
    );

    drop(stdin);
    let _ = child.wait();
}
