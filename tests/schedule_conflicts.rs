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
fn slot_conflicts_block_double_booking() {
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
            "username": "scheduler",
            "email": "scheduler@example.com",
            "password": "password123",
            "schoolName": "Schedule School"
        }),
    ));
    let token = registered["token"].as_str().expect("token").to_string();

    let teacher = result(&request(
        &mut stdin,
        &mut reader,
        "3",
        "users.create",
        Some(&token),
        json!({
            "username": "teacher1",
            "email": "teacher1@example.com",
            "password": "password123",
            "role": "teacher"
        }),
    ));
    let teacher_id = teacher["data"]["id"].as_str().expect("teacher id").to_string();

    let classroom_a = result(&request(
        &mut stdin,
        &mut reader,
        "4",
        "classrooms.create",
        Some(&token),
        json!({ "name": "1A", "year": 2024 }),
    ));
    let classroom_a = classroom_a["data"]["id"].as_str().expect("id").to_string();
    let classroom_b = result(&request(
        &mut stdin,
        &mut reader,
        "5",
        "classrooms.create",
        Some(&token),
        json!({ "name": "1B", "year": 2024 }),
    ));
    let classroom_b = classroom_b["data"]["id"].as_str().expect("id").to_string();

    let slot = result(&request(
        &mut stdin,
        &mut reader,
        "6",
        "timeSlots.create",
        Some(&token),
        json!({ "label": "07:30 - 08:20", "startTime": "07:30", "endTime": "08:20", "sortOrder": 1 }),
    ));
    let slot_id = slot["data"]["id"].as_str().expect("id").to_string();

    // Bad slot definitions never get far enough to conflict.
    let inverted = request(
        &mut stdin,
        &mut reader,
        "7",
        "timeSlots.create",
        Some(&token),
        json!({ "startTime": "09:00", "endTime": "08:00" }),
    );
    assert_eq!(inverted["ok"].as_bool(), Some(false));

    result(&request(
        &mut stdin,
        &mut reader,
        "8",
        "schedules.set",
        Some(&token),
        json!({
            "classroomId": classroom_a,
            "timeSlotId": slot_id,
            "dayOfWeek": 1,
            "subject": "Mathematics"
        }),
    ));

    // Another classroom in the same school can't take the same slot/day.
    let clash = request(
        &mut stdin,
        &mut reader,
        "9",
        "schedules.set",
        Some(&token),
        json!({
            "classroomId": classroom_b,
            "timeSlotId": slot_id,
            "dayOfWeek": 1,
            "subject": "History"
        }),
    );
    assert_eq!(clash["ok"].as_bool(), Some(false));
    assert_eq!(clash["error"]["code"].as_str(), Some("conflict"));
    assert_eq!(
        clash["error"]["message"].as_str(),
        Some("classroom slot already occupied")
    );

    // A blocked teacher slot rejects the assignment.
    result(&request(
        &mut stdin,
        &mut reader,
        "10",
        "availability.set",
        Some(&token),
        json!({ "teacherId": teacher_id, "timeSlotId": slot_id, "dayOfWeek": 2 }),
    ));
    let blocked = request(
        &mut stdin,
        &mut reader,
        "11",
        "schedules.set",
        Some(&token),
        json!({
            "classroomId": classroom_b,
            "timeSlotId": slot_id,
            "dayOfWeek": 2,
            "subject": "Geography",
            "teacherId": teacher_id
        }),
    );
    assert_eq!(blocked["ok"].as_bool(), Some(false));
    assert_eq!(
        blocked["error"]["message"].as_str(),
        Some("teacher unavailable in this slot")
    );

    // Free day, free teacher: the entry lands and upserts in place.
    let placed = result(&request(
        &mut stdin,
        &mut reader,
        "12",
        "schedules.set",
        Some(&token),
        json!({
            "classroomId": classroom_b,
            "timeSlotId": slot_id,
            "dayOfWeek": 3,
            "subject": "Geography",
            "teacherId": teacher_id
        }),
    ));
    assert_eq!(placed["data"]["subject"].as_str(), Some("Geography"));

    let renamed = result(&request(
        &mut stdin,
        &mut reader,
        "13",
        "schedules.set",
        Some(&token),
        json!({
            "classroomId": classroom_b,
            "timeSlotId": slot_id,
            "dayOfWeek": 3,
            "subject": "Earth Science",
            "teacherId": teacher_id
        }),
    ));
    assert_eq!(renamed["data"]["subject"].as_str(), Some("Earth Science"));
    let listed = result(&request(
        &mut stdin,
        &mut reader,
        "14",
        "schedules.list",
        Some(&token),
        json!({ "classroomId": classroom_b }),
    ));
    assert_eq!(listed["pagination"]["total"].as_i64(), Some(1));

    drop(stdin);
    let _ = child.wait();
}
