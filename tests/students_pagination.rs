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
fn student_lists_paginate_and_clamp() {
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
            "username": "registrar",
            "email": "registrar@example.com",
            "password": "password123",
            "schoolName": "Pagination School"
        }),
    ));
    let token = registered["token"].as_str().expect("token").to_string();

    for idx in 0..30 {
        result(&request(
            &mut stdin,
            &mut reader,
            &format!("s{}", idx),
            "students.create",
            Some(&token),
            json!({
                "firstName": format!("Student{:02}", idx),
                "lastName": "Test",
                "autoCreateUser": false
            }),
        ));
    }

    let page2 = result(&request(
        &mut stdin,
        &mut reader,
        "3",
        "students.list",
        Some(&token),
        json!({ "page": 2, "pageSize": 10 }),
    ));
    assert_eq!(page2["data"].as_array().map(|a| a.len()), Some(10));
    assert_eq!(page2["pagination"]["page"].as_i64(), Some(2));
    assert_eq!(page2["pagination"]["total"].as_i64(), Some(30));
    assert_eq!(page2["pagination"]["totalPages"].as_i64(), Some(3));

    // An out-of-range page lands on the last page instead of erroring.
    let clamped = result(&request(
        &mut stdin,
        &mut reader,
        "4",
        "students.list",
        Some(&token),
        json!({ "page": 99, "pageSize": 10 }),
    ));
    assert_eq!(clamped["pagination"]["page"].as_i64(), Some(3));
    assert_eq!(clamped["data"].as_array().map(|a| a.len()), Some(10));

    let filtered = result(&request(
        &mut stdin,
        &mut reader,
        "5",
        "students.list",
        Some(&token),
        json!({ "name": "Student07" }),
    ));
    assert_eq!(filtered["pagination"]["total"].as_i64(), Some(1));
    assert_eq!(
        filtered["data"][0]["firstName"].as_str(),
        Some("Student07")
    );

    drop(stdin);
    let _ = child.wait();
}
