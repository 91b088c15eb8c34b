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
fn uploads_store_files_and_mutations_audit() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let source = workspace.path().join("syllabus.pdf");
    std::fs::write(&source, b"%PDF- dummy bytes").expect("write source file");

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
            "username": "archivist",
            "email": "archivist@example.com",
            "password": "password123",
            "schoolName": "Upload School"
        }),
    ));
    let token = registered["token"].as_str().expect("token").to_string();

    result(&request(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        Some(&token),
        json!({ "firstName": "Paula", "lastName": "Lima", "autoCreateUser": false }),
    ));

    // Unknown entity kinds are rejected before touching the filesystem.
    let bad_kind = request(
        &mut stdin,
        &mut reader,
        "4",
        "uploads.create",
        Some(&token),
        json!({
            "entityType": "homework",
            "entityId": "123",
            "sourcePath": source.to_string_lossy()
        }),
    );
    assert_eq!(bad_kind["ok"].as_bool(), Some(false));

    let upload = result(&request(
        &mut stdin,
        &mut reader,
        "5",
        "uploads.create",
        Some(&token),
        json!({
            "entityType": "material",
            "entityId": "123",
            "sourcePath": source.to_string_lossy(),
            "contentType": "application/pdf"
        }),
    ));
    let upload_id = upload["data"]["id"].as_str().expect("id").to_string();
    let stored_path = upload["data"]["storedPath"].as_str().expect("storedPath");
    assert!(workspace.path().join(stored_path).is_file());
    assert!(upload["data"]["size"].as_i64().unwrap_or(0) > 0);

    let listed = result(&request(
        &mut stdin,
        &mut reader,
        "6",
        "uploads.list",
        Some(&token),
        json!({ "entityType": "material", "entityId": "123" }),
    ));
    assert_eq!(listed["pagination"]["total"].as_i64(), Some(1));

    // Every mutation leaves an audit trail the admin can filter.
    let audit = result(&request(
        &mut stdin,
        &mut reader,
        "7",
        "auditLogs.list",
        Some(&token),
        json!({ "action": "student_created" }),
    ));
    assert_eq!(audit["pagination"]["total"].as_i64(), Some(1));
    assert_eq!(audit["data"][0]["user"].as_str(), Some("archivist"));

    let stored_path = stored_path.to_string();
    result(&request(
        &mut stdin,
        &mut reader,
        "8",
        "uploads.delete",
        Some(&token),
        json!({ "uploadId": upload_id }),
    ));
    assert!(!workspace.path().join(&stored_path).exists());

    drop(stdin);
    let _ = child.wait();
}
