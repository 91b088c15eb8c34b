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
fn bundle_roundtrip_restores_database_and_uploads() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let out_dir = tempfile::tempdir().expect("temp out dir");
    let bundle_path = out_dir.path().join("school.nexusbackup.zip");
    let source = out_dir.path().join("letter.txt");
    std::fs::write(&source, b"attachment payload").expect("write source file");

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
            "username": "operator",
            "email": "operator@example.com",
            "password": "password123",
            "schoolName": "Backup School"
        }),
    ));
    let token = registered["token"].as_str().expect("token").to_string();

    let classroom = result(&request(
        &mut stdin,
        &mut reader,
        "3",
        "classrooms.create",
        Some(&token),
        json!({ "name": "4D", "year": 2025 }),
    ));
    let classroom_id = classroom["data"]["id"].as_str().expect("id").to_string();
    let upload = result(&request(
        &mut stdin,
        &mut reader,
        "4",
        "uploads.create",
        Some(&token),
        json!({
            "entityType": "message",
            "entityId": "welcome-letter",
            "sourcePath": source.to_string_lossy()
        }),
    ));
    let stored_path = upload["data"]["storedPath"].as_str().expect("path").to_string();

    let exported = result(&request(
        &mut stdin,
        &mut reader,
        "5",
        "backup.exportBundle",
        Some(&token),
        json!({ "outPath": bundle_path.to_string_lossy() }),
    ));
    assert_eq!(
        exported["bundleFormat"].as_str(),
        Some("nexus-workspace-v1")
    );
    assert!(exported["entryCount"].as_i64().unwrap_or(0) >= 3);
    assert!(bundle_path.is_file());

    // Lose the classroom and the stored file, then restore from the bundle.
    result(&request(
        &mut stdin,
        &mut reader,
        "6",
        "classrooms.delete",
        Some(&token),
        json!({ "classroomId": classroom_id }),
    ));
    std::fs::remove_file(workspace.path().join(&stored_path)).expect("remove upload");

    let imported = result(&request(
        &mut stdin,
        &mut reader,
        "7",
        "backup.importBundle",
        Some(&token),
        json!({ "inPath": bundle_path.to_string_lossy() }),
    ));
    assert_eq!(
        imported["bundleFormatDetected"].as_str(),
        Some("nexus-workspace-v1")
    );
    assert_eq!(imported["uploadsRestored"].as_i64(), Some(1));

    let classrooms = result(&request(
        &mut stdin,
        &mut reader,
        "8",
        "classrooms.list",
        Some(&token),
        json!({}),
    ));
    assert_eq!(classrooms["pagination"]["total"].as_i64(), Some(1));
    assert_eq!(classrooms["data"][0]["name"].as_str(), Some("4D"));
    assert!(workspace.path().join(&stored_path).is_file());

    drop(stdin);
    let _ = child.wait();
}
