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
fn staff_accounts_generate_credentials_and_labels() {
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
            "username": "director",
            "email": "director@example.com",
            "password": "password123",
            "schoolName": "Staffing School"
        }),
    ));
    let token = registered["token"].as_str().expect("token").to_string();

    // The username comes from the email local part; the password is
    // generated and returned once.
    let maria = result(&request(
        &mut stdin,
        &mut reader,
        "3",
        "staff.create",
        Some(&token),
        json!({ "name": "Maria Souza", "email": "maria@example.com", "role": "teacher" }),
    ));
    assert_eq!(maria["data"]["name"].as_str(), Some("Maria Souza"));
    assert_eq!(maria["data"]["role"].as_str(), Some("Teacher"));
    let creds = &maria["userCredentials"];
    assert_eq!(creds["username"].as_str(), Some("maria"));
    assert!(creds["password"].as_str().map(|p| p.len()).unwrap_or(0) >= 8);
    let maria_id = creds["userId"].as_str().expect("user id").to_string();

    // A second Maria collides and gets a numeric suffix.
    let maria2 = result(&request(
        &mut stdin,
        &mut reader,
        "4",
        "staff.create",
        Some(&token),
        json!({ "name": "Maria Alves", "email": "maria@elsewhere.com", "role": "teacher" }),
    ));
    assert_eq!(maria2["userCredentials"]["username"].as_str(), Some("maria-2"));
    let maria2_id = maria2["userCredentials"]["userId"]
        .as_str()
        .expect("user id")
        .to_string();

    // A supplied password is honored and usable right away.
    let carlos = result(&request(
        &mut stdin,
        &mut reader,
        "5",
        "staff.create",
        Some(&token),
        json!({
            "name": "Carlos Dias",
            "email": "carlos@example.com",
            "role": "staff",
            "password": "chosenpass99"
        }),
    ));
    assert_eq!(carlos["userCredentials"]["password"].as_str(), Some("chosenpass99"));
    result(&request(
        &mut stdin,
        &mut reader,
        "6",
        "auth.login",
        None,
        json!({ "usernameOrEmail": "carlos", "password": "chosenpass99" }),
    ));

    let teachers = result(&request(
        &mut stdin,
        &mut reader,
        "7",
        "users.list",
        Some(&token),
        json!({ "role": "teacher" }),
    ));
    assert_eq!(teachers["pagination"]["total"].as_i64(), Some(2));

    let updated = result(&request(
        &mut stdin,
        &mut reader,
        "8",
        "staff.update",
        Some(&token),
        json!({ "staffId": maria_id, "department": "Mathematics" }),
    ));
    assert_eq!(updated["data"]["department"].as_str(), Some("Mathematics"));

    // The account behind the session can't delete itself.
    let self_delete = request(
        &mut stdin,
        &mut reader,
        "9",
        "users.delete",
        Some(&token),
        json!({ "userId": registered["user"]["id"] }),
    );
    assert_eq!(self_delete["ok"].as_bool(), Some(false));

    result(&request(
        &mut stdin,
        &mut reader,
        "10",
        "staff.delete",
        Some(&token),
        json!({ "staffId": maria2_id }),
    ));
    let staff = result(&request(
        &mut stdin,
        &mut reader,
        "11",
        "staff.list",
        Some(&token),
        json!({}),
    ));
    assert_eq!(staff["pagination"]["total"].as_i64(), Some(3));

    drop(stdin);
    let _ = child.wait();
}
