use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_daemon_debug() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_nexusd");
    let mut child = Command::new(exe)
        .env("NEXUSD_DEBUG", "1")
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

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value["error"]["code"].as_str().unwrap_or("")
}

#[test]
fn token_lifecycle_and_password_reset() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let (mut child, mut stdin, mut reader) = spawn_daemon_debug();

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
            "username": "head",
            "email": "head@example.com",
            "password": "password123",
            "schoolName": "Token School"
        }),
    ));
    let token = registered["token"].as_str().expect("token").to_string();

    // Duplicate identity is a conflict, not a second account.
    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "auth.register",
        None,
        json!({ "username": "head", "email": "other@example.com", "password": "password123" }),
    );
    assert_eq!(error_code(&dup), "conflict");

    // Email works as a login identifier.
    let login = result(&request(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        None,
        json!({ "usernameOrEmail": "head@example.com", "password": "password123" }),
    ));
    assert!(login["token"].as_str().is_some());

    let wrong = request(
        &mut stdin,
        &mut reader,
        "5",
        "auth.login",
        None,
        json!({ "usernameOrEmail": "head", "password": "wrong-password" }),
    );
    assert_eq!(error_code(&wrong), "unauthorized");

    // Refresh rotates the key and invalidates the old one.
    let refreshed = result(&request(
        &mut stdin,
        &mut reader,
        "6",
        "auth.refresh",
        Some(&token),
        json!({}),
    ));
    let new_token = refreshed["token"].as_str().expect("new token").to_string();
    assert_ne!(new_token, token);

    let stale = request(
        &mut stdin,
        &mut reader,
        "7",
        "me.get",
        Some(&token),
        json!({}),
    );
    assert_eq!(error_code(&stale), "unauthorized");

    let me = result(&request(
        &mut stdin,
        &mut reader,
        "8",
        "me.get",
        Some(&new_token),
        json!({}),
    ));
    assert_eq!(me["username"].as_str(), Some("head"));

    // Reset flow: the debug build echoes the reset token back.
    let reset = result(&request(
        &mut stdin,
        &mut reader,
        "9",
        "auth.requestPasswordReset",
        None,
        json!({ "email": "head@example.com" }),
    ));
    let reset_token = reset["token"].as_str().expect("reset token").to_string();

    let too_short = request(
        &mut stdin,
        &mut reader,
        "10",
        "auth.confirmPasswordReset",
        None,
        json!({ "email": "head@example.com", "token": reset_token, "newPassword": "short" }),
    );
    assert_eq!(error_code(&too_short), "bad_params");

    result(&request(
        &mut stdin,
        &mut reader,
        "11",
        "auth.confirmPasswordReset",
        None,
        json!({
            "email": "head@example.com",
            "token": reset_token,
            "newPassword": "newpassword456"
        }),
    ));

    // The reset token is single use.
    let replay = request(
        &mut stdin,
        &mut reader,
        "12",
        "auth.confirmPasswordReset",
        None,
        json!({
            "email": "head@example.com",
            "token": reset_token,
            "newPassword": "anotherpass789"
        }),
    );
    assert_eq!(error_code(&replay), "bad_params");

    let relogin = result(&request(
        &mut stdin,
        &mut reader,
        "13",
        "auth.login",
        None,
        json!({ "usernameOrEmail": "head", "password": "newpassword456" }),
    ));
    let admin_token = relogin["token"].as_str().expect("token").to_string();

    // Self revoke kills the token.
    result(&request(
        &mut stdin,
        &mut reader,
        "14",
        "auth.revoke",
        Some(&new_token),
        json!({}),
    ));
    let gone = request(
        &mut stdin,
        &mut reader,
        "15",
        "me.get",
        Some(&new_token),
        json!({}),
    );
    assert_eq!(error_code(&gone), "unauthorized");

    // Revoking an arbitrary key needs the admin gate and a real key.
    let missing = request(
        &mut stdin,
        &mut reader,
        "16",
        "auth.revoke",
        Some(&admin_token),
        json!({ "tokenKey": "does-not-exist" }),
    );
    assert_eq!(error_code(&missing), "not_found");

    drop(stdin);
    let _ = child.wait();
}
