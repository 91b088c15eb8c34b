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
fn invoice_roles_cashflow_and_reconcile() {
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
            "username": "bursar",
            "email": "bursar@example.com",
            "password": "password123",
            "schoolName": "Finance School"
        }),
    ));
    let admin_token = registered["token"].as_str().expect("token").to_string();

    let student = result(&request(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        Some(&admin_token),
        json!({ "firstName": "Carlos", "lastName": "Lima", "autoCreateUser": false }),
    ));
    let student_id = student["data"]["id"].as_str().expect("id").to_string();

    // A plain staff account may not issue invoices; a finance account may.
    for (id, username, role) in [
        ("4", "clerk", "staff"),
        ("5", "treasurer", "finance"),
    ] {
        result(&request(
            &mut stdin,
            &mut reader,
            id,
            "users.create",
            Some(&admin_token),
            json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "password123",
                "role": role
            }),
        ));
    }
    let staff_login = result(&request(
        &mut stdin,
        &mut reader,
        "6",
        "auth.login",
        None,
        json!({ "usernameOrEmail": "clerk", "password": "password123" }),
    ));
    let staff_token = staff_login["token"].as_str().expect("token").to_string();
    let finance_login = result(&request(
        &mut stdin,
        &mut reader,
        "7",
        "auth.login",
        None,
        json!({ "usernameOrEmail": "treasurer", "password": "password123" }),
    ));
    let finance_token = finance_login["token"].as_str().expect("token").to_string();

    let denied = request(
        &mut stdin,
        &mut reader,
        "8",
        "invoices.create",
        Some(&staff_token),
        json!({ "studentId": student_id, "amount": "150.00", "dueDate": "2024-02-05" }),
    );
    assert_eq!(denied["ok"].as_bool(), Some(false));
    assert_eq!(denied["error"]["code"].as_str(), Some("forbidden"));

    let invoice = result(&request(
        &mut stdin,
        &mut reader,
        "9",
        "invoices.create",
        Some(&finance_token),
        json!({
            "studentId": student_id,
            "amount": "120.00",
            "dueDate": "2024-02-05",
            "status": "paid",
            "paidAt": "2024-02-07T10:00:00"
        }),
    ));
    let invoice_id = invoice["data"]["id"].as_str().expect("id").to_string();

    // Paid without a timestamp is rejected.
    let unpaid = request(
        &mut stdin,
        &mut reader,
        "10",
        "invoices.create",
        Some(&finance_token),
        json!({
            "studentId": student_id,
            "amount": "99.00",
            "dueDate": "2024-03-05",
            "status": "paid"
        }),
    );
    assert_eq!(unpaid["ok"].as_bool(), Some(false));

    result(&request(
        &mut stdin,
        &mut reader,
        "11",
        "transactions.create",
        Some(&finance_token),
        json!({
            "description": "Utility bill",
            "amount": "40.00",
            "date": "2024-01-06",
            "type": "expense",
            "status": "paid"
        }),
    ));
    result(&request(
        &mut stdin,
        &mut reader,
        "12",
        "transactions.create",
        Some(&finance_token),
        json!({
            "description": "Enrollment fee",
            "amount": "100.00",
            "date": "2024-01-05",
            "type": "income",
            "status": "paid"
        }),
    ));

    let cashflow = result(&request(
        &mut stdin,
        &mut reader,
        "13",
        "cashflow.summary",
        Some(&finance_token),
        json!({ "dateFrom": "2024-01-01", "dateTo": "2024-01-31" }),
    ));
    assert_eq!(cashflow["summary"]["income"].as_str(), Some("100.00"));
    assert_eq!(cashflow["summary"]["expense"].as_str(), Some("40.00"));
    assert_eq!(cashflow["summary"]["net"].as_str(), Some("60.00"));

    // Reconciliation books the paid invoice exactly once.
    let reconciled = result(&request(
        &mut stdin,
        &mut reader,
        "14",
        "invoices.reconcile",
        Some(&finance_token),
        json!({ "invoiceIds": [invoice_id] }),
    ));
    assert_eq!(reconciled["created"].as_i64(), Some(1));

    let again = result(&request(
        &mut stdin,
        &mut reader,
        "15",
        "invoices.reconcile",
        Some(&finance_token),
        json!({}),
    ));
    assert_eq!(again["created"].as_i64(), Some(0));

    let transactions = result(&request(
        &mut stdin,
        &mut reader,
        "16",
        "transactions.list",
        Some(&finance_token),
        json!({ "category": "Tuition" }),
    ));
    assert_eq!(transactions["pagination"]["total"].as_i64(), Some(1));
    assert_eq!(
        transactions["data"][0]["date"].as_str(),
        Some("2024-02-07")
    );

    drop(stdin);
    let _ = child.wait();
}
