use crate::ipc::handlers::students::student_in_school;
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

const INVOICE_STATUSES: [&str; 4] = ["open", "paid", "overdue", "cancelled"];
const TRANSACTION_TYPES: [&str; 2] = ["income", "expense"];
const TRANSACTION_STATUSES: [&str; 2] = ["open", "paid"];

const FINANCE_ROLES: [&str; 3] = [roles::ADMIN, roles::DIRECTOR, roles::FINANCE];

fn fmt_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

fn invoice_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "amount": fmt_amount(r.get::<_, f64>(2)?),
        "dueDate": r.get::<_, String>(3)?,
        "referenceMonth": r.get::<_, Option<String>>(4)?,
        "status": r.get::<_, String>(5)?,
        "paidAt": r.get::<_, Option<String>>(6)?,
        "createdAt": r.get::<_, String>(7)?,
    }))
}

const INVOICE_COLS: &str =
    "i.id, i.student_id, i.amount, i.due_date, i.reference_month, i.status, i.paid_at, i.created_at";

fn load_invoice(
    conn: &Connection,
    school_id: &str,
    invoice_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM invoices i
         JOIN students s ON s.id = i.student_id
         WHERE i.id = ? AND s.school_id = ?",
        INVOICE_COLS
    );
    conn.query_row(&sql, (invoice_id, school_id), invoice_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("invoice not found"))
}

fn invoices_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE s.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(status) = helpers::optional_str(&req.params, "status") {
        where_sql.push_str(" AND i.status = ?");
        binds.push(SqlValue::Text(status));
    }
    if let Some(student_id) = helpers::optional_str(&req.params, "studentId") {
        where_sql.push_str(" AND i.student_id = ?");
        binds.push(SqlValue::Text(student_id));
    }
    if let Some(from) = helpers::optional_str(&req.params, "dueDateFrom") {
        where_sql.push_str(" AND i.due_date >= ?");
        binds.push(SqlValue::Text(from));
    }
    if let Some(to) = helpers::optional_str(&req.params, "dueDateTo") {
        where_sql.push_str(" AND i.due_date <= ?");
        binds.push(SqlValue::Text(to));
    }

    let from_clause = "FROM invoices i JOIN students s ON s.id = i.student_id";
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", from_clause, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY i.due_date DESC",
            INVOICE_COLS, from_clause, where_sql
        ),
        &binds,
        invoice_row,
    )
}

fn invoices_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let student_id = helpers::required_str(&req.params, "studentId")?;
    let status = helpers::optional_str(&req.params, "status").unwrap_or_else(|| "open".into());
    helpers::validate_choice(&status, &INVOICE_STATUSES, "status")?;
    let amount = helpers::required_amount(&req.params, "amount")?;
    let due_date = helpers::required_date_param(&req.params, "dueDate")?;
    let reference_month = helpers::optional_date_param(&req.params, "referenceMonth")?;
    let paid_at = helpers::optional_datetime_param(&req.params, "paidAt")?;
    if status == "paid" && paid_at.is_none() {
        return Err(HandlerErr::bad_params("paidAt required when status is paid"));
    }
    helpers::require_roles(&ctx, &FINANCE_ROLES)?;

    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    let invoice_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO invoices(id, student_id, amount, due_date, reference_month, status, paid_at, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &invoice_id,
            &student_id,
            amount,
            &due_date,
            reference_month.as_deref(),
            &status,
            paid_at.as_deref(),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "invoices"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "invoice_created", &invoice_id);
    let invoice = load_invoice(conn, &school_id, &invoice_id)?;
    Ok(json!({ "data": invoice }))
}

fn invoices_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let invoice_id = helpers::required_str(&req.params, "invoiceId")?;
    let invoice = load_invoice(conn, &school_id, &invoice_id)?;
    Ok(json!({ "data": invoice }))
}

fn invoices_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let invoice_id = helpers::required_str(&req.params, "invoiceId")?;
    let existing = load_invoice(conn, &school_id, &invoice_id)?;
    helpers::require_roles(&ctx, &FINANCE_ROLES)?;

    // A status change to paid still needs a payment timestamp; check before
    // anything is written.
    let status = helpers::optional_str(&req.params, "status");
    if let Some(status) = status.as_deref() {
        helpers::validate_choice(status, &INVOICE_STATUSES, "status")?;
        if status == "paid" {
            let effective_paid_at = if req.params.get("paidAt").is_some() {
                helpers::optional_datetime_param(&req.params, "paidAt")?
            } else {
                existing
                    .get("paidAt")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            };
            if effective_paid_at.is_none() {
                return Err(HandlerErr::bad_params("paidAt required when status is paid"));
            }
        }
    }

    if let Some(status) = status.as_deref() {
        conn.execute(
            "UPDATE invoices SET status = ? WHERE id = ?",
            (status, &invoice_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "invoices"))?;
    }
    if req.params.get("amount").is_some() {
        let amount = helpers::required_amount(&req.params, "amount")?;
        conn.execute(
            "UPDATE invoices SET amount = ? WHERE id = ?",
            (amount, &invoice_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "invoices"))?;
    }
    if req.params.get("dueDate").is_some() {
        let due_date = helpers::required_date_param(&req.params, "dueDate")?;
        conn.execute(
            "UPDATE invoices SET due_date = ? WHERE id = ?",
            (&due_date, &invoice_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "invoices"))?;
    }
    if req.params.get("referenceMonth").is_some() {
        let reference_month = helpers::optional_date_param(&req.params, "referenceMonth")?;
        conn.execute(
            "UPDATE invoices SET reference_month = ? WHERE id = ?",
            (reference_month.as_deref(), &invoice_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "invoices"))?;
    }
    if req.params.get("paidAt").is_some() {
        let paid_at = helpers::optional_datetime_param(&req.params, "paidAt")?;
        conn.execute(
            "UPDATE invoices SET paid_at = ? WHERE id = ?",
            (paid_at.as_deref(), &invoice_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "invoices"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "invoice_updated", &invoice_id);
    let invoice = load_invoice(conn, &school_id, &invoice_id)?;
    Ok(json!({ "data": invoice }))
}

fn invoices_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let invoice_id = helpers::required_str(&req.params, "invoiceId")?;
    load_invoice(conn, &school_id, &invoice_id)?;
    helpers::require_roles(&ctx, &FINANCE_ROLES)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_write("db_tx_failed", e, "invoices"))?;
    if let Err(e) = tx.execute(
        "UPDATE financial_transactions SET invoice_id = NULL WHERE invoice_id = ?",
        [&invoice_id],
    ) {
        return Err(db_write("db_update_failed", e, "financial_transactions"));
    }
    if let Err(e) = tx.execute("DELETE FROM invoices WHERE id = ?", [&invoice_id]) {
        return Err(db_write("db_delete_failed", e, "invoices"));
    }
    tx.commit()
        .map_err(|e| db_write("db_commit_failed", e, "invoices"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "invoice_deleted", &invoice_id);
    Ok(json!({ "success": true }))
}

/// Create the matching income transaction for settled invoices that don't
/// have one yet.
fn invoices_reconcile(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &FINANCE_ROLES)?;

    let status = helpers::optional_str(&req.params, "status").unwrap_or_else(|| "paid".into());
    let invoice_ids: Option<Vec<String>> = req
        .params
        .get("invoiceIds")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        });

    let mut stmt = conn.prepare(
        "SELECT i.id, i.amount, i.due_date, i.paid_at, s.first_name, s.last_name
         FROM invoices i
         JOIN students s ON s.id = i.student_id
         WHERE s.school_id = ? AND i.status = ?",
    )?;
    let invoices = stmt
        .query_map((&school_id, &status), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, f64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut created = 0usize;
    for (invoice_id, amount, due_date, paid_at, first_name, last_name) in invoices {
        if let Some(ids) = &invoice_ids {
            if !ids.contains(&invoice_id) {
                continue;
            }
        }
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM financial_transactions WHERE invoice_id = ?",
                [&invoice_id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            continue;
        }
        let date = paid_at
            .as_deref()
            .map(|ts| ts.split('T').next().unwrap_or(ts).to_string())
            .unwrap_or(due_date);
        let student_name = format!("{} {}", first_name, last_name).trim().to_string();
        conn.execute(
            "INSERT INTO financial_transactions(id, school_id, invoice_id, description, category, amount, transaction_type, status, date, created_at)
             VALUES(?, ?, ?, ?, 'Tuition', ?, 'income', 'paid', ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &school_id,
                &invoice_id,
                format!("Tuition {}", student_name),
                amount,
                &date,
                helpers::now_iso(),
            ),
        )
        .map_err(|e| db_write("db_insert_failed", e, "financial_transactions"))?;
        created += 1;
    }

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "invoice_reconciled",
        &format!("created={}", created),
    );
    Ok(json!({ "created": created }))
}

fn transaction_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "schoolId": r.get::<_, String>(1)?,
        "invoiceId": r.get::<_, Option<String>>(2)?,
        "description": r.get::<_, String>(3)?,
        "category": r.get::<_, String>(4)?,
        "amount": fmt_amount(r.get::<_, f64>(5)?),
        "type": r.get::<_, String>(6)?,
        "status": r.get::<_, String>(7)?,
        "date": r.get::<_, String>(8)?,
        "createdAt": r.get::<_, String>(9)?,
    }))
}

const TRANSACTION_COLS: &str = "id, school_id, invoice_id, description, category, amount,
             transaction_type, status, date, created_at";

fn load_transaction(
    conn: &Connection,
    school_id: &str,
    transaction_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM financial_transactions WHERE id = ? AND school_id = ?",
        TRANSACTION_COLS
    );
    conn.query_row(&sql, (transaction_id, school_id), transaction_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("transaction not found"))
}

fn transactions_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(kind) = helpers::optional_str(&req.params, "type") {
        where_sql.push_str(" AND transaction_type = ?");
        binds.push(SqlValue::Text(kind));
    }
    if let Some(status) = helpers::optional_str(&req.params, "status") {
        where_sql.push_str(" AND status = ?");
        binds.push(SqlValue::Text(status));
    }
    if let Some(category) = helpers::optional_str(&req.params, "category") {
        where_sql.push_str(" AND category LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&category)));
    }
    if let Some(from) = helpers::optional_str(&req.params, "dateFrom") {
        where_sql.push_str(" AND date >= ?");
        binds.push(SqlValue::Text(from));
    }
    if let Some(to) = helpers::optional_str(&req.params, "dateTo") {
        where_sql.push_str(" AND date <= ?");
        binds.push(SqlValue::Text(to));
    }

    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) FROM financial_transactions {}", where_sql),
        &format!(
            "SELECT {} FROM financial_transactions {} ORDER BY date DESC",
            TRANSACTION_COLS, where_sql
        ),
        &binds,
        transaction_row,
    )
}

fn transactions_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &FINANCE_ROLES)?;

    let description = helpers::required_trimmed(&req.params, "description")?;
    let kind = helpers::required_str(&req.params, "type")?;
    helpers::validate_choice(&kind, &TRANSACTION_TYPES, "type")?;
    let status = helpers::optional_str(&req.params, "status").unwrap_or_else(|| "open".into());
    helpers::validate_choice(&status, &TRANSACTION_STATUSES, "status")?;
    let amount = helpers::required_amount(&req.params, "amount")?;
    let date = helpers::required_date_param(&req.params, "date")?;

    let invoice_id = helpers::optional_str(&req.params, "invoiceId");
    if let Some(invoice_id) = invoice_id.as_deref() {
        let valid: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM invoices i JOIN students s ON s.id = i.student_id
                 WHERE i.id = ? AND s.school_id = ?",
                (invoice_id, &school_id),
                |r| r.get(0),
            )
            .optional()?;
        if valid.is_none() {
            return Err(HandlerErr::bad_params("invalid invoice"));
        }
    }

    let transaction_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO financial_transactions(id, school_id, invoice_id, description, category, amount, transaction_type, status, date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &transaction_id,
            &school_id,
            invoice_id.as_deref(),
            &description,
            helpers::optional_str(&req.params, "category").unwrap_or_default(),
            amount,
            &kind,
            &status,
            &date,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "financial_transactions"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "transaction_created",
        &format!("{} ({})", description, kind),
    );
    let transaction = load_transaction(conn, &school_id, &transaction_id)?;
    Ok(json!({ "data": transaction }))
}

fn transactions_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let transaction_id = helpers::required_str(&req.params, "transactionId")?;
    load_transaction(conn, &school_id, &transaction_id)?;
    helpers::require_roles(&ctx, &FINANCE_ROLES)?;

    if let Some(kind) = helpers::optional_str(&req.params, "type") {
        helpers::validate_choice(&kind, &TRANSACTION_TYPES, "type")?;
        conn.execute(
            "UPDATE financial_transactions SET transaction_type = ? WHERE id = ?",
            (&kind, &transaction_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "financial_transactions"))?;
    }
    if let Some(status) = helpers::optional_str(&req.params, "status") {
        helpers::validate_choice(&status, &TRANSACTION_STATUSES, "status")?;
        conn.execute(
            "UPDATE financial_transactions SET status = ? WHERE id = ?",
            (&status, &transaction_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "financial_transactions"))?;
    }
    if req.params.get("amount").is_some() {
        let amount = helpers::required_amount(&req.params, "amount")?;
        conn.execute(
            "UPDATE financial_transactions SET amount = ? WHERE id = ?",
            (amount, &transaction_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "financial_transactions"))?;
    }
    if req.params.get("date").is_some() {
        let date = helpers::required_date_param(&req.params, "date")?;
        conn.execute(
            "UPDATE financial_transactions SET date = ? WHERE id = ?",
            (&date, &transaction_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "financial_transactions"))?;
    }
    for (key, column) in [("description", "description"), ("category", "category")] {
        if let Some(value) = helpers::optional_str(&req.params, key) {
            let sql = format!(
                "UPDATE financial_transactions SET {} = ? WHERE id = ?",
                column
            );
            conn.execute(&sql, (&value, &transaction_id))
                .map_err(|e| db_write("db_update_failed", e, "financial_transactions"))?;
        }
    }
    if req.params.get("invoiceId").is_some() {
        let invoice_id = helpers::required_str(&req.params, "invoiceId")?;
        let valid: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM invoices i JOIN students s ON s.id = i.student_id
                 WHERE i.id = ? AND s.school_id = ?",
                (&invoice_id, &school_id),
                |r| r.get(0),
            )
            .optional()?;
        if valid.is_none() {
            return Err(HandlerErr::bad_params("invalid invoice"));
        }
        conn.execute(
            "UPDATE financial_transactions SET invoice_id = ? WHERE id = ?",
            (&invoice_id, &transaction_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "financial_transactions"))?;
    }

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "transaction_updated",
        &transaction_id,
    );
    let transaction = load_transaction(conn, &school_id, &transaction_id)?;
    Ok(json!({ "data": transaction }))
}

fn transactions_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let transaction_id = helpers::required_str(&req.params, "transactionId")?;
    load_transaction(conn, &school_id, &transaction_id)?;
    helpers::require_roles(&ctx, &FINANCE_ROLES)?;

    conn.execute(
        "DELETE FROM financial_transactions WHERE id = ?",
        [&transaction_id],
    )
    .map_err(|e| db_write("db_delete_failed", e, "financial_transactions"))?;
    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "transaction_deleted",
        &transaction_id,
    );
    Ok(json!({ "success": true }))
}

fn cashflow_summary(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(from) = helpers::optional_str(&req.params, "dateFrom") {
        where_sql.push_str(" AND date >= ?");
        binds.push(SqlValue::Text(from));
    }
    if let Some(to) = helpers::optional_str(&req.params, "dateTo") {
        where_sql.push_str(" AND date <= ?");
        binds.push(SqlValue::Text(to));
    }

    let sql = format!(
        "SELECT date, transaction_type, SUM(amount)
         FROM financial_transactions {}
         GROUP BY date, transaction_type",
        where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, f64>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut income = 0.0f64;
    let mut expense = 0.0f64;
    let mut monthly: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for (date, kind, total) in rows {
        let month_key = date.get(..7).unwrap_or(&date).to_string();
        let entry = monthly.entry(month_key).or_insert((0.0, 0.0));
        if kind == "income" {
            income += total;
            entry.0 += total;
        } else {
            expense += total;
            entry.1 += total;
        }
    }

    Ok(json!({
        "summary": {
            "income": fmt_amount(income),
            "expense": fmt_amount(expense),
            "net": fmt_amount(income - expense),
        },
        "monthly": monthly
            .into_iter()
            .map(|(month, (income, expense))| json!({
                "month": month,
                "income": fmt_amount(income),
                "expense": fmt_amount(expense),
            }))
            .collect::<Vec<_>>()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "invoices.list" => Some(helpers::run(state, req, |conn| invoices_list(conn, req))),
        "invoices.create" => Some(helpers::run(state, req, |conn| invoices_create(conn, req))),
        "invoices.get" => Some(helpers::run(state, req, |conn| invoices_get(conn, req))),
        "invoices.update" => Some(helpers::run(state, req, |conn| invoices_update(conn, req))),
        "invoices.delete" => Some(helpers::run(state, req, |conn| invoices_delete(conn, req))),
        "invoices.reconcile" => {
            Some(helpers::run(state, req, |conn| invoices_reconcile(conn, req)))
        }
        "transactions.list" => Some(helpers::run(state, req, |conn| transactions_list(conn, req))),
        "transactions.create" => {
            Some(helpers::run(state, req, |conn| transactions_create(conn, req)))
        }
        "transactions.update" => {
            Some(helpers::run(state, req, |conn| transactions_update(conn, req)))
        }
        "transactions.delete" => {
            Some(helpers::run(state, req, |conn| transactions_delete(conn, req)))
        }
        "cashflow.summary" => Some(helpers::run(state, req, |conn| cashflow_summary(conn, req))),
        _ => None,
    }
}
