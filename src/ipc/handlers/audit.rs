use crate::ipc::helpers::{self, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row};
use serde_json::json;

struct AuditRecord {
    id: String,
    school_id: String,
    user_profile_id: Option<String>,
    action: String,
    detail: String,
    ip_address: String,
    created_at: String,
}

const AUDIT_COLS: &str =
    "a.id, a.school_id, a.user_profile_id, a.action, a.detail, a.ip_address, a.created_at";

fn audit_record(r: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    Ok(AuditRecord {
        id: r.get(0)?,
        school_id: r.get(1)?,
        user_profile_id: r.get(2)?,
        action: r.get(3)?,
        detail: r.get(4)?,
        ip_address: r.get(5)?,
        created_at: r.get(6)?,
    })
}

fn audit_logs_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])?;

    let mut where_sql = "WHERE a.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(action) = helpers::optional_str(&req.params, "action") {
        where_sql.push_str(" AND a.action LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&action)));
    }
    if let Some(user) = helpers::optional_str(&req.params, "user") {
        where_sql.push_str(
            " AND a.user_profile_id IN (
                 SELECT p.id FROM user_profiles p
                 JOIN users u ON u.id = p.user_id
                 WHERE u.username LIKE ?)",
        );
        binds.push(SqlValue::Text(helpers::like_pattern(&user)));
    }
    if let Some(from) = helpers::optional_str(&req.params, "dateFrom") {
        where_sql.push_str(" AND a.created_at >= ?");
        binds.push(SqlValue::Text(from));
    }
    if let Some(to) = helpers::optional_str(&req.params, "dateTo") {
        // An inclusive upper bound on a date means anything before midnight.
        where_sql.push_str(" AND a.created_at < ?");
        binds.push(SqlValue::Text(format!("{}T23:59:59Z", to)));
    }

    let (page, page_size) = helpers::page_params(&req.params);
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM audit_logs a {}", where_sql),
        rusqlite::params_from_iter(binds.iter()),
        |r| r.get(0),
    )?;
    if total == 0 {
        return Ok(json!({
            "data": [],
            "pagination": { "page": 1, "pageSize": page_size, "total": 0, "totalPages": 0 }
        }));
    }
    let total_pages = (total + page_size - 1) / page_size;
    let page = page.min(total_pages);
    let offset = (page - 1) * page_size;

    let sql = format!(
        "SELECT {} FROM audit_logs a {} ORDER BY a.created_at DESC LIMIT ? OFFSET ?",
        AUDIT_COLS, where_sql
    );
    binds.push(SqlValue::Integer(page_size));
    binds.push(SqlValue::Integer(offset));
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), audit_record)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut data = Vec::with_capacity(records.len());
    for record in &records {
        data.push(json!({
            "id": record.id,
            "schoolId": record.school_id,
            "user": helpers::profile_name(conn, record.user_profile_id.as_deref())?,
            "action": record.action,
            "detail": record.detail,
            "ip": record.ip_address,
            "createdAt": record.created_at,
        }));
    }
    Ok(json!({
        "data": data,
        "pagination": {
            "page": page,
            "pageSize": page_size,
            "total": total,
            "totalPages": total_pages
        }
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auditLogs.list" => Some(helpers::run(state, req, |conn| audit_logs_list(conn, req))),
        _ => None,
    }
}
