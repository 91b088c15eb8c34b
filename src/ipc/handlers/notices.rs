use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const NOTICE_TYPES: [&str; 3] = ["general", "urgent", "academic"];

const MUTATE_ROLES: [&str; 3] = [roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR];

struct NoticeRecord {
    id: String,
    school_id: String,
    author_profile_id: Option<String>,
    title: String,
    content: String,
    notice_type: String,
    date: String,
    created_at: String,
}

const NOTICE_COLS: &str =
    "n.id, n.school_id, n.author_profile_id, n.title, n.content, n.notice_type, n.date, n.created_at";

fn notice_record(r: &Row<'_>) -> rusqlite::Result<NoticeRecord> {
    Ok(NoticeRecord {
        id: r.get(0)?,
        school_id: r.get(1)?,
        author_profile_id: r.get(2)?,
        title: r.get(3)?,
        content: r.get(4)?,
        notice_type: r.get(5)?,
        date: r.get(6)?,
        created_at: r.get(7)?,
    })
}

fn notice_json(conn: &Connection, record: &NoticeRecord) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "id": record.id,
        "schoolId": record.school_id,
        "title": record.title,
        "content": record.content,
        "type": record.notice_type,
        "author": helpers::profile_name(conn, record.author_profile_id.as_deref())?,
        "date": record.date,
        "createdAt": record.created_at,
    }))
}

fn load_notice(
    conn: &Connection,
    school_id: &str,
    notice_id: &str,
) -> Result<NoticeRecord, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM notices n WHERE n.id = ? AND n.school_id = ?",
        NOTICE_COLS
    );
    conn.query_row(&sql, (notice_id, school_id), notice_record)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("notice not found"))
}

fn notices_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE n.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(kind) = helpers::optional_str(&req.params, "type") {
        where_sql.push_str(" AND n.notice_type = ?");
        binds.push(SqlValue::Text(kind));
    }
    if let Some(from) = helpers::optional_str(&req.params, "dateFrom") {
        where_sql.push_str(" AND n.date >= ?");
        binds.push(SqlValue::Text(from));
    }
    if let Some(to) = helpers::optional_str(&req.params, "dateTo") {
        where_sql.push_str(" AND n.date <= ?");
        binds.push(SqlValue::Text(to));
    }
    if let Some(q) = helpers::optional_str(&req.params, "q") {
        where_sql.push_str(" AND n.title LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&q)));
    }

    let (page, page_size) = helpers::page_params(&req.params);
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM notices n {}", where_sql),
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
        "SELECT {} FROM notices n {} ORDER BY n.date DESC, n.created_at DESC LIMIT ? OFFSET ?",
        NOTICE_COLS, where_sql
    );
    binds.push(SqlValue::Integer(page_size));
    binds.push(SqlValue::Integer(offset));
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), notice_record)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut data = Vec::with_capacity(records.len());
    for record in &records {
        data.push(notice_json(conn, record)?);
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

fn notices_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let title = helpers::required_trimmed(&req.params, "title")?;
    let content = helpers::required_trimmed(&req.params, "content")?;
    let notice_type =
        helpers::optional_str(&req.params, "type").unwrap_or_else(|| "general".into());
    helpers::validate_choice(&notice_type, &NOTICE_TYPES, "type")?;
    let date = helpers::optional_date_param(&req.params, "date")?
        .unwrap_or_else(|| helpers::today().format("%Y-%m-%d").to_string());

    let notice_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO notices(id, school_id, author_profile_id, title, content, notice_type, date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &notice_id,
            &school_id,
            ctx.profile_id(),
            &title,
            &content,
            &notice_type,
            &date,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "notices"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "notice_created", &title);
    let record = load_notice(conn, &school_id, &notice_id)?;
    Ok(json!({ "data": notice_json(conn, &record)? }))
}

fn notices_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let notice_id = helpers::required_str(&req.params, "noticeId")?;
    load_notice(conn, &school_id, &notice_id)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    for (key, column) in [("title", "title"), ("content", "content")] {
        if let Some(value) = helpers::optional_str(&req.params, key) {
            let sql = format!("UPDATE notices SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &notice_id))
                .map_err(|e| db_write("db_update_failed", e, "notices"))?;
        }
    }
    if let Some(kind) = helpers::optional_str(&req.params, "type") {
        helpers::validate_choice(&kind, &NOTICE_TYPES, "type")?;
        conn.execute(
            "UPDATE notices SET notice_type = ? WHERE id = ?",
            (&kind, &notice_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "notices"))?;
    }
    if req.params.get("date").is_some() {
        let date = helpers::required_date_param(&req.params, "date")?;
        conn.execute(
            "UPDATE notices SET date = ? WHERE id = ?",
            (&date, &notice_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "notices"))?;
    }

    let record = load_notice(conn, &school_id, &notice_id)?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "notice_updated", &record.title);
    Ok(json!({ "data": notice_json(conn, &record)? }))
}

fn notices_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let notice_id = helpers::required_str(&req.params, "noticeId")?;
    load_notice(conn, &school_id, &notice_id)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    conn.execute("DELETE FROM notices WHERE id = ?", [&notice_id])
        .map_err(|e| db_write("db_delete_failed", e, "notices"))?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "notice_deleted", &notice_id);
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notices.list" => Some(helpers::run(state, req, |conn| notices_list(conn, req))),
        "notices.create" => Some(helpers::run(state, req, |conn| notices_create(conn, req))),
        "notices.update" => Some(helpers::run(state, req, |conn| notices_update(conn, req))),
        "notices.delete" => Some(helpers::run(state, req, |conn| notices_delete(conn, req))),
        _ => None,
    }
}
