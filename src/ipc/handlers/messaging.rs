use crate::ipc::handlers::students::student_in_school;
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const SENDER_TYPES: [&str; 2] = ["school", "parent"];

const SEND_ROLES: [&str; 5] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::STAFF,
    roles::TEACHER,
];

fn conversation_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let first: String = r.get(2)?;
    let last: String = r.get(3)?;
    let student_name = format!("{} {}", first, last).trim().to_string();
    let student_name = if student_name.is_empty() { first } else { student_name };
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "studentName": student_name,
        "createdAt": r.get::<_, String>(4)?,
    }))
}

const CONVERSATION_COLS: &str =
    "c.id, c.student_id, s.first_name, s.last_name, c.created_at";

fn conversations_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE c.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(student_id) = helpers::optional_str(&req.params, "studentId") {
        where_sql.push_str(" AND c.student_id = ?");
        binds.push(SqlValue::Text(student_id));
    }

    let from = "FROM conversations c JOIN students s ON s.id = c.student_id";
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", from, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY c.created_at DESC",
            CONVERSATION_COLS, from, where_sql
        ),
        &binds,
        conversation_row,
    )
}

fn conversations_open(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &SEND_ROLES)?;

    let student_id = helpers::required_str(&req.params, "studentId")?;
    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM conversations WHERE school_id = ? AND student_id = ?",
            (&school_id, &student_id),
            |r| r.get(0),
        )
        .optional()?;
    let conversation_id = match existing {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO conversations(id, school_id, student_id, created_at) VALUES(?, ?, ?, ?)",
                (&id, &school_id, &student_id, helpers::now_iso()),
            )
            .map_err(|e| db_write("db_insert_failed", e, "conversations"))?;
            helpers::log_action(conn, &school_id, ctx.profile_id(), "conversation_created", &id);
            id
        }
    };

    let sql = format!(
        "SELECT {} FROM conversations c JOIN students s ON s.id = c.student_id WHERE c.id = ?",
        CONVERSATION_COLS
    );
    let conversation = conn.query_row(&sql, [&conversation_id], conversation_row)?;
    Ok(json!({ "data": conversation }))
}

fn message_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "conversationId": r.get::<_, String>(1)?,
        "senderType": r.get::<_, String>(2)?,
        "senderId": r.get::<_, Option<String>>(3)?,
        "text": r.get::<_, String>(4)?,
        "sentAt": r.get::<_, String>(5)?,
    }))
}

const MESSAGE_COLS: &str =
    "m.id, m.conversation_id, m.sender_type, p.user_id, m.text, m.sent_at";

fn conversation_in_school(
    conn: &Connection,
    school_id: &str,
    conversation_id: &str,
) -> Result<bool, HandlerErr> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM conversations WHERE id = ? AND school_id = ?",
            (conversation_id, school_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn messages_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let conversation_id = helpers::required_str(&req.params, "conversationId")?;
    if !conversation_in_school(conn, &school_id, &conversation_id)? {
        return Err(HandlerErr::not_found("conversation not found"));
    }

    let binds: Vec<SqlValue> = vec![SqlValue::Text(conversation_id)];
    let from = "FROM messages m LEFT JOIN user_profiles p ON p.id = m.sender_profile_id";
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} WHERE m.conversation_id = ?", from),
        &format!(
            "SELECT {} {} WHERE m.conversation_id = ? ORDER BY m.sent_at",
            MESSAGE_COLS, from
        ),
        &binds,
        message_row,
    )
}

fn messages_send(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let conversation_id = helpers::required_str(&req.params, "conversationId")?;
    if !conversation_in_school(conn, &school_id, &conversation_id)? {
        return Err(HandlerErr::not_found("conversation not found"));
    }
    helpers::require_roles(&ctx, &SEND_ROLES)?;

    let text = helpers::required_trimmed(&req.params, "text")?;
    let sender_type =
        helpers::optional_str(&req.params, "senderType").unwrap_or_else(|| "school".into());
    helpers::validate_choice(&sender_type, &SENDER_TYPES, "senderType")?;

    let sender_profile = if sender_type == "school" {
        ctx.profile_id()
    } else {
        None
    };
    let message_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO messages(id, conversation_id, sender_type, sender_profile_id, text, sent_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &message_id,
            &conversation_id,
            &sender_type,
            sender_profile,
            &text,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "messages"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "message_sent", &message_id);
    let sql = format!(
        "SELECT {} FROM messages m LEFT JOIN user_profiles p ON p.id = m.sender_profile_id WHERE m.id = ?",
        MESSAGE_COLS
    );
    let message = conn.query_row(&sql, [&message_id], message_row)?;
    Ok(json!({ "data": message }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "conversations.list" => {
            Some(helpers::run(state, req, |conn| conversations_list(conn, req)))
        }
        "conversations.open" => {
            Some(helpers::run(state, req, |conn| conversations_open(conn, req)))
        }
        "conversations.messages.list" => {
            Some(helpers::run(state, req, |conn| messages_list(conn, req)))
        }
        "conversations.messages.send" => {
            Some(helpers::run(state, req, |conn| messages_send(conn, req)))
        }
        _ => None,
    }
}
