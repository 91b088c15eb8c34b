use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const ENTITY_TYPES: [&str; 4] = ["material", "justification", "exam", "message"];

const UPLOAD_ROLES: [&str; 5] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::STAFF,
    roles::TEACHER,
];
const DELETE_ROLES: [&str; 3] = [roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR];

fn upload_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "schoolId": r.get::<_, String>(1)?,
        "entityType": r.get::<_, String>(2)?,
        "entityId": r.get::<_, String>(3)?,
        "storedPath": r.get::<_, String>(4)?,
        "originalName": r.get::<_, String>(5)?,
        "contentType": r.get::<_, String>(6)?,
        "size": r.get::<_, i64>(7)?,
        "createdAt": r.get::<_, String>(8)?,
    }))
}

const UPLOAD_COLS: &str = "id, school_id, entity_type, entity_id, stored_path, original_name,
             content_type, size, created_at";

/// Attachments for one entity, newest first. Shared with the exam
/// serializer.
pub(crate) fn uploads_for_entity(
    conn: &Connection,
    school_id: &str,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM upload_attachments
         WHERE school_id = ? AND entity_type = ? AND entity_id = ?
         ORDER BY created_at DESC",
        UPLOAD_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((school_id, entity_type, entity_id), upload_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

fn uploads_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(entity_type) = helpers::optional_str(&req.params, "entityType") {
        where_sql.push_str(" AND entity_type = ?");
        binds.push(SqlValue::Text(entity_type));
    }
    if let Some(entity_id) = helpers::optional_str(&req.params, "entityId") {
        where_sql.push_str(" AND entity_id = ?");
        binds.push(SqlValue::Text(entity_id));
    }

    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) FROM upload_attachments {}", where_sql),
        &format!(
            "SELECT {} FROM upload_attachments {} ORDER BY created_at DESC",
            UPLOAD_COLS, where_sql
        ),
        &binds,
        upload_row,
    )
}

/// The protocol is line-delimited JSON, so file payloads arrive by path:
/// the daemon copies the source file into the workspace uploads tree.
fn uploads_create(
    conn: &Connection,
    workspace: &Path,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &UPLOAD_ROLES)?;

    let entity_type = helpers::required_str(&req.params, "entityType")?;
    let entity_id = helpers::required_str(&req.params, "entityId")?;
    helpers::validate_choice(&entity_type, &ENTITY_TYPES, "entityType")?;

    if entity_type == "exam" {
        let exam_exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM exam_submissions WHERE id = ? AND school_id = ?",
                (&entity_id, &school_id),
                |r| r.get(0),
            )
            .optional()?;
        if exam_exists.is_none() {
            return Err(HandlerErr::not_found("exam submission not found"));
        }
    }

    let source_path = PathBuf::from(helpers::required_str(&req.params, "sourcePath")?);
    if !source_path.is_file() {
        return Err(HandlerErr::bad_params("sourcePath is not a file"));
    }
    let original_name = helpers::optional_str(&req.params, "originalName")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            source_path
                .file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "upload.bin".to_string());

    let upload_id = Uuid::new_v4().to_string();
    let rel_path = format!(
        "{}/{}/{}/{}_{}",
        db::UPLOADS_DIR,
        school_id,
        entity_type,
        upload_id,
        original_name
    );
    let dst = workspace.join(&rel_path);
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HandlerErr {
            code: "upload_failed",
            message: e.to_string(),
            details: None,
        })?;
    }
    std::fs::copy(&source_path, &dst).map_err(|e| HandlerErr {
        code: "upload_failed",
        message: e.to_string(),
        details: Some(json!({ "sourcePath": source_path.to_string_lossy() })),
    })?;
    let size = std::fs::metadata(&dst).map(|m| m.len() as i64).unwrap_or(0);

    conn.execute(
        "INSERT INTO upload_attachments(id, school_id, uploaded_by, entity_type, entity_id, stored_path, original_name, content_type, size, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &upload_id,
            &school_id,
            ctx.profile_id(),
            &entity_type,
            &entity_id,
            &rel_path,
            &original_name,
            helpers::optional_str(&req.params, "contentType").unwrap_or_default(),
            size,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "upload_attachments"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "upload_created",
        &format!("{}:{}", entity_type, entity_id),
    );
    let sql = format!("SELECT {} FROM upload_attachments WHERE id = ?", UPLOAD_COLS);
    let upload = conn.query_row(&sql, [&upload_id], upload_row)?;
    Ok(json!({ "data": upload }))
}

fn uploads_delete(
    conn: &Connection,
    workspace: &Path,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let upload_id = helpers::required_str(&req.params, "uploadId")?;

    let stored_path: Option<String> = conn
        .query_row(
            "SELECT stored_path FROM upload_attachments WHERE id = ? AND school_id = ?",
            (&upload_id, &school_id),
            |r| r.get(0),
        )
        .optional()?;
    let Some(stored_path) = stored_path else {
        return Err(HandlerErr::not_found("upload not found"));
    };
    helpers::require_roles(&ctx, &DELETE_ROLES)?;

    // The row is the source of truth; a missing file isn't an error.
    let _ = std::fs::remove_file(workspace.join(&stored_path));
    conn.execute(
        "DELETE FROM upload_attachments WHERE id = ?",
        [&upload_id],
    )
    .map_err(|e| db_write("db_delete_failed", e, "upload_attachments"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "upload_deleted", &upload_id);
    Ok(json!({ "success": true }))
}

fn with_workspace<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &Path) -> Result<serde_json::Value, HandlerErr>,
{
    let (Some(conn), Some(workspace)) = (state.db.as_ref(), state.workspace.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, workspace) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "uploads.list" => Some(helpers::run(state, req, |conn| uploads_list(conn, req))),
        "uploads.create" => Some(with_workspace(state, req, |conn, ws| {
            uploads_create(conn, ws, req)
        })),
        "uploads.delete" => Some(with_workspace(state, req, |conn, ws| {
            uploads_delete(conn, ws, req)
        })),
        _ => None,
    }
}
