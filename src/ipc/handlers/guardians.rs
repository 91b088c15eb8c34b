use crate::ipc::handlers::students::student_in_school;
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const MUTATE_ROLES: [&str; 4] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::STAFF,
];

fn guardian_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "schoolId": r.get::<_, String>(1)?,
        "name": r.get::<_, String>(2)?,
        "relation": r.get::<_, String>(3)?,
        "phone": r.get::<_, String>(4)?,
        "email": r.get::<_, String>(5)?,
        "cpf": r.get::<_, String>(6)?,
        "createdAt": r.get::<_, String>(7)?,
    }))
}

const GUARDIAN_COLS: &str = "id, school_id, name, relation, phone, email, cpf, created_at";

fn load_guardian(
    conn: &Connection,
    school_id: &str,
    guardian_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM guardians WHERE id = ? AND school_id = ?",
        GUARDIAN_COLS
    );
    conn.query_row(&sql, (guardian_id, school_id), guardian_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("guardian not found"))
}

fn guardians_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(name) = helpers::optional_str(&req.params, "name") {
        where_sql.push_str(" AND name LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&name)));
    }
    if let Some(cpf) = helpers::optional_str(&req.params, "cpf") {
        where_sql.push_str(" AND cpf LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&cpf)));
    }

    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) FROM guardians {}", where_sql),
        &format!(
            "SELECT {} FROM guardians {} ORDER BY name",
            GUARDIAN_COLS, where_sql
        ),
        &binds,
        guardian_row,
    )
}

fn guardians_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let name = helpers::required_trimmed(&req.params, "name")?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let guardian_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO guardians(id, school_id, name, relation, phone, email, cpf, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &guardian_id,
            &school_id,
            &name,
            helpers::optional_str(&req.params, "relation").unwrap_or_default(),
            helpers::optional_str(&req.params, "phone").unwrap_or_default(),
            helpers::optional_str(&req.params, "email").unwrap_or_default(),
            helpers::optional_str(&req.params, "cpf").unwrap_or_default(),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "guardians"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "guardian_created", &guardian_id);
    let guardian = load_guardian(conn, &school_id, &guardian_id)?;
    Ok(json!({ "data": guardian }))
}

fn guardians_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let guardian_id = helpers::required_str(&req.params, "guardianId")?;
    let guardian = load_guardian(conn, &school_id, &guardian_id)?;
    Ok(json!({ "data": guardian }))
}

fn guardians_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let guardian_id = helpers::required_str(&req.params, "guardianId")?;
    load_guardian(conn, &school_id, &guardian_id)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    for (key, column) in [
        ("name", "name"),
        ("relation", "relation"),
        ("phone", "phone"),
        ("email", "email"),
        ("cpf", "cpf"),
    ] {
        if let Some(value) = helpers::optional_str(&req.params, key) {
            let sql = format!("UPDATE guardians SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &guardian_id))
                .map_err(|e| db_write("db_update_failed", e, "guardians"))?;
        }
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "guardian_updated", &guardian_id);
    let guardian = load_guardian(conn, &school_id, &guardian_id)?;
    Ok(json!({ "data": guardian }))
}

fn guardians_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let guardian_id = helpers::required_str(&req.params, "guardianId")?;
    load_guardian(conn, &school_id, &guardian_id)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_write("db_tx_failed", e, "guardians"))?;
    for (sql, table) in [
        ("DELETE FROM student_parents WHERE guardian_id = ?", "student_parents"),
        (
            "DELETE FROM student_guardians WHERE guardian_id = ?",
            "student_guardians",
        ),
        ("DELETE FROM guardians WHERE id = ?", "guardians"),
    ] {
        if let Err(e) = tx.execute(sql, [&guardian_id]) {
            return Err(db_write("db_delete_failed", e, table));
        }
    }
    tx.commit()
        .map_err(|e| db_write("db_commit_failed", e, "guardians"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "guardian_deleted", &guardian_id);
    Ok(json!({ "success": true }))
}

fn link_set(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let student_id = helpers::required_str(&req.params, "studentId")?;
    let guardian_id = helpers::required_str(&req.params, "guardianId")?;
    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let guardian_exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM guardians WHERE id = ? AND school_id = ?",
            (&guardian_id, &school_id),
            |r| r.get(0),
        )
        .optional()?;
    if guardian_exists.is_none() {
        return Err(HandlerErr::not_found("guardian not found"));
    }

    let is_primary = helpers::optional_bool(&req.params, "isPrimary").unwrap_or(false);
    conn.execute(
        "INSERT INTO student_guardians(id, student_id, guardian_id, is_primary, created_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id, guardian_id) DO UPDATE SET
           is_primary = excluded.is_primary",
        (
            Uuid::new_v4().to_string(),
            &student_id,
            &guardian_id,
            if is_primary { 1 } else { 0 },
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "student_guardians"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "student_guardian_set",
        &format!("student={} guardian={}", student_id, guardian_id),
    );
    let is_primary: i64 = conn.query_row(
        "SELECT is_primary FROM student_guardians WHERE student_id = ? AND guardian_id = ?",
        (&student_id, &guardian_id),
        |r| r.get(0),
    )?;
    Ok(json!({
        "data": {
            "studentId": student_id,
            "guardianId": guardian_id,
            "isPrimary": is_primary != 0
        }
    }))
}

fn link_remove(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let student_id = helpers::required_str(&req.params, "studentId")?;
    let guardian_id = helpers::required_str(&req.params, "guardianId")?;
    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let guardian_exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM guardians WHERE id = ? AND school_id = ?",
            (&guardian_id, &school_id),
            |r| r.get(0),
        )
        .optional()?;
    if guardian_exists.is_none() {
        return Err(HandlerErr::not_found("guardian not found"));
    }

    conn.execute(
        "DELETE FROM student_guardians WHERE student_id = ? AND guardian_id = ?",
        (&student_id, &guardian_id),
    )
    .map_err(|e| db_write("db_delete_failed", e, "student_guardians"))?;
    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "student_guardian_deleted",
        &format!("student={} guardian={}", student_id, guardian_id),
    );
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "guardians.list" => Some(helpers::run(state, req, |conn| guardians_list(conn, req))),
        "guardians.create" => Some(helpers::run(state, req, |conn| guardians_create(conn, req))),
        "guardians.get" => Some(helpers::run(state, req, |conn| guardians_get(conn, req))),
        "guardians.update" => Some(helpers::run(state, req, |conn| guardians_update(conn, req))),
        "guardians.delete" => Some(helpers::run(state, req, |conn| guardians_delete(conn, req))),
        "studentGuardians.set" => Some(helpers::run(state, req, |conn| link_set(conn, req))),
        "studentGuardians.remove" => Some(helpers::run(state, req, |conn| link_remove(conn, req))),
        _ => None,
    }
}
