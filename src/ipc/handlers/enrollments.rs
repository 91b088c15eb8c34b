use crate::ipc::handlers::classrooms::classroom_in_school;
use crate::ipc::handlers::students::student_in_school;
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const STATUSES: [&str; 4] = ["active", "transferred", "cancelled", "completed"];

const MUTATE_ROLES: [&str; 4] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::STAFF,
];

fn enrollment_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "classroomId": r.get::<_, String>(2)?,
        "startDate": r.get::<_, String>(3)?,
        "endDate": r.get::<_, Option<String>>(4)?,
        "status": r.get::<_, String>(5)?,
        "createdAt": r.get::<_, String>(6)?,
    }))
}

const ENROLLMENT_COLS: &str =
    "e.id, e.student_id, e.classroom_id, e.start_date, e.end_date, e.status, e.created_at";

fn load_enrollment(
    conn: &Connection,
    school_id: &str,
    enrollment_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.id = ? AND s.school_id = ?",
        ENROLLMENT_COLS
    );
    conn.query_row(&sql, (enrollment_id, school_id), enrollment_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("enrollment not found"))
}

/// End date can't precede the start, and a completed enrollment must have
/// one.
fn check_dates(
    start_date: &str,
    end_date: Option<&str>,
    status: &str,
) -> Result<(), HandlerErr> {
    if let Some(end) = end_date {
        if end < start_date {
            return Err(HandlerErr::bad_params("end date before start date"));
        }
    }
    if status == "completed" && end_date.is_none() {
        return Err(HandlerErr::bad_params(
            "endDate required when status is completed",
        ));
    }
    Ok(())
}

fn enrollments_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE s.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(status) = helpers::optional_str(&req.params, "status") {
        where_sql.push_str(" AND e.status = ?");
        binds.push(SqlValue::Text(status));
    }
    if let Some(student_id) = helpers::optional_str(&req.params, "studentId") {
        where_sql.push_str(" AND e.student_id = ?");
        binds.push(SqlValue::Text(student_id));
    }
    if let Some(classroom_id) = helpers::optional_str(&req.params, "classroomId") {
        where_sql.push_str(" AND e.classroom_id = ?");
        binds.push(SqlValue::Text(classroom_id));
    }

    let from = "FROM enrollments e JOIN students s ON s.id = e.student_id";
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", from, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY e.start_date DESC",
            ENROLLMENT_COLS, from, where_sql
        ),
        &binds,
        enrollment_row,
    )
}

fn enrollments_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let student_id = helpers::required_str(&req.params, "studentId")?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    let status = helpers::optional_str(&req.params, "status").unwrap_or_else(|| "active".into());
    helpers::validate_choice(&status, &STATUSES, "status")?;
    let start_date = helpers::required_date_param(&req.params, "startDate")?;
    let end_date = helpers::optional_date_param(&req.params, "endDate")?;
    check_dates(&start_date, end_date.as_deref(), &status)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    if !student_in_school(conn, &school_id, &student_id)?
        || !classroom_in_school(conn, &school_id, &classroom_id)?
    {
        return Err(HandlerErr::not_found("student or classroom not found"));
    }

    let enrollment_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO enrollments(id, student_id, classroom_id, start_date, end_date, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &enrollment_id,
            &student_id,
            &classroom_id,
            &start_date,
            end_date.as_deref(),
            &status,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "enrollments"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "enrollment_created", &enrollment_id);
    let enrollment = load_enrollment(conn, &school_id, &enrollment_id)?;
    Ok(json!({ "data": enrollment }))
}

fn enrollments_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let enrollment_id = helpers::required_str(&req.params, "enrollmentId")?;
    let enrollment = load_enrollment(conn, &school_id, &enrollment_id)?;
    Ok(json!({ "data": enrollment }))
}

fn enrollments_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let enrollment_id = helpers::required_str(&req.params, "enrollmentId")?;
    let existing = load_enrollment(conn, &school_id, &enrollment_id)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let mut status = existing
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("active")
        .to_string();
    let mut start_date = existing
        .get("startDate")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let mut end_date = existing
        .get("endDate")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    if let Some(new_status) = helpers::optional_str(&req.params, "status") {
        helpers::validate_choice(&new_status, &STATUSES, "status")?;
        status = new_status;
    }
    if req.params.get("startDate").is_some() {
        start_date = helpers::required_date_param(&req.params, "startDate")?;
    }
    if req.params.get("endDate").is_some() {
        end_date = helpers::optional_date_param(&req.params, "endDate")?;
    }
    check_dates(&start_date, end_date.as_deref(), &status)?;

    let mut classroom_id = existing
        .get("classroomId")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if let Some(new_classroom) = helpers::optional_str(&req.params, "classroomId") {
        if !classroom_in_school(conn, &school_id, &new_classroom)? {
            return Err(HandlerErr::bad_params("invalid classroom"));
        }
        classroom_id = new_classroom;
    }

    conn.execute(
        "UPDATE enrollments SET classroom_id = ?, start_date = ?, end_date = ?, status = ?
         WHERE id = ?",
        (
            &classroom_id,
            &start_date,
            end_date.as_deref(),
            &status,
            &enrollment_id,
        ),
    )
    .map_err(|e| db_write("db_update_failed", e, "enrollments"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "enrollment_updated", &enrollment_id);
    let enrollment = load_enrollment(conn, &school_id, &enrollment_id)?;
    Ok(json!({ "data": enrollment }))
}

fn enrollments_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let enrollment_id = helpers::required_str(&req.params, "enrollmentId")?;
    load_enrollment(conn, &school_id, &enrollment_id)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    conn.execute("DELETE FROM enrollments WHERE id = ?", [&enrollment_id])
        .map_err(|e| db_write("db_delete_failed", e, "enrollments"))?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "enrollment_deleted", &enrollment_id);
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollments.list" => Some(helpers::run(state, req, |conn| enrollments_list(conn, req))),
        "enrollments.create" => {
            Some(helpers::run(state, req, |conn| enrollments_create(conn, req)))
        }
        "enrollments.get" => Some(helpers::run(state, req, |conn| enrollments_get(conn, req))),
        "enrollments.update" => {
            Some(helpers::run(state, req, |conn| enrollments_update(conn, req)))
        }
        "enrollments.delete" => {
            Some(helpers::run(state, req, |conn| enrollments_delete(conn, req)))
        }
        _ => None,
    }
}
