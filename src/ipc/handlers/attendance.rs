use crate::ipc::handlers::classrooms::classroom_in_school;
use crate::ipc::handlers::students::student_in_school;
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const ATTENDANCE_STATUSES: [&str; 3] = ["present", "absent", "excused"];
const JUSTIFICATION_STATUSES: [&str; 3] = ["pending", "approved", "rejected"];

const RECORD_ROLES: [&str; 4] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::TEACHER,
];

struct JustificationRecord {
    id: String,
    attendance_id: String,
    reason: String,
    observation: String,
    status: String,
    created_by: Option<String>,
    decided_by: Option<String>,
    decided_at: Option<String>,
    created_at: String,
    updated_at: String,
}

const JUSTIFICATION_COLS: &str = "j.id, j.attendance_id, j.reason, j.observation, j.status,
             j.created_by, j.decided_by, j.decided_at, j.created_at, j.updated_at";

fn justification_record(r: &Row<'_>) -> rusqlite::Result<JustificationRecord> {
    Ok(JustificationRecord {
        id: r.get(0)?,
        attendance_id: r.get(1)?,
        reason: r.get(2)?,
        observation: r.get(3)?,
        status: r.get(4)?,
        created_by: r.get(5)?,
        decided_by: r.get(6)?,
        decided_at: r.get(7)?,
        created_at: r.get(8)?,
        updated_at: r.get(9)?,
    })
}

fn justification_json(
    conn: &Connection,
    record: &JustificationRecord,
) -> Result<serde_json::Value, HandlerErr> {
    let attendance_subject: Option<String> = conn
        .query_row(
            "SELECT subject FROM attendance_records WHERE id = ?",
            [&record.attendance_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(json!({
        "id": record.id,
        "attendanceId": record.attendance_id,
        "attendanceSubject": attendance_subject.unwrap_or_default(),
        "reason": record.reason,
        "observation": record.observation,
        "status": record.status,
        "createdBy": helpers::profile_name(conn, record.created_by.as_deref())?,
        "decidedBy": helpers::profile_name(conn, record.decided_by.as_deref())?,
        "decidedAt": record.decided_at,
        "createdAt": record.created_at,
        "updatedAt": record.updated_at,
    }))
}

fn justification_for_attendance(
    conn: &Connection,
    attendance_id: &str,
) -> Result<Option<serde_json::Value>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM absence_justifications j WHERE j.attendance_id = ?",
        JUSTIFICATION_COLS
    );
    let record = conn
        .query_row(&sql, [attendance_id], justification_record)
        .optional()?;
    match record {
        Some(record) => Ok(Some(justification_json(conn, &record)?)),
        None => Ok(None),
    }
}

struct AttendanceRecord {
    id: String,
    student_id: String,
    classroom_id: String,
    teacher_profile_id: Option<String>,
    date: String,
    subject: String,
    status: String,
    created_at: String,
}

const ATTENDANCE_COLS: &str =
    "a.id, a.student_id, a.classroom_id, a.teacher_profile_id, a.date, a.subject, a.status, a.created_at";

fn attendance_record(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        classroom_id: r.get(2)?,
        teacher_profile_id: r.get(3)?,
        date: r.get(4)?,
        subject: r.get(5)?,
        status: r.get(6)?,
        created_at: r.get(7)?,
    })
}

fn attendance_json(
    conn: &Connection,
    record: &AttendanceRecord,
) -> Result<serde_json::Value, HandlerErr> {
    let justification = justification_for_attendance(conn, &record.id)?;
    let justified = justification
        .as_ref()
        .and_then(|j| j.get("status"))
        .and_then(|s| s.as_str())
        == Some("approved");
    Ok(json!({
        "id": record.id,
        "studentId": record.student_id,
        "classroomId": record.classroom_id,
        "teacherId": record.teacher_profile_id,
        "date": record.date,
        "subject": record.subject,
        "status": record.status,
        "justification": justification,
        "justified": justified,
        "createdAt": record.created_at,
    }))
}

fn load_attendance(
    conn: &Connection,
    school_id: &str,
    attendance_id: &str,
) -> Result<AttendanceRecord, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM attendance_records a
         JOIN students s ON s.id = a.student_id
         WHERE a.id = ? AND s.school_id = ?",
        ATTENDANCE_COLS
    );
    conn.query_row(&sql, (attendance_id, school_id), attendance_record)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("attendance record not found"))
}

fn attendance_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE s.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(classroom_id) = helpers::optional_str(&req.params, "classroomId") {
        where_sql.push_str(" AND a.classroom_id = ?");
        binds.push(SqlValue::Text(classroom_id));
    }
    if let Some(student_id) = helpers::optional_str(&req.params, "studentId") {
        where_sql.push_str(" AND a.student_id = ?");
        binds.push(SqlValue::Text(student_id));
    }
    if let Some(teacher_id) = helpers::optional_str(&req.params, "teacherId") {
        where_sql.push_str(
            " AND a.teacher_profile_id IN (SELECT id FROM user_profiles WHERE id = ? OR user_id = ?)",
        );
        binds.push(SqlValue::Text(teacher_id.clone()));
        binds.push(SqlValue::Text(teacher_id));
    }
    if let Some(date) = helpers::optional_str(&req.params, "date") {
        where_sql.push_str(" AND a.date = ?");
        binds.push(SqlValue::Text(date));
    }
    if let Some(subject) = helpers::optional_str(&req.params, "subject") {
        where_sql.push_str(" AND a.subject = ?");
        binds.push(SqlValue::Text(subject));
    }

    // Justifications need a follow-up query per row.
    let (page, page_size) = helpers::page_params(&req.params);
    let from = "FROM attendance_records a JOIN students s ON s.id = a.student_id";
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {} {}", from, where_sql),
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
        "SELECT {} {} {} ORDER BY a.date DESC LIMIT ? OFFSET ?",
        ATTENDANCE_COLS, from, where_sql
    );
    binds.push(SqlValue::Integer(page_size));
    binds.push(SqlValue::Integer(offset));
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), attendance_record)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut data = Vec::with_capacity(records.len());
    for record in &records {
        data.push(attendance_json(conn, record)?);
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

fn attendance_upsert(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &RECORD_ROLES)?;

    let student_id = helpers::required_str(&req.params, "studentId")?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    let status = helpers::required_str(&req.params, "status")?;
    helpers::validate_choice(&status, &ATTENDANCE_STATUSES, "status")?;
    let date = helpers::required_date_param(&req.params, "date")?;
    let subject = helpers::optional_str(&req.params, "subject").unwrap_or_default();

    if !student_in_school(conn, &school_id, &student_id)?
        || !classroom_in_school(conn, &school_id, &classroom_id)?
    {
        return Err(HandlerErr::not_found("student or classroom not found"));
    }

    // Teachers record themselves; coordination roles may attribute another
    // teacher explicitly.
    let mut teacher_profile_id = ctx.profile_id().map(|s| s.to_string());
    if let Some(teacher_ident) = helpers::optional_str(&req.params, "teacherId") {
        let may_attribute = matches!(
            ctx.role(),
            Some(roles::ADMIN) | Some(roles::DIRECTOR) | Some(roles::COORDINATOR)
        );
        if may_attribute {
            teacher_profile_id = helpers::find_teacher_profile(conn, &school_id, &teacher_ident)?
                .map(|p| p.id);
        }
    }

    conn.execute(
        "INSERT INTO attendance_records(id, student_id, classroom_id, teacher_profile_id, date, subject, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, classroom_id, date, subject) DO UPDATE SET
           status = excluded.status,
           teacher_profile_id = excluded.teacher_profile_id",
        (
            Uuid::new_v4().to_string(),
            &student_id,
            &classroom_id,
            teacher_profile_id.as_deref(),
            &date,
            &subject,
            &status,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "attendance_records"))?;

    let attendance_id: String = conn.query_row(
        "SELECT id FROM attendance_records
         WHERE student_id = ? AND classroom_id = ? AND date = ? AND subject = ?",
        (&student_id, &classroom_id, &date, &subject),
        |r| r.get(0),
    )?;
    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "attendance_upserted",
        &attendance_id,
    );
    let record = load_attendance(conn, &school_id, &attendance_id)?;
    Ok(json!({ "data": attendance_json(conn, &record)? }))
}

fn attendance_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let attendance_id = helpers::required_str(&req.params, "attendanceId")?;
    load_attendance(conn, &school_id, &attendance_id)?;
    helpers::require_roles(&ctx, &RECORD_ROLES)?;

    if let Some(subject) = helpers::optional_str(&req.params, "subject") {
        conn.execute(
            "UPDATE attendance_records SET subject = ? WHERE id = ?",
            (&subject, &attendance_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "attendance_records"))?;
    }
    if let Some(teacher_ident) = helpers::optional_str(&req.params, "teacherId") {
        let teacher: Option<String> = conn
            .query_row(
                "SELECT id FROM user_profiles WHERE school_id = ? AND (id = ? OR user_id = ?)",
                (&school_id, &teacher_ident, &teacher_ident),
                |r| r.get(0),
            )
            .optional()?;
        if let Some(teacher_id) = teacher {
            conn.execute(
                "UPDATE attendance_records SET teacher_profile_id = ? WHERE id = ?",
                (&teacher_id, &attendance_id),
            )
            .map_err(|e| db_write("db_update_failed", e, "attendance_records"))?;
        }
    }
    if let Some(status) = helpers::optional_str(&req.params, "status") {
        helpers::validate_choice(&status, &ATTENDANCE_STATUSES, "status")?;
        conn.execute(
            "UPDATE attendance_records SET status = ? WHERE id = ?",
            (&status, &attendance_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "attendance_records"))?;
    }
    if req.params.get("date").is_some() {
        let date = helpers::required_date_param(&req.params, "date")?;
        conn.execute(
            "UPDATE attendance_records SET date = ? WHERE id = ?",
            (&date, &attendance_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "attendance_records"))?;
    }

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "attendance_updated",
        &attendance_id,
    );
    let record = load_attendance(conn, &school_id, &attendance_id)?;
    Ok(json!({ "data": attendance_json(conn, &record)? }))
}

fn attendance_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let attendance_id = helpers::required_str(&req.params, "attendanceId")?;
    load_attendance(conn, &school_id, &attendance_id)?;
    helpers::require_roles(&ctx, &RECORD_ROLES)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_write("db_tx_failed", e, "attendance_records"))?;
    if let Err(e) = tx.execute(
        "DELETE FROM absence_justifications WHERE attendance_id = ?",
        [&attendance_id],
    ) {
        return Err(db_write("db_delete_failed", e, "absence_justifications"));
    }
    if let Err(e) = tx.execute(
        "DELETE FROM attendance_records WHERE id = ?",
        [&attendance_id],
    ) {
        return Err(db_write("db_delete_failed", e, "attendance_records"));
    }
    tx.commit()
        .map_err(|e| db_write("db_commit_failed", e, "attendance_records"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "attendance_deleted",
        &attendance_id,
    );
    Ok(json!({ "success": true }))
}

/// Keep the attendance status in step with the justification decision.
fn apply_justification_status(
    conn: &Connection,
    attendance_id: &str,
    status: &str,
) -> Result<(), HandlerErr> {
    let new_status = match status {
        "approved" => Some("excused"),
        "rejected" => Some("absent"),
        _ => None,
    };
    if let Some(new_status) = new_status {
        conn.execute(
            "UPDATE attendance_records SET status = ? WHERE id = ?",
            (new_status, attendance_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "attendance_records"))?;
    }
    Ok(())
}

fn justifications_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE s.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(student_id) = helpers::optional_str(&req.params, "studentId") {
        where_sql.push_str(" AND a.student_id = ?");
        binds.push(SqlValue::Text(student_id));
    }
    if let Some(classroom_id) = helpers::optional_str(&req.params, "classroomId") {
        where_sql.push_str(" AND a.classroom_id = ?");
        binds.push(SqlValue::Text(classroom_id));
    }
    if let Some(status) = helpers::optional_str(&req.params, "status") {
        where_sql.push_str(" AND j.status = ?");
        binds.push(SqlValue::Text(status));
    }
    if let Some(date) = helpers::optional_str(&req.params, "date") {
        where_sql.push_str(" AND a.date = ?");
        binds.push(SqlValue::Text(date));
    }

    let (page, page_size) = helpers::page_params(&req.params);
    let from = "FROM absence_justifications j
         JOIN attendance_records a ON a.id = j.attendance_id
         JOIN students s ON s.id = a.student_id";
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {} {}", from, where_sql),
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
        "SELECT {} {} {} ORDER BY j.created_at DESC LIMIT ? OFFSET ?",
        JUSTIFICATION_COLS, from, where_sql
    );
    binds.push(SqlValue::Integer(page_size));
    binds.push(SqlValue::Integer(offset));
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), justification_record)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut data = Vec::with_capacity(records.len());
    for record in &records {
        data.push(justification_json(conn, record)?);
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

fn justifications_upsert(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &RECORD_ROLES)?;

    let attendance_id = helpers::required_str(&req.params, "attendanceId")?;
    let reason = helpers::required_trimmed(&req.params, "reason")?;
    let status =
        helpers::optional_str(&req.params, "status").unwrap_or_else(|| "approved".into());
    helpers::validate_choice(&status, &JUSTIFICATION_STATUSES, "status")?;
    load_attendance(conn, &school_id, &attendance_id)?;

    let observation = helpers::optional_str(&req.params, "observation").unwrap_or_default();
    let created = conn
        .query_row(
            "SELECT 1 FROM absence_justifications WHERE attendance_id = ?",
            [&attendance_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_none();

    let now = helpers::now_iso();
    conn.execute(
        "INSERT INTO absence_justifications(id, attendance_id, reason, observation, status, created_by, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(attendance_id) DO UPDATE SET
           reason = excluded.reason,
           observation = excluded.observation,
           status = excluded.status,
           created_by = excluded.created_by,
           updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            &attendance_id,
            &reason,
            &observation,
            &status,
            ctx.profile_id(),
            &now,
            &now,
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "absence_justifications"))?;

    if status == "approved" || status == "rejected" {
        conn.execute(
            "UPDATE absence_justifications SET decided_by = ?, decided_at = ? WHERE attendance_id = ?",
            (ctx.profile_id(), &now, &attendance_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "absence_justifications"))?;
    }
    apply_justification_status(conn, &attendance_id, &status)?;

    let sql = format!(
        "SELECT {} FROM absence_justifications j WHERE j.attendance_id = ?",
        JUSTIFICATION_COLS
    );
    let record = conn.query_row(&sql, [&attendance_id], justification_record)?;
    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        if created {
            "absence_justification_created"
        } else {
            "absence_justification_updated"
        },
        &record.id,
    );
    Ok(json!({ "data": justification_json(conn, &record)? }))
}

fn load_justification(
    conn: &Connection,
    school_id: &str,
    justification_id: &str,
) -> Result<JustificationRecord, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM absence_justifications j
         JOIN attendance_records a ON a.id = j.attendance_id
         JOIN students s ON s.id = a.student_id
         WHERE j.id = ? AND s.school_id = ?",
        JUSTIFICATION_COLS
    );
    conn.query_row(&sql, (justification_id, school_id), justification_record)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("justification not found"))
}

fn justifications_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let justification_id = helpers::required_str(&req.params, "justificationId")?;
    let record = load_justification(conn, &school_id, &justification_id)?;
    helpers::require_roles(&ctx, &RECORD_ROLES)?;

    if let Some(reason) = helpers::optional_str(&req.params, "reason") {
        conn.execute(
            "UPDATE absence_justifications SET reason = ? WHERE id = ?",
            (&reason, &justification_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "absence_justifications"))?;
    }
    if let Some(observation) = helpers::optional_str(&req.params, "observation") {
        conn.execute(
            "UPDATE absence_justifications SET observation = ? WHERE id = ?",
            (&observation, &justification_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "absence_justifications"))?;
    }
    if let Some(status) = helpers::optional_str(&req.params, "status") {
        helpers::validate_choice(&status, &JUSTIFICATION_STATUSES, "status")?;
        let now = helpers::now_iso();
        if status == "approved" || status == "rejected" {
            conn.execute(
                "UPDATE absence_justifications SET status = ?, decided_by = ?, decided_at = ? WHERE id = ?",
                (&status, ctx.profile_id(), &now, &justification_id),
            )
            .map_err(|e| db_write("db_update_failed", e, "absence_justifications"))?;
        } else {
            conn.execute(
                "UPDATE absence_justifications SET status = ?, decided_by = NULL, decided_at = NULL WHERE id = ?",
                (&status, &justification_id),
            )
            .map_err(|e| db_write("db_update_failed", e, "absence_justifications"))?;
        }
        apply_justification_status(conn, &record.attendance_id, &status)?;
    }
    conn.execute(
        "UPDATE absence_justifications SET updated_at = ? WHERE id = ?",
        (helpers::now_iso(), &justification_id),
    )
    .map_err(|e| db_write("db_update_failed", e, "absence_justifications"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "absence_justification_updated",
        &justification_id,
    );
    let record = load_justification(conn, &school_id, &justification_id)?;
    Ok(json!({ "data": justification_json(conn, &record)? }))
}

fn justifications_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let justification_id = helpers::required_str(&req.params, "justificationId")?;
    let record = load_justification(conn, &school_id, &justification_id)?;
    helpers::require_roles(&ctx, &RECORD_ROLES)?;

    let was_approved = record.status == "approved";
    conn.execute(
        "DELETE FROM absence_justifications WHERE id = ?",
        [&justification_id],
    )
    .map_err(|e| db_write("db_delete_failed", e, "absence_justifications"))?;

    // Removing an approved justification withdraws the excuse.
    if was_approved {
        conn.execute(
            "UPDATE attendance_records SET status = 'absent' WHERE id = ? AND status = 'excused'",
            [&record.attendance_id],
        )
        .map_err(|e| db_write("db_update_failed", e, "attendance_records"))?;
    }

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "absence_justification_deleted",
        &justification_id,
    );
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.list" => Some(helpers::run(state, req, |conn| attendance_list(conn, req))),
        "attendance.upsert" => Some(helpers::run(state, req, |conn| attendance_upsert(conn, req))),
        "attendance.update" => Some(helpers::run(state, req, |conn| attendance_update(conn, req))),
        "attendance.delete" => Some(helpers::run(state, req, |conn| attendance_delete(conn, req))),
        "justifications.list" => {
            Some(helpers::run(state, req, |conn| justifications_list(conn, req)))
        }
        "justifications.upsert" => {
            Some(helpers::run(state, req, |conn| justifications_upsert(conn, req)))
        }
        "justifications.update" => {
            Some(helpers::run(state, req, |conn| justifications_update(conn, req)))
        }
        "justifications.delete" => {
            Some(helpers::run(state, req, |conn| justifications_delete(conn, req)))
        }
        _ => None,
    }
}
