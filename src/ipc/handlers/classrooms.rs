use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const SHIFTS: [&str; 3] = ["morning", "afternoon", "evening"];

const MUTATE_ROLES: [&str; 5] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::STAFF,
    roles::TEACHER,
];

fn classroom_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let grade: String = r.get(3)?;
    let year: i64 = r.get(4)?;
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "schoolId": r.get::<_, String>(1)?,
        "name": r.get::<_, String>(2)?,
        "grade": grade,
        "gradeLevel": grade,
        "year": year,
        "academicYear": year,
        "shift": r.get::<_, String>(5)?,
        "capacity": r.get::<_, i64>(6)?,
        "createdAt": r.get::<_, String>(7)?,
    }))
}

const CLASSROOM_COLS: &str = "id, school_id, name, grade, year, shift, capacity, created_at";

pub(crate) fn classroom_in_school(
    conn: &Connection,
    school_id: &str,
    classroom_id: &str,
) -> Result<bool, HandlerErr> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM classrooms WHERE id = ? AND school_id = ?",
            (classroom_id, school_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn load_classroom(
    conn: &Connection,
    school_id: &str,
    classroom_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM classrooms WHERE id = ? AND school_id = ?",
        CLASSROOM_COLS
    );
    conn.query_row(&sql, (classroom_id, school_id), classroom_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("classroom not found"))
}

fn parse_year(params: &serde_json::Value) -> Result<Option<i64>, HandlerErr> {
    let raw = params.get("year").or_else(|| params.get("academicYear"));
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let year = v
                .as_i64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| HandlerErr::bad_params("invalid year"))?;
            Ok(Some(year))
        }
    }
}

fn parse_capacity(params: &serde_json::Value) -> Result<Option<i64>, HandlerErr> {
    match params.get("capacity") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let capacity = v
                .as_i64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| HandlerErr::bad_params("invalid capacity"))?;
            if capacity <= 0 {
                return Err(HandlerErr::bad_params("invalid capacity"));
            }
            Ok(Some(capacity))
        }
    }
}

fn classrooms_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(year) = parse_year(&req.params)? {
        where_sql.push_str(" AND year = ?");
        binds.push(SqlValue::Integer(year));
    }
    if let Some(shift) = helpers::optional_str(&req.params, "shift") {
        where_sql.push_str(" AND shift = ?");
        binds.push(SqlValue::Text(shift));
    }
    if let Some(grade) = helpers::optional_str(&req.params, "grade") {
        where_sql.push_str(" AND grade LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&grade)));
    }
    if let Some(name) = helpers::optional_str(&req.params, "name") {
        where_sql.push_str(" AND name LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&name)));
    }

    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) FROM classrooms {}", where_sql),
        &format!(
            "SELECT {} FROM classrooms {} ORDER BY year DESC, name",
            CLASSROOM_COLS, where_sql
        ),
        &binds,
        classroom_row,
    )
}

fn classrooms_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let name = helpers::required_trimmed(&req.params, "name")?;
    let year = parse_year(&req.params)?.ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "missing required fields".to_string(),
        details: Some(json!({ "missing": ["name", "year"] })),
    })?;
    let shift = helpers::optional_str(&req.params, "shift");
    if let Some(shift) = shift.as_deref() {
        helpers::validate_choice(shift, &SHIFTS, "shift")?;
    }
    let capacity = parse_capacity(&req.params)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let grade = helpers::optional_str(&req.params, "grade")
        .or_else(|| helpers::optional_str(&req.params, "gradeLevel"))
        .unwrap_or_default();
    let classroom_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classrooms(id, school_id, name, grade, year, shift, capacity, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &classroom_id,
            &school_id,
            &name,
            &grade,
            year,
            shift.as_deref().unwrap_or("morning"),
            capacity.unwrap_or(30),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "classrooms"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "classroom_created", &classroom_id);
    let classroom = load_classroom(conn, &school_id, &classroom_id)?;
    Ok(json!({ "data": classroom }))
}

fn classrooms_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    let classroom = load_classroom(conn, &school_id, &classroom_id)?;
    Ok(json!({ "data": classroom }))
}

fn classrooms_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    load_classroom(conn, &school_id, &classroom_id)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    if let Some(shift) = helpers::optional_str(&req.params, "shift") {
        helpers::validate_choice(&shift, &SHIFTS, "shift")?;
        conn.execute(
            "UPDATE classrooms SET shift = ? WHERE id = ?",
            (&shift, &classroom_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "classrooms"))?;
    }
    if let Some(capacity) = parse_capacity(&req.params)? {
        conn.execute(
            "UPDATE classrooms SET capacity = ? WHERE id = ?",
            (capacity, &classroom_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "classrooms"))?;
    }
    if let Some(name) = helpers::optional_str(&req.params, "name") {
        conn.execute(
            "UPDATE classrooms SET name = ? WHERE id = ?",
            (&name, &classroom_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "classrooms"))?;
    }
    if req.params.get("grade").is_some() || req.params.get("gradeLevel").is_some() {
        let grade = helpers::optional_str(&req.params, "grade")
            .or_else(|| helpers::optional_str(&req.params, "gradeLevel"))
            .unwrap_or_default();
        conn.execute(
            "UPDATE classrooms SET grade = ? WHERE id = ?",
            (&grade, &classroom_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "classrooms"))?;
    }
    if let Some(year) = parse_year(&req.params)? {
        conn.execute(
            "UPDATE classrooms SET year = ? WHERE id = ?",
            (year, &classroom_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "classrooms"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "classroom_updated", &classroom_id);
    let classroom = load_classroom(conn, &school_id, &classroom_id)?;
    Ok(json!({ "data": classroom }))
}

fn classrooms_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    load_classroom(conn, &school_id, &classroom_id)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_write("db_tx_failed", e, "classrooms"))?;

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    for (sql, table) in [
        (
            "DELETE FROM absence_justifications
             WHERE attendance_id IN (SELECT id FROM attendance_records WHERE classroom_id = ?)",
            "absence_justifications",
        ),
        (
            "DELETE FROM attendance_records WHERE classroom_id = ?",
            "attendance_records",
        ),
        (
            "DELETE FROM grade_records WHERE classroom_id = ?",
            "grade_records",
        ),
        (
            "DELETE FROM class_diary_entries WHERE classroom_id = ?",
            "class_diary_entries",
        ),
        (
            "DELETE FROM learning_materials WHERE classroom_id = ?",
            "learning_materials",
        ),
        (
            "DELETE FROM class_schedule_entries WHERE classroom_id = ?",
            "class_schedule_entries",
        ),
        (
            "DELETE FROM classroom_teacher_allocations WHERE classroom_id = ?",
            "classroom_teacher_allocations",
        ),
        ("DELETE FROM enrollments WHERE classroom_id = ?", "enrollments"),
        ("DELETE FROM classrooms WHERE id = ?", "classrooms"),
    ] {
        if let Err(e) = tx.execute(sql, [&classroom_id]) {
            return Err(db_write("db_delete_failed", e, table));
        }
    }
    tx.commit()
        .map_err(|e| db_write("db_commit_failed", e, "classrooms"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "classroom_deleted", &classroom_id);
    Ok(json!({ "success": true }))
}

fn allocation_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "classroomId": r.get::<_, String>(1)?,
        "teacherId": r.get::<_, String>(2)?,
        "subject": r.get::<_, String>(3)?,
        "createdAt": r.get::<_, String>(4)?,
    }))
}

fn allocations_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    if !classroom_in_school(conn, &school_id, &classroom_id)? {
        return Err(HandlerErr::not_found("classroom not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT a.id, a.classroom_id, p.user_id, a.subject, a.created_at
         FROM classroom_teacher_allocations a
         JOIN user_profiles p ON p.id = a.teacher_profile_id
         WHERE a.classroom_id = ?
         ORDER BY a.subject",
    )?;
    let rows = stmt
        .query_map([&classroom_id], allocation_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "data": rows }))
}

fn allocations_set(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    if !classroom_in_school(conn, &school_id, &classroom_id)? {
        return Err(HandlerErr::not_found("classroom not found"));
    }
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let subject = helpers::required_trimmed(&req.params, "subject")?;
    let teacher_ident = helpers::required_str(&req.params, "teacherId")?;
    let teacher = helpers::find_teacher_profile(conn, &school_id, &teacher_ident)?
        .ok_or_else(|| HandlerErr::bad_params("invalid teacher"))?;

    conn.execute(
        "INSERT INTO classroom_teacher_allocations(id, classroom_id, teacher_profile_id, subject, created_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(classroom_id, teacher_profile_id, subject) DO NOTHING",
        (
            Uuid::new_v4().to_string(),
            &classroom_id,
            &teacher.id,
            &subject,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "classroom_teacher_allocations"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "allocation_set",
        &format!("classroom={} teacher={} subject={}", classroom_id, teacher.id, subject),
    );

    let allocation = conn.query_row(
        "SELECT a.id, a.classroom_id, p.user_id, a.subject, a.created_at
         FROM classroom_teacher_allocations a
         JOIN user_profiles p ON p.id = a.teacher_profile_id
         WHERE a.classroom_id = ? AND a.teacher_profile_id = ? AND a.subject = ?",
        (&classroom_id, &teacher.id, &subject),
        allocation_row,
    )?;
    Ok(json!({ "data": allocation }))
}

fn allocations_remove(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    if !classroom_in_school(conn, &school_id, &classroom_id)? {
        return Err(HandlerErr::not_found("classroom not found"));
    }
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let subject = helpers::required_trimmed(&req.params, "subject")?;
    let teacher_ident = helpers::required_str(&req.params, "teacherId")?;
    let teacher = helpers::find_teacher_profile(conn, &school_id, &teacher_ident)?
        .ok_or_else(|| HandlerErr::bad_params("invalid teacher"))?;

    conn.execute(
        "DELETE FROM classroom_teacher_allocations
         WHERE classroom_id = ? AND teacher_profile_id = ? AND subject = ?",
        (&classroom_id, &teacher.id, &subject),
    )
    .map_err(|e| db_write("db_delete_failed", e, "classroom_teacher_allocations"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "allocation_deleted",
        &format!("classroom={} teacher={} subject={}", classroom_id, teacher.id, subject),
    );
    Ok(json!({ "success": true }))
}

fn classroom_students_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    if !classroom_in_school(conn, &school_id, &classroom_id)? {
        return Err(HandlerErr::not_found("classroom not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT e.student_id
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.classroom_id = ? AND s.school_id = ?",
    )?;
    let ids = stmt
        .query_map((&classroom_id, &school_id), |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "data": ids }))
}

fn classroom_students_add(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    if !classroom_in_school(conn, &school_id, &classroom_id)? {
        return Err(HandlerErr::not_found("classroom not found"));
    }
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let student_id = helpers::required_str(&req.params, "studentId")?;
    let student_exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND school_id = ?",
            (&student_id, &school_id),
            |r| r.get(0),
        )
        .optional()?;
    if student_exists.is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }

    let start_date = helpers::optional_date_param(&req.params, "startDate")?
        .unwrap_or_else(|| helpers::today().format("%Y-%m-%d").to_string());

    let enrollment_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO enrollments(id, student_id, classroom_id, start_date, status, created_at)
         VALUES(?, ?, ?, ?, 'active', ?)",
        (
            &enrollment_id,
            &student_id,
            &classroom_id,
            &start_date,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "enrollments"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "classroom_student_added",
        &format!("classroom={} student={}", classroom_id, student_id),
    );
    let enrollment = conn.query_row(
        "SELECT id, student_id, classroom_id, start_date, end_date, status, created_at
         FROM enrollments WHERE id = ?",
        [&enrollment_id],
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "classroomId": r.get::<_, String>(2)?,
                "startDate": r.get::<_, String>(3)?,
                "endDate": r.get::<_, Option<String>>(4)?,
                "status": r.get::<_, String>(5)?,
                "createdAt": r.get::<_, String>(6)?,
            }))
        },
    )?;
    Ok(json!({ "data": enrollment }))
}

fn classroom_students_remove(
    conn: &Connection,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    if !classroom_in_school(conn, &school_id, &classroom_id)? {
        return Err(HandlerErr::not_found("classroom not found"));
    }
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let student_id = helpers::required_str(&req.params, "studentId")?;
    let student_exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND school_id = ?",
            (&student_id, &school_id),
            |r| r.get(0),
        )
        .optional()?;
    if student_exists.is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }

    conn.execute(
        "DELETE FROM enrollments WHERE student_id = ? AND classroom_id = ?",
        (&student_id, &classroom_id),
    )
    .map_err(|e| db_write("db_delete_failed", e, "enrollments"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "classroom_student_removed",
        &format!("classroom={} student={}", classroom_id, student_id),
    );
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classrooms.list" => Some(helpers::run(state, req, |conn| classrooms_list(conn, req))),
        "classrooms.create" => Some(helpers::run(state, req, |conn| classrooms_create(conn, req))),
        "classrooms.get" => Some(helpers::run(state, req, |conn| classrooms_get(conn, req))),
        "classrooms.update" => Some(helpers::run(state, req, |conn| classrooms_update(conn, req))),
        "classrooms.delete" => Some(helpers::run(state, req, |conn| classrooms_delete(conn, req))),
        "classrooms.allocations.list" => {
            Some(helpers::run(state, req, |conn| allocations_list(conn, req)))
        }
        "classrooms.allocations.set" => {
            Some(helpers::run(state, req, |conn| allocations_set(conn, req)))
        }
        "classrooms.allocations.remove" => {
            Some(helpers::run(state, req, |conn| allocations_remove(conn, req)))
        }
        "classrooms.students.list" => {
            Some(helpers::run(state, req, |conn| classroom_students_list(conn, req)))
        }
        "classrooms.students.add" => {
            Some(helpers::run(state, req, |conn| classroom_students_add(conn, req)))
        }
        "classrooms.students.remove" => {
            Some(helpers::run(state, req, |conn| classroom_students_remove(conn, req)))
        }
        _ => None,
    }
}
