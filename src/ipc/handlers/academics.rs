use crate::ipc::handlers::classrooms::classroom_in_school;
use crate::ipc::handlers::uploads::uploads_for_entity;
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const EXAM_TYPES: [&str; 2] = ["Standard", "Adapted"];
const EXAM_STATUSES: [&str; 3] = ["Pending", "Approved", "ChangesRequested"];

const TEACHING_ROLES: [&str; 4] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::TEACHER,
];
const PLANNING_ROLES: [&str; 3] = [roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR];

fn diary_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "classroomId": r.get::<_, String>(1)?,
        "teacherId": r.get::<_, Option<String>>(2)?,
        "subject": r.get::<_, String>(3)?,
        "date": r.get::<_, String>(4)?,
        "topic": r.get::<_, String>(5)?,
        "description": r.get::<_, String>(6)?,
        "homework": r.get::<_, String>(7)?,
        "createdAt": r.get::<_, String>(8)?,
    }))
}

const DIARY_COLS: &str = "d.id, d.classroom_id, d.teacher_profile_id, d.subject, d.date, d.topic,
             d.description, d.homework, d.created_at";

fn load_diary(
    conn: &Connection,
    school_id: &str,
    diary_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM class_diary_entries d
         JOIN classrooms c ON c.id = d.classroom_id
         WHERE d.id = ? AND c.school_id = ?",
        DIARY_COLS
    );
    conn.query_row(&sql, (diary_id, school_id), diary_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("diary entry not found"))
}

fn diary_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE c.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(classroom_id) = helpers::optional_str(&req.params, "classroomId") {
        where_sql.push_str(" AND d.classroom_id = ?");
        binds.push(SqlValue::Text(classroom_id));
    }
    if let Some(subject) = helpers::optional_str(&req.params, "subject") {
        where_sql.push_str(" AND d.subject LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&subject)));
    }
    if let Some(date) = helpers::optional_str(&req.params, "date") {
        where_sql.push_str(" AND d.date = ?");
        binds.push(SqlValue::Text(date));
    }

    let from = "FROM class_diary_entries d JOIN classrooms c ON c.id = d.classroom_id";
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", from, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY d.date DESC",
            DIARY_COLS, from, where_sql
        ),
        &binds,
        diary_row,
    )
}

fn diary_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &TEACHING_ROLES)?;

    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    let subject = helpers::required_trimmed(&req.params, "subject")?;
    let topic = helpers::required_trimmed(&req.params, "topic")?;
    let date = helpers::required_date_param(&req.params, "date")?;
    if !classroom_in_school(conn, &school_id, &classroom_id)? {
        return Err(HandlerErr::not_found("classroom not found"));
    }

    let diary_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO class_diary_entries(id, classroom_id, teacher_profile_id, subject, date, topic, description, homework, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &diary_id,
            &classroom_id,
            ctx.profile_id(),
            &subject,
            &date,
            &topic,
            helpers::optional_str(&req.params, "description").unwrap_or_default(),
            helpers::optional_str(&req.params, "homework").unwrap_or_default(),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "class_diary_entries"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "diary_created", &diary_id);
    let entry = load_diary(conn, &school_id, &diary_id)?;
    Ok(json!({ "data": entry }))
}

fn diary_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let diary_id = helpers::required_str(&req.params, "diaryId")?;
    load_diary(conn, &school_id, &diary_id)?;
    helpers::require_roles(&ctx, &TEACHING_ROLES)?;

    for (key, column) in [
        ("subject", "subject"),
        ("topic", "topic"),
        ("description", "description"),
        ("homework", "homework"),
    ] {
        if let Some(value) = helpers::optional_str(&req.params, key) {
            let sql = format!("UPDATE class_diary_entries SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &diary_id))
                .map_err(|e| db_write("db_update_failed", e, "class_diary_entries"))?;
        }
    }
    if req.params.get("date").is_some() {
        let date = helpers::required_date_param(&req.params, "date")?;
        conn.execute(
            "UPDATE class_diary_entries SET date = ? WHERE id = ?",
            (&date, &diary_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "class_diary_entries"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "diary_updated", &diary_id);
    let entry = load_diary(conn, &school_id, &diary_id)?;
    Ok(json!({ "data": entry }))
}

fn diary_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let diary_id = helpers::required_str(&req.params, "diaryId")?;
    load_diary(conn, &school_id, &diary_id)?;
    helpers::require_roles(&ctx, &TEACHING_ROLES)?;

    conn.execute("DELETE FROM class_diary_entries WHERE id = ?", [&diary_id])
        .map_err(|e| db_write("db_delete_failed", e, "class_diary_entries"))?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "diary_deleted", &diary_id);
    Ok(json!({ "success": true }))
}

fn material_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "classroomId": r.get::<_, String>(1)?,
        "title": r.get::<_, String>(2)?,
        "type": r.get::<_, String>(3)?,
        "date": r.get::<_, String>(4)?,
        "size": r.get::<_, String>(5)?,
        "url": r.get::<_, String>(6)?,
        "createdAt": r.get::<_, String>(7)?,
    }))
}

const MATERIAL_COLS: &str =
    "m.id, m.classroom_id, m.title, m.material_type, m.date, m.size, m.url, m.created_at";

fn load_material(
    conn: &Connection,
    school_id: &str,
    material_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM learning_materials m
         JOIN classrooms c ON c.id = m.classroom_id
         WHERE m.id = ? AND c.school_id = ?",
        MATERIAL_COLS
    );
    conn.query_row(&sql, (material_id, school_id), material_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("material not found"))
}

fn materials_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE c.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(classroom_id) = helpers::optional_str(&req.params, "classroomId") {
        where_sql.push_str(" AND m.classroom_id = ?");
        binds.push(SqlValue::Text(classroom_id));
    }
    if let Some(kind) = helpers::optional_str(&req.params, "type") {
        where_sql.push_str(" AND m.material_type LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&kind)));
    }
    if let Some(title) = helpers::optional_str(&req.params, "title") {
        where_sql.push_str(" AND m.title LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&title)));
    }

    let from = "FROM learning_materials m JOIN classrooms c ON c.id = m.classroom_id";
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", from, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY m.date DESC",
            MATERIAL_COLS, from, where_sql
        ),
        &binds,
        material_row,
    )
}

fn materials_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &TEACHING_ROLES)?;

    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    let title = helpers::required_trimmed(&req.params, "title")?;
    let date = helpers::required_date_param(&req.params, "date")?;
    if !classroom_in_school(conn, &school_id, &classroom_id)? {
        return Err(HandlerErr::not_found("classroom not found"));
    }

    let material_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO learning_materials(id, classroom_id, title, material_type, date, size, url, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &material_id,
            &classroom_id,
            &title,
            helpers::optional_str(&req.params, "type").unwrap_or_default(),
            &date,
            helpers::optional_str(&req.params, "size").unwrap_or_default(),
            helpers::optional_str(&req.params, "url").unwrap_or_default(),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "learning_materials"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "material_created", &material_id);
    let material = load_material(conn, &school_id, &material_id)?;
    Ok(json!({ "data": material }))
}

fn materials_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let material_id = helpers::required_str(&req.params, "materialId")?;
    load_material(conn, &school_id, &material_id)?;
    helpers::require_roles(&ctx, &TEACHING_ROLES)?;

    for (key, column) in [
        ("title", "title"),
        ("type", "material_type"),
        ("size", "size"),
        ("url", "url"),
    ] {
        if let Some(value) = helpers::optional_str(&req.params, key) {
            let sql = format!("UPDATE learning_materials SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &material_id))
                .map_err(|e| db_write("db_update_failed", e, "learning_materials"))?;
        }
    }
    if req.params.get("date").is_some() {
        let date = helpers::required_date_param(&req.params, "date")?;
        conn.execute(
            "UPDATE learning_materials SET date = ? WHERE id = ?",
            (&date, &material_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "learning_materials"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "material_updated", &material_id);
    let material = load_material(conn, &school_id, &material_id)?;
    Ok(json!({ "data": material }))
}

fn materials_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let material_id = helpers::required_str(&req.params, "materialId")?;
    load_material(conn, &school_id, &material_id)?;
    helpers::require_roles(&ctx, &TEACHING_ROLES)?;

    conn.execute("DELETE FROM learning_materials WHERE id = ?", [&material_id])
        .map_err(|e| db_write("db_delete_failed", e, "learning_materials"))?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "material_deleted", &material_id);
    Ok(json!({ "success": true }))
}

fn syllabus_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let objectives: String = r.get(5)?;
    let objectives: serde_json::Value =
        serde_json::from_str(&objectives).unwrap_or_else(|_| json!([]));
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "schoolId": r.get::<_, String>(1)?,
        "subject": r.get::<_, String>(2)?,
        "gradeLevel": r.get::<_, String>(3)?,
        "description": r.get::<_, String>(4)?,
        "objectives": objectives,
        "bibliography": r.get::<_, String>(6)?,
        "createdAt": r.get::<_, String>(7)?,
    }))
}

const SYLLABUS_COLS: &str =
    "id, school_id, subject, grade_level, description, objectives, bibliography, created_at";

fn load_syllabus(
    conn: &Connection,
    school_id: &str,
    syllabus_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM syllabi WHERE id = ? AND school_id = ?",
        SYLLABUS_COLS
    );
    conn.query_row(&sql, (syllabus_id, school_id), syllabus_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("syllabus not found"))
}

fn syllabi_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(subject) = helpers::optional_str(&req.params, "subject") {
        where_sql.push_str(" AND subject LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&subject)));
    }
    if let Some(grade_level) = helpers::optional_str(&req.params, "gradeLevel") {
        where_sql.push_str(" AND grade_level LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&grade_level)));
    }

    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) FROM syllabi {}", where_sql),
        &format!(
            "SELECT {} FROM syllabi {} ORDER BY subject",
            SYLLABUS_COLS, where_sql
        ),
        &binds,
        syllabus_row,
    )
}

fn syllabi_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &PLANNING_ROLES)?;

    let subject = helpers::required_trimmed(&req.params, "subject")?;
    let objectives = match req.params.get("objectives") {
        None | Some(serde_json::Value::Null) => json!([]),
        Some(v) if v.is_array() => v.clone(),
        Some(_) => return Err(HandlerErr::bad_params("invalid objectives")),
    };

    let syllabus_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO syllabi(id, school_id, subject, grade_level, description, objectives, bibliography, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &syllabus_id,
            &school_id,
            &subject,
            helpers::optional_str(&req.params, "gradeLevel").unwrap_or_default(),
            helpers::optional_str(&req.params, "description").unwrap_or_default(),
            objectives.to_string(),
            helpers::optional_str(&req.params, "bibliography").unwrap_or_default(),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "syllabi"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "syllabus_created", &subject);
    let syllabus = load_syllabus(conn, &school_id, &syllabus_id)?;
    Ok(json!({ "data": syllabus }))
}

fn syllabi_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let syllabus_id = helpers::required_str(&req.params, "syllabusId")?;
    load_syllabus(conn, &school_id, &syllabus_id)?;
    helpers::require_roles(&ctx, &PLANNING_ROLES)?;

    for (key, column) in [
        ("subject", "subject"),
        ("gradeLevel", "grade_level"),
        ("description", "description"),
        ("bibliography", "bibliography"),
    ] {
        if let Some(value) = helpers::optional_str(&req.params, key) {
            let sql = format!("UPDATE syllabi SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &syllabus_id))
                .map_err(|e| db_write("db_update_failed", e, "syllabi"))?;
        }
    }
    if let Some(objectives) = req.params.get("objectives") {
        if !objectives.is_array() {
            return Err(HandlerErr::bad_params("invalid objectives"));
        }
        conn.execute(
            "UPDATE syllabi SET objectives = ? WHERE id = ?",
            (objectives.to_string(), &syllabus_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "syllabi"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "syllabus_updated", &syllabus_id);
    let syllabus = load_syllabus(conn, &school_id, &syllabus_id)?;
    Ok(json!({ "data": syllabus }))
}

fn syllabi_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let syllabus_id = helpers::required_str(&req.params, "syllabusId")?;
    load_syllabus(conn, &school_id, &syllabus_id)?;
    helpers::require_roles(&ctx, &PLANNING_ROLES)?;

    conn.execute("DELETE FROM syllabi WHERE id = ?", [&syllabus_id])
        .map_err(|e| db_write("db_delete_failed", e, "syllabi"))?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "syllabus_deleted", &syllabus_id);
    Ok(json!({ "success": true }))
}

fn target_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "schoolId": r.get::<_, String>(1)?,
        "month": r.get::<_, String>(2)?,
        "requiredClasses": r.get::<_, i64>(3)?,
        "gradeSubmissionDeadline": r.get::<_, String>(4)?,
        "examSubmissionDeadline": r.get::<_, String>(5)?,
        "createdAt": r.get::<_, String>(6)?,
    }))
}

const TARGET_COLS: &str = "id, school_id, month_label, required_classes,
             grade_submission_deadline, exam_submission_deadline, created_at";

fn load_target(
    conn: &Connection,
    school_id: &str,
    target_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM academic_targets WHERE id = ? AND school_id = ?",
        TARGET_COLS
    );
    conn.query_row(&sql, (target_id, school_id), target_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("academic target not found"))
}

fn targets_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    helpers::paged(
        conn,
        &req.params,
        "SELECT COUNT(*) FROM academic_targets WHERE school_id = ?",
        &format!(
            "SELECT {} FROM academic_targets WHERE school_id = ?
             ORDER BY grade_submission_deadline DESC, exam_submission_deadline DESC",
            TARGET_COLS
        ),
        &binds,
        target_row,
    )
}

fn targets_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &PLANNING_ROLES)?;

    let month = helpers::required_trimmed(&req.params, "month")?;
    let required_classes = helpers::optional_i64(&req.params, "requiredClasses")
        .ok_or_else(|| HandlerErr::bad_params("missing requiredClasses"))?;
    let grade_deadline = helpers::required_date_param(&req.params, "gradeSubmissionDeadline")?;
    let exam_deadline = helpers::required_date_param(&req.params, "examSubmissionDeadline")?;

    let target_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO academic_targets(id, school_id, month_label, required_classes, grade_submission_deadline, exam_submission_deadline, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &target_id,
            &school_id,
            &month,
            required_classes,
            &grade_deadline,
            &exam_deadline,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "academic_targets"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "academic_target_created", &target_id);
    let target = load_target(conn, &school_id, &target_id)?;
    Ok(json!({ "data": target }))
}

fn targets_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let target_id = helpers::required_str(&req.params, "targetId")?;
    load_target(conn, &school_id, &target_id)?;
    helpers::require_roles(&ctx, &PLANNING_ROLES)?;

    if let Some(month) = helpers::optional_str(&req.params, "month") {
        conn.execute(
            "UPDATE academic_targets SET month_label = ? WHERE id = ?",
            (&month, &target_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "academic_targets"))?;
    }
    if let Some(required) = helpers::optional_i64(&req.params, "requiredClasses") {
        conn.execute(
            "UPDATE academic_targets SET required_classes = ? WHERE id = ?",
            (required, &target_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "academic_targets"))?;
    }
    if req.params.get("gradeSubmissionDeadline").is_some() {
        let deadline = helpers::required_date_param(&req.params, "gradeSubmissionDeadline")?;
        conn.execute(
            "UPDATE academic_targets SET grade_submission_deadline = ? WHERE id = ?",
            (&deadline, &target_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "academic_targets"))?;
    }
    if req.params.get("examSubmissionDeadline").is_some() {
        let deadline = helpers::required_date_param(&req.params, "examSubmissionDeadline")?;
        conn.execute(
            "UPDATE academic_targets SET exam_submission_deadline = ? WHERE id = ?",
            (&deadline, &target_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "academic_targets"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "academic_target_updated", &target_id);
    let target = load_target(conn, &school_id, &target_id)?;
    Ok(json!({ "data": target }))
}

fn targets_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let target_id = helpers::required_str(&req.params, "targetId")?;
    load_target(conn, &school_id, &target_id)?;
    helpers::require_roles(&ctx, &PLANNING_ROLES)?;

    conn.execute("DELETE FROM academic_targets WHERE id = ?", [&target_id])
        .map_err(|e| db_write("db_delete_failed", e, "academic_targets"))?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "academic_target_deleted", &target_id);
    Ok(json!({ "success": true }))
}

struct ExamRecord {
    id: String,
    school_id: String,
    title: String,
    subject: String,
    grade_level: String,
    exam_type: String,
    status: String,
    student_name: String,
    feedback: String,
    scheduled_date: Option<String>,
    submitted_by: Option<String>,
    submitted_at: String,
    decided_at: Option<String>,
}

const EXAM_COLS: &str = "e.id, e.school_id, e.title, e.subject, e.grade_level, e.exam_type,
             e.status, e.student_name, e.feedback, e.scheduled_date, e.submitted_by,
             e.submitted_at, e.decided_at";

fn exam_record(r: &Row<'_>) -> rusqlite::Result<ExamRecord> {
    Ok(ExamRecord {
        id: r.get(0)?,
        school_id: r.get(1)?,
        title: r.get(2)?,
        subject: r.get(3)?,
        grade_level: r.get(4)?,
        exam_type: r.get(5)?,
        status: r.get(6)?,
        student_name: r.get(7)?,
        feedback: r.get(8)?,
        scheduled_date: r.get(9)?,
        submitted_by: r.get(10)?,
        submitted_at: r.get(11)?,
        decided_at: r.get(12)?,
    })
}

fn exam_json(conn: &Connection, record: &ExamRecord) -> Result<serde_json::Value, HandlerErr> {
    let submitted_date = record
        .submitted_at
        .split('T')
        .next()
        .unwrap_or(&record.submitted_at)
        .to_string();
    let student_name = if record.student_name.is_empty() {
        serde_json::Value::Null
    } else {
        json!(record.student_name)
    };
    let feedback = if record.feedback.is_empty() {
        serde_json::Value::Null
    } else {
        json!(record.feedback)
    };
    Ok(json!({
        "id": record.id,
        "schoolId": record.school_id,
        "title": record.title,
        "subject": record.subject,
        "gradeLevel": record.grade_level,
        "type": record.exam_type,
        "status": record.status,
        "submittedDate": submitted_date,
        "scheduledDate": record.scheduled_date,
        "teacherName": helpers::profile_name(conn, record.submitted_by.as_deref())?,
        "studentName": student_name,
        "feedback": feedback,
        "decidedAt": record.decided_at,
        "attachments": uploads_for_entity(conn, &record.school_id, "exam", &record.id)?,
    }))
}

fn load_exam(
    conn: &Connection,
    school_id: &str,
    exam_id: &str,
) -> Result<ExamRecord, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM exam_submissions e WHERE e.id = ? AND e.school_id = ?",
        EXAM_COLS
    );
    conn.query_row(&sql, (exam_id, school_id), exam_record)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("exam submission not found"))
}

fn exams_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE e.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(status) = helpers::optional_str(&req.params, "status") {
        where_sql.push_str(" AND e.status = ?");
        binds.push(SqlValue::Text(status));
    }
    if let Some(kind) = helpers::optional_str(&req.params, "type") {
        where_sql.push_str(" AND e.exam_type = ?");
        binds.push(SqlValue::Text(kind));
    }
    if let Some(teacher_id) = helpers::optional_str(&req.params, "teacherId") {
        where_sql.push_str(
            " AND e.submitted_by IN (SELECT id FROM user_profiles WHERE id = ? OR user_id = ?)",
        );
        binds.push(SqlValue::Text(teacher_id.clone()));
        binds.push(SqlValue::Text(teacher_id));
    }
    if let Some(grade_level) = helpers::optional_str(&req.params, "gradeLevel") {
        where_sql.push_str(" AND e.grade_level = ?");
        binds.push(SqlValue::Text(grade_level));
    }
    if let Some(from) = helpers::optional_str(&req.params, "scheduledFrom") {
        where_sql.push_str(" AND e.scheduled_date >= ?");
        binds.push(SqlValue::Text(from));
    }
    if let Some(to) = helpers::optional_str(&req.params, "scheduledTo") {
        where_sql.push_str(" AND e.scheduled_date <= ?");
        binds.push(SqlValue::Text(to));
    }

    let (page, page_size) = helpers::page_params(&req.params);
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM exam_submissions e {}", where_sql),
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
        "SELECT {} FROM exam_submissions e {} ORDER BY e.submitted_at DESC LIMIT ? OFFSET ?",
        EXAM_COLS, where_sql
    );
    binds.push(SqlValue::Integer(page_size));
    binds.push(SqlValue::Integer(offset));
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), exam_record)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut data = Vec::with_capacity(records.len());
    for record in &records {
        data.push(exam_json(conn, record)?);
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

fn exams_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &TEACHING_ROLES)?;

    let title = helpers::required_trimmed(&req.params, "title")?;
    let subject = helpers::required_trimmed(&req.params, "subject")?;
    let exam_type =
        helpers::optional_str(&req.params, "type").unwrap_or_else(|| "Standard".into());
    helpers::validate_choice(&exam_type, &EXAM_TYPES, "type")?;
    let status = helpers::optional_str(&req.params, "status").unwrap_or_else(|| "Pending".into());
    helpers::validate_choice(&status, &EXAM_STATUSES, "status")?;
    let scheduled_date = helpers::optional_date_param(&req.params, "scheduledDate")?;

    let exam_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exam_submissions(id, school_id, title, subject, grade_level, exam_type, status, student_name, feedback, scheduled_date, submitted_by, submitted_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &exam_id,
            &school_id,
            &title,
            &subject,
            helpers::optional_str(&req.params, "gradeLevel").unwrap_or_default(),
            &exam_type,
            &status,
            helpers::optional_str(&req.params, "studentName").unwrap_or_default(),
            helpers::optional_str(&req.params, "feedback").unwrap_or_default(),
            scheduled_date.as_deref(),
            ctx.profile_id(),
            helpers::now_iso(),
        ],
    )
    .map_err(|e| db_write("db_insert_failed", e, "exam_submissions"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "exam_submission_created", &exam_id);
    let record = load_exam(conn, &school_id, &exam_id)?;
    Ok(json!({ "data": exam_json(conn, &record)? }))
}

fn exams_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let exam_id = helpers::required_str(&req.params, "examId")?;
    load_exam(conn, &school_id, &exam_id)?;
    helpers::require_roles(&ctx, &PLANNING_ROLES)?;

    for (key, column) in [
        ("title", "title"),
        ("subject", "subject"),
        ("gradeLevel", "grade_level"),
        ("studentName", "student_name"),
        ("feedback", "feedback"),
    ] {
        if let Some(value) = helpers::optional_str(&req.params, key) {
            let sql = format!("UPDATE exam_submissions SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &exam_id))
                .map_err(|e| db_write("db_update_failed", e, "exam_submissions"))?;
        }
    }
    if let Some(kind) = helpers::optional_str(&req.params, "type") {
        helpers::validate_choice(&kind, &EXAM_TYPES, "type")?;
        conn.execute(
            "UPDATE exam_submissions SET exam_type = ? WHERE id = ?",
            (&kind, &exam_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "exam_submissions"))?;
    }
    if let Some(status) = helpers::optional_str(&req.params, "status") {
        helpers::validate_choice(&status, &EXAM_STATUSES, "status")?;
        conn.execute(
            "UPDATE exam_submissions SET status = ? WHERE id = ?",
            (&status, &exam_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "exam_submissions"))?;
    }
    if req.params.get("scheduledDate").is_some() {
        let scheduled = helpers::optional_date_param(&req.params, "scheduledDate")?;
        conn.execute(
            "UPDATE exam_submissions SET scheduled_date = ? WHERE id = ?",
            (scheduled.as_deref(), &exam_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "exam_submissions"))?;
    }

    // A decision (status or feedback) stamps the reviewer.
    if req.params.get("status").is_some() || req.params.get("feedback").is_some() {
        conn.execute(
            "UPDATE exam_submissions SET decided_by = ?, decided_at = ? WHERE id = ?",
            (ctx.profile_id(), helpers::now_iso(), &exam_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "exam_submissions"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "exam_submission_updated", &exam_id);
    let record = load_exam(conn, &school_id, &exam_id)?;
    Ok(json!({ "data": exam_json(conn, &record)? }))
}

fn exams_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let exam_id = helpers::required_str(&req.params, "examId")?;
    load_exam(conn, &school_id, &exam_id)?;
    helpers::require_roles(&ctx, &PLANNING_ROLES)?;

    conn.execute("DELETE FROM exam_submissions WHERE id = ?", [&exam_id])
        .map_err(|e| db_write("db_delete_failed", e, "exam_submissions"))?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "exam_submission_deleted", &exam_id);
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "diary.list" => Some(helpers::run(state, req, |conn| diary_list(conn, req))),
        "diary.create" => Some(helpers::run(state, req, |conn| diary_create(conn, req))),
        "diary.update" => Some(helpers::run(state, req, |conn| diary_update(conn, req))),
        "diary.delete" => Some(helpers::run(state, req, |conn| diary_delete(conn, req))),
        "materials.list" => Some(helpers::run(state, req, |conn| materials_list(conn, req))),
        "materials.create" => Some(helpers::run(state, req, |conn| materials_create(conn, req))),
        "materials.update" => Some(helpers::run(state, req, |conn| materials_update(conn, req))),
        "materials.delete" => Some(helpers::run(state, req, |conn| materials_delete(conn, req))),
        "syllabi.list" => Some(helpers::run(state, req, |conn| syllabi_list(conn, req))),
        "syllabi.create" => Some(helpers::run(state, req, |conn| syllabi_create(conn, req))),
        "syllabi.update" => Some(helpers::run(state, req, |conn| syllabi_update(conn, req))),
        "syllabi.delete" => Some(helpers::run(state, req, |conn| syllabi_delete(conn, req))),
        "academicTargets.list" => Some(helpers::run(state, req, |conn| targets_list(conn, req))),
        "academicTargets.create" => {
            Some(helpers::run(state, req, |conn| targets_create(conn, req)))
        }
        "academicTargets.update" => {
            Some(helpers::run(state, req, |conn| targets_update(conn, req)))
        }
        "academicTargets.delete" => {
            Some(helpers::run(state, req, |conn| targets_delete(conn, req)))
        }
        "examSubmissions.list" => Some(helpers::run(state, req, |conn| exams_list(conn, req))),
        "examSubmissions.create" => Some(helpers::run(state, req, |conn| exams_create(conn, req))),
        "examSubmissions.update" => Some(helpers::run(state, req, |conn| exams_update(conn, req))),
        "examSubmissions.delete" => Some(helpers::run(state, req, |conn| exams_delete(conn, req))),
        _ => None,
    }
}
