use crate::grading::{self, GradingPolicy};
use crate::ipc::handlers::classrooms::classroom_in_school;
use crate::ipc::handlers::students::student_in_school;
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const SYSTEMS: [&str; 2] = [grading::SYSTEM_BIMESTRAL, grading::SYSTEM_TRIMESTRAL];
const METHODS: [&str; 2] = [grading::METHOD_ARITHMETIC, grading::METHOD_WEIGHTED];

const GRADE_ROLES: [&str; 4] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::TEACHER,
];

fn grade_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "classroomId": r.get::<_, String>(2)?,
        "subject": r.get::<_, String>(3)?,
        "term": r.get::<_, String>(4)?,
        "date": r.get::<_, Option<String>>(5)?,
        "grade1": r.get::<_, Option<f64>>(6)?,
        "grade2": r.get::<_, Option<f64>>(7)?,
        "recoveryGrade": r.get::<_, Option<f64>>(8)?,
        "average": r.get::<_, Option<f64>>(9)?,
        "finalGrade": r.get::<_, Option<f64>>(10)?,
        "createdAt": r.get::<_, String>(11)?,
    }))
}

const GRADE_COLS: &str = "g.id, g.student_id, g.classroom_id, g.subject, g.term, g.date,
             g.grade1, g.grade2, g.recovery_grade, g.average, g.final_grade, g.created_at";

fn load_grade(
    conn: &Connection,
    school_id: &str,
    grade_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM grade_records g
         JOIN students s ON s.id = g.student_id
         WHERE g.id = ? AND s.school_id = ?",
        GRADE_COLS
    );
    conn.query_row(&sql, (grade_id, school_id), grade_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("grade record not found"))
}

fn grades_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE s.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(classroom_id) = helpers::optional_str(&req.params, "classroomId") {
        where_sql.push_str(" AND g.classroom_id = ?");
        binds.push(SqlValue::Text(classroom_id));
    }
    if let Some(student_id) = helpers::optional_str(&req.params, "studentId") {
        where_sql.push_str(" AND g.student_id = ?");
        binds.push(SqlValue::Text(student_id));
    }
    if let Some(subject) = helpers::optional_str(&req.params, "subject") {
        where_sql.push_str(" AND g.subject LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&subject)));
    }
    if let Some(term) = helpers::optional_str(&req.params, "term") {
        where_sql.push_str(" AND g.term = ?");
        binds.push(SqlValue::Text(term));
    }

    let from = "FROM grade_records g JOIN students s ON s.id = g.student_id";
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", from, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY g.created_at DESC",
            GRADE_COLS, from, where_sql
        ),
        &binds,
        grade_row,
    )
}

fn grades_upsert(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &GRADE_ROLES)?;

    let student_id = helpers::required_str(&req.params, "studentId")?;
    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    let subject = helpers::required_trimmed(&req.params, "subject")?;

    if !student_in_school(conn, &school_id, &student_id)?
        || !classroom_in_school(conn, &school_id, &classroom_id)?
    {
        return Err(HandlerErr::not_found("student or classroom not found"));
    }

    let grade1 = helpers::optional_grade_param(&req.params, "grade1")?;
    let grade2 = helpers::optional_grade_param(&req.params, "grade2")?;
    let recovery_grade = helpers::optional_grade_param(&req.params, "recoveryGrade")?;

    let policy = GradingPolicy::load(conn, &school_id)?;
    let date = helpers::optional_date_param(&req.params, "date")?
        .unwrap_or_else(|| helpers::today().format("%Y-%m-%d").to_string());
    let parsed_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_field("invalid date", "date"))?;
    let term = helpers::optional_str(&req.params, "term")
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| grading::term_for_date(&policy.system, parsed_date).to_string());
    let (average, final_grade) = grading::compute_final(&policy, grade1, grade2, recovery_grade);

    conn.execute(
        "INSERT INTO grade_records(id, student_id, classroom_id, subject, term, date,
            grade1, grade2, recovery_grade, average, final_grade, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, classroom_id, subject, term) DO UPDATE SET
           date = excluded.date,
           grade1 = excluded.grade1,
           grade2 = excluded.grade2,
           recovery_grade = excluded.recovery_grade,
           average = excluded.average,
           final_grade = excluded.final_grade",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            &student_id,
            &classroom_id,
            &subject,
            &term,
            &date,
            grade1,
            grade2,
            recovery_grade,
            average,
            final_grade,
            helpers::now_iso(),
        ],
    )
    .map_err(|e| db_write("db_insert_failed", e, "grade_records"))?;

    let grade_id: String = conn.query_row(
        "SELECT id FROM grade_records
         WHERE student_id = ? AND classroom_id = ? AND subject = ? AND term = ?",
        (&student_id, &classroom_id, &subject, &term),
        |r| r.get(0),
    )?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "grade_upserted", &grade_id);
    let grade = load_grade(conn, &school_id, &grade_id)?;
    Ok(json!({ "data": grade }))
}

fn grades_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let grade_id = helpers::required_str(&req.params, "gradeId")?;
    let existing = load_grade(conn, &school_id, &grade_id)?;
    helpers::require_roles(&ctx, &GRADE_ROLES)?;

    let mut grade1 = existing.get("grade1").and_then(|v| v.as_f64());
    let mut grade2 = existing.get("grade2").and_then(|v| v.as_f64());
    let mut recovery = existing.get("recoveryGrade").and_then(|v| v.as_f64());
    let mut subject = existing
        .get("subject")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let mut term = existing
        .get("term")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let mut date = existing
        .get("date")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    if req.params.get("grade1").is_some() {
        grade1 = helpers::optional_grade_param(&req.params, "grade1")?;
    }
    if req.params.get("grade2").is_some() {
        grade2 = helpers::optional_grade_param(&req.params, "grade2")?;
    }
    if req.params.get("recoveryGrade").is_some() {
        recovery = helpers::optional_grade_param(&req.params, "recoveryGrade")?;
    }
    if let Some(new_subject) = helpers::optional_str(&req.params, "subject") {
        subject = new_subject;
    }
    if let Some(new_term) = helpers::optional_str(&req.params, "term") {
        term = new_term;
    }
    if req.params.get("date").is_some() {
        date = helpers::optional_date_param(&req.params, "date")?;
    }

    // Derived columns are recomputed from the current config on every write.
    let policy = GradingPolicy::load(conn, &school_id)?;
    let (average, final_grade) = grading::compute_final(&policy, grade1, grade2, recovery);
    if term.trim().is_empty() {
        if let Some(date) = date.as_deref() {
            if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                term = grading::term_for_date(&policy.system, parsed).to_string();
            }
        }
    }

    conn.execute(
        "UPDATE grade_records
         SET subject = ?, term = ?, date = ?, grade1 = ?, grade2 = ?, recovery_grade = ?,
             average = ?, final_grade = ?
         WHERE id = ?",
        rusqlite::params![
            &subject,
            &term,
            date.as_deref(),
            grade1,
            grade2,
            recovery,
            average,
            final_grade,
            &grade_id,
        ],
    )
    .map_err(|e| db_write("db_update_failed", e, "grade_records"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "grade_updated", &grade_id);
    let grade = load_grade(conn, &school_id, &grade_id)?;
    Ok(json!({ "data": grade }))
}

fn grades_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let grade_id = helpers::required_str(&req.params, "gradeId")?;
    load_grade(conn, &school_id, &grade_id)?;
    helpers::require_roles(&ctx, &GRADE_ROLES)?;

    conn.execute("DELETE FROM grade_records WHERE id = ?", [&grade_id])
        .map_err(|e| db_write("db_delete_failed", e, "grade_records"))?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "grade_deleted", &grade_id);
    Ok(json!({ "success": true }))
}

fn config_json(conn: &Connection, school_id: &str) -> Result<serde_json::Value, HandlerErr> {
    let row = conn.query_row(
        "SELECT system, calculation_method, min_passing_grade, weights, recovery_rule, updated_at
         FROM grading_configs WHERE school_id = ?",
        [school_id],
        |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, f64>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        },
    )?;
    let weights: serde_json::Value = serde_json::from_str(&row.3).unwrap_or_else(|_| json!({}));
    Ok(json!({
        "schoolId": school_id,
        "system": row.0,
        "calculationMethod": row.1,
        "minPassingGrade": format!("{:.2}", row.2),
        "weights": weights,
        "recoveryRule": row.4,
        "updatedAt": row.5,
    }))
}

fn ensure_config(conn: &Connection, school_id: &str) -> Result<(), HandlerErr> {
    conn.execute(
        "INSERT INTO grading_configs(school_id, system, calculation_method, min_passing_grade, weights, recovery_rule, updated_at)
         VALUES(?, 'bimestral', 'arithmetic', 6, ?, 'replace', ?)
         ON CONFLICT(school_id) DO NOTHING",
        (
            school_id,
            json!({ "exam": 50, "activities": 50, "participation": 0 }).to_string(),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "grading_configs"))?;
    Ok(())
}

fn grading_config_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    ensure_config(conn, &school_id)?;
    Ok(json!({ "data": config_json(conn, &school_id)? }))
}

fn grading_config_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    ensure_config(conn, &school_id)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR])?;

    if let Some(system) = helpers::optional_str(&req.params, "system") {
        helpers::validate_choice(&system, &SYSTEMS, "system")?;
        conn.execute(
            "UPDATE grading_configs SET system = ? WHERE school_id = ?",
            (&system, &school_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "grading_configs"))?;
    }
    if let Some(method) = helpers::optional_str(&req.params, "calculationMethod") {
        helpers::validate_choice(&method, &METHODS, "calculationMethod")?;
        conn.execute(
            "UPDATE grading_configs SET calculation_method = ? WHERE school_id = ?",
            (&method, &school_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "grading_configs"))?;
    }
    if req.params.get("minPassingGrade").is_some() {
        let min_grade = helpers::required_amount(&req.params, "minPassingGrade")?;
        conn.execute(
            "UPDATE grading_configs SET min_passing_grade = ? WHERE school_id = ?",
            (min_grade, &school_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "grading_configs"))?;
    }
    if let Some(weights) = req.params.get("weights") {
        if !weights.is_object() {
            return Err(HandlerErr::bad_params("invalid weights"));
        }
        conn.execute(
            "UPDATE grading_configs SET weights = ? WHERE school_id = ?",
            (weights.to_string(), &school_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "grading_configs"))?;
    }
    if let Some(rule) = helpers::optional_str(&req.params, "recoveryRule") {
        conn.execute(
            "UPDATE grading_configs SET recovery_rule = ? WHERE school_id = ?",
            (&rule, &school_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "grading_configs"))?;
    }
    conn.execute(
        "UPDATE grading_configs SET updated_at = ? WHERE school_id = ?",
        (helpers::now_iso(), &school_id),
    )
    .map_err(|e| db_write("db_update_failed", e, "grading_configs"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "grading_config_updated",
        &school_id,
    );
    Ok(json!({ "data": config_json(conn, &school_id)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.list" => Some(helpers::run(state, req, |conn| grades_list(conn, req))),
        "grades.upsert" => Some(helpers::run(state, req, |conn| grades_upsert(conn, req))),
        "grades.update" => Some(helpers::run(state, req, |conn| grades_update(conn, req))),
        "grades.delete" => Some(helpers::run(state, req, |conn| grades_delete(conn, req))),
        "gradingConfig.get" => Some(helpers::run(state, req, |conn| grading_config_get(conn, req))),
        "gradingConfig.update" => {
            Some(helpers::run(state, req, |conn| grading_config_update(conn, req)))
        }
        _ => None,
    }
}
