use crate::ipc::handlers::auth::create_user;
use crate::ipc::handlers::users::link_student_profile;
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const STATUSES: [&str; 3] = ["active", "inactive", "graduated"];
const TUITION_STATUSES: [&str; 4] = ["Paid", "Late", "Pending", ""];

const MUTATE_ROLES: [&str; 4] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::STAFF,
];
const CREATE_ROLES: [&str; 5] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::STAFF,
    roles::TEACHER,
];

fn normalize_tuition_status(value: &str) -> String {
    match value.trim().to_lowercase().as_str() {
        "paid" => "Paid".to_string(),
        "late" => "Late".to_string(),
        "pending" => "Pending".to_string(),
        _ => value.to_string(),
    }
}

pub(crate) fn student_in_school(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
) -> Result<bool, HandlerErr> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND school_id = ?",
            (student_id, school_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn contact_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "name": r.get::<_, String>(2)?,
        "relation": r.get::<_, String>(3)?,
        "phone": r.get::<_, String>(4)?,
        "isLegalGuardian": r.get::<_, i64>(5)? != 0,
        "createdAt": r.get::<_, String>(6)?,
    }))
}

const CONTACT_COLS: &str = "id, student_id, name, relation, phone, is_legal_guardian, created_at";

fn student_contacts(
    conn: &Connection,
    student_id: &str,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM emergency_contacts WHERE student_id = ? ORDER BY created_at",
        CONTACT_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([student_id], contact_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

struct StudentRecord {
    id: String,
    school_id: String,
    first_name: String,
    last_name: String,
    birth_date: Option<String>,
    cpf: String,
    main_address: String,
    reserve_address: String,
    health_allergies: String,
    health_medications: String,
    health_conditions: String,
    blood_type: String,
    enrollment_code: String,
    tuition_status: String,
    status: String,
    created_at: String,
}

const STUDENT_COLS: &str = "id, school_id, first_name, last_name, birth_date, cpf, main_address,
             reserve_address, health_allergies, health_medications, health_conditions, blood_type,
             enrollment_code, tuition_status, status, created_at";

fn student_record(r: &Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: r.get(0)?,
        school_id: r.get(1)?,
        first_name: r.get(2)?,
        last_name: r.get(3)?,
        birth_date: r.get(4)?,
        cpf: r.get(5)?,
        main_address: r.get(6)?,
        reserve_address: r.get(7)?,
        health_allergies: r.get(8)?,
        health_medications: r.get(9)?,
        health_conditions: r.get(10)?,
        blood_type: r.get(11)?,
        enrollment_code: r.get(12)?,
        tuition_status: r.get(13)?,
        status: r.get(14)?,
        created_at: r.get(15)?,
    })
}

fn student_json(
    conn: &Connection,
    record: &StudentRecord,
) -> Result<serde_json::Value, HandlerErr> {
    let allergies: serde_json::Value =
        serde_json::from_str(&record.health_allergies).unwrap_or_else(|_| json!([]));
    let medications: serde_json::Value =
        serde_json::from_str(&record.health_medications).unwrap_or_else(|_| json!([]));
    Ok(json!({
        "id": record.id,
        "schoolId": record.school_id,
        "firstName": record.first_name,
        "lastName": record.last_name,
        "birthDate": record.birth_date,
        "cpf": record.cpf,
        "mainAddress": record.main_address,
        "reserveAddress": record.reserve_address,
        "healthInfo": {
            "allergies": allergies,
            "medications": medications,
            "conditions": record.health_conditions,
            "bloodType": record.blood_type,
        },
        "enrollmentCode": record.enrollment_code,
        "tuitionStatus": record.tuition_status,
        "status": record.status,
        "emergencyContacts": student_contacts(conn, &record.id)?,
        "createdAt": record.created_at,
    }))
}

pub(crate) fn load_student_json(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
) -> Result<Option<serde_json::Value>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM students WHERE id = ? AND school_id = ?",
        STUDENT_COLS
    );
    let record = conn
        .query_row(&sql, (student_id, school_id), student_record)
        .optional()?;
    match record {
        Some(record) => Ok(Some(student_json(conn, &record)?)),
        None => Ok(None),
    }
}

fn health_info<'a>(params: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
    params.get("healthInfo").filter(|v| v.is_object())
}

fn students_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(status) = helpers::optional_str(&req.params, "status") {
        where_sql.push_str(" AND status = ?");
        binds.push(SqlValue::Text(status));
    }
    if let Some(name) = helpers::optional_str(&req.params, "name") {
        where_sql.push_str(" AND (first_name LIKE ? OR last_name LIKE ?)");
        let pattern = helpers::like_pattern(&name);
        binds.push(SqlValue::Text(pattern.clone()));
        binds.push(SqlValue::Text(pattern));
    }
    if let Some(code) = helpers::optional_str(&req.params, "enrollmentCode") {
        where_sql.push_str(" AND enrollment_code LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&code)));
    }

    // Contacts need a second query per row, so page over plain records first.
    let (page, page_size) = helpers::page_params(&req.params);
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM students {}", where_sql),
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
        "SELECT {} FROM students {} ORDER BY first_name, last_name LIMIT ? OFFSET ?",
        STUDENT_COLS, where_sql
    );
    binds.push(SqlValue::Integer(page_size));
    binds.push(SqlValue::Integer(offset));
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), student_record)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut data = Vec::with_capacity(records.len());
    for record in &records {
        data.push(student_json(conn, record)?);
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

fn students_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let first_name = helpers::required_trimmed(&req.params, "firstName")?;
    let status = helpers::optional_str(&req.params, "status");
    if let Some(status) = status.as_deref() {
        helpers::validate_choice(status, &STATUSES, "status")?;
    }
    let tuition_status = helpers::optional_str(&req.params, "tuitionStatus")
        .map(|v| normalize_tuition_status(&v))
        .unwrap_or_default();
    if !TUITION_STATUSES.contains(&tuition_status.as_str()) {
        return Err(HandlerErr::bad_params("invalid tuitionStatus"));
    }
    let birth_date = helpers::optional_date_param(&req.params, "birthDate")?;
    helpers::require_roles(&ctx, &CREATE_ROLES)?;

    let health = health_info(&req.params);
    let allergies = health
        .and_then(|h| h.get("allergies"))
        .cloned()
        .unwrap_or_else(|| json!([]));
    let medications = health
        .and_then(|h| h.get("medications"))
        .cloned()
        .unwrap_or_else(|| json!([]));
    let conditions = health
        .and_then(|h| h.get("conditions"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let blood_type = health
        .and_then(|h| h.get("bloodType"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let student_id = Uuid::new_v4().to_string();
    let cpf = helpers::optional_str(&req.params, "cpf").unwrap_or_default();
    conn.execute(
        "INSERT INTO students(id, school_id, first_name, last_name, birth_date, cpf, main_address,
            reserve_address, health_allergies, health_medications, health_conditions, blood_type,
            enrollment_code, tuition_status, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &student_id,
            &school_id,
            &first_name,
            helpers::optional_str(&req.params, "lastName").unwrap_or_default(),
            birth_date.as_deref(),
            &cpf,
            helpers::optional_str(&req.params, "mainAddress").unwrap_or_default(),
            helpers::optional_str(&req.params, "reserveAddress").unwrap_or_default(),
            allergies.to_string(),
            medications.to_string(),
            conditions,
            blood_type,
            helpers::optional_str(&req.params, "enrollmentCode").unwrap_or_default(),
            &tuition_status,
            status.as_deref().unwrap_or("active"),
            helpers::now_iso(),
        ],
    )
    .map_err(|e| db_write("db_insert_failed", e, "students"))?;

    // Attach an existing account when the caller identifies one.
    let existing_user: Option<String> = {
        let mut found = None;
        if let Some(user_id) = helpers::optional_str(&req.params, "userId") {
            found = conn
                .query_row("SELECT id FROM users WHERE id = ?", [&user_id], |r| {
                    r.get(0)
                })
                .optional()?;
        }
        if found.is_none() {
            if let Some(email) = helpers::optional_str(&req.params, "userEmail") {
                found = conn
                    .query_row("SELECT id FROM users WHERE email = ?", [&email], |r| {
                        r.get(0)
                    })
                    .optional()?;
            }
        }
        if found.is_none() {
            if let Some(username) = helpers::optional_str(&req.params, "username") {
                found = conn
                    .query_row(
                        "SELECT id FROM users WHERE username = ?",
                        [&username],
                        |r| r.get(0),
                    )
                    .optional()?;
            }
        }
        found
    };
    if let Some(user_id) = existing_user {
        let profile_id: Option<String> = conn
            .query_row(
                "SELECT id FROM user_profiles WHERE user_id = ? AND school_id = ?",
                (&user_id, &school_id),
                |r| r.get(0),
            )
            .optional()?;
        if let Some(profile_id) = profile_id {
            link_student_profile(conn, &profile_id, &school_id, &student_id)?;
        }
    }

    if let Some(contacts) = req.params.get("emergencyContacts").and_then(|v| v.as_array()) {
        for contact in contacts {
            let Some(name) = contact.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            if name.trim().is_empty() {
                continue;
            }
            conn.execute(
                "INSERT INTO emergency_contacts(id, student_id, name, relation, phone, is_legal_guardian, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &student_id,
                    name,
                    contact.get("relation").and_then(|v| v.as_str()).unwrap_or(""),
                    contact.get("phone").and_then(|v| v.as_str()).unwrap_or(""),
                    contact
                        .get("isLegalGuardian")
                        .and_then(|v| v.as_bool())
                        .map(|b| if b { 1 } else { 0 })
                        .unwrap_or(0),
                    helpers::now_iso(),
                ),
            )
            .map_err(|e| db_write("db_insert_failed", e, "emergency_contacts"))?;
        }
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "student_created", &student_id);

    // Most schools want an account for the student portal straight away.
    let mut user_credentials = serde_json::Value::Null;
    if helpers::optional_bool(&req.params, "autoCreateUser").unwrap_or(true) {
        let cpf_digits: String = cpf.chars().filter(|c| c.is_ascii_digit()).collect();
        let base_username = if cpf_digits.is_empty() {
            format!("student-{}", student_id)
        } else {
            cpf_digits
        };
        let mut username = base_username.clone();
        let mut counter = 1;
        loop {
            let taken: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM users WHERE username = ?",
                    [&username],
                    |r| r.get(0),
                )
                .optional()?;
            if taken.is_none() {
                break;
            }
            counter += 1;
            username = format!("{}-{}", base_username, counter);
        }
        let password = helpers::optional_str(&req.params, "password")
            .unwrap_or_else(helpers::generate_password);
        helpers::validate_password(&password)?;
        let email = helpers::optional_str(&req.params, "email")
            .or_else(|| helpers::optional_str(&req.params, "userEmail"))
            .unwrap_or_default();

        let user_id = create_user(conn, &username, &email, &password, &first_name, "")?;
        let profile_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO user_profiles(id, user_id, school_id, student_id, role, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &profile_id,
                &user_id,
                &school_id,
                &student_id,
                roles::STUDENT,
                helpers::now_iso(),
            ),
        )
        .map_err(|e| db_write("db_insert_failed", e, "user_profiles"))?;
        user_credentials = json!({
            "username": username,
            "password": password,
            "userId": user_id,
            "profileId": profile_id
        });
    }

    let student = load_student_json(conn, &school_id, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "data": student, "userCredentials": user_credentials }))
}

fn students_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let student_id = helpers::required_str(&req.params, "studentId")?;
    let student = load_student_json(conn, &school_id, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "data": student }))
}

fn students_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let student_id = helpers::required_str(&req.params, "studentId")?;
    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    if let Some(status) = helpers::optional_str(&req.params, "status") {
        helpers::validate_choice(&status, &STATUSES, "status")?;
        conn.execute(
            "UPDATE students SET status = ? WHERE id = ?",
            (&status, &student_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "students"))?;
    }
    if let Some(raw) = helpers::optional_str(&req.params, "tuitionStatus") {
        let tuition = normalize_tuition_status(&raw);
        if !TUITION_STATUSES.contains(&tuition.as_str()) {
            return Err(HandlerErr::bad_params("invalid tuitionStatus"));
        }
        conn.execute(
            "UPDATE students SET tuition_status = ? WHERE id = ?",
            (&tuition, &student_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "students"))?;
    }
    for (key, column) in [
        ("firstName", "first_name"),
        ("lastName", "last_name"),
        ("enrollmentCode", "enrollment_code"),
        ("cpf", "cpf"),
        ("mainAddress", "main_address"),
        ("reserveAddress", "reserve_address"),
    ] {
        if let Some(value) = helpers::optional_str(&req.params, key) {
            let sql = format!("UPDATE students SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &student_id))
                .map_err(|e| db_write("db_update_failed", e, "students"))?;
        }
    }
    if req.params.get("birthDate").is_some() {
        let birth_date = helpers::optional_date_param(&req.params, "birthDate")?;
        conn.execute(
            "UPDATE students SET birth_date = ? WHERE id = ?",
            (birth_date.as_deref(), &student_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "students"))?;
    }
    if let Some(health) = health_info(&req.params) {
        let allergies = health.get("allergies").cloned().unwrap_or_else(|| json!([]));
        let medications = health
            .get("medications")
            .cloned()
            .unwrap_or_else(|| json!([]));
        conn.execute(
            "UPDATE students SET health_allergies = ?, health_medications = ?, health_conditions = ?, blood_type = ?
             WHERE id = ?",
            (
                allergies.to_string(),
                medications.to_string(),
                health.get("conditions").and_then(|v| v.as_str()).unwrap_or(""),
                health.get("bloodType").and_then(|v| v.as_str()).unwrap_or(""),
                &student_id,
            ),
        )
        .map_err(|e| db_write("db_update_failed", e, "students"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "student_updated", &student_id);
    let student = load_student_json(conn, &school_id, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "data": student }))
}

fn students_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let student_id = helpers::required_str(&req.params, "studentId")?;
    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_write("db_tx_failed", e, "students"))?;

    for (sql, table) in [
        (
            "UPDATE user_profiles SET student_id = NULL WHERE student_id = ?",
            "user_profiles",
        ),
        (
            "UPDATE financial_transactions SET invoice_id = NULL
             WHERE invoice_id IN (SELECT id FROM invoices WHERE student_id = ?)",
            "financial_transactions",
        ),
        ("DELETE FROM invoices WHERE student_id = ?", "invoices"),
        (
            "DELETE FROM absence_justifications
             WHERE attendance_id IN (SELECT id FROM attendance_records WHERE student_id = ?)",
            "absence_justifications",
        ),
        (
            "DELETE FROM attendance_records WHERE student_id = ?",
            "attendance_records",
        ),
        ("DELETE FROM grade_records WHERE student_id = ?", "grade_records"),
        (
            "DELETE FROM messages
             WHERE conversation_id IN (SELECT id FROM conversations WHERE student_id = ?)",
            "messages",
        ),
        ("DELETE FROM conversations WHERE student_id = ?", "conversations"),
        (
            "DELETE FROM emergency_contacts WHERE student_id = ?",
            "emergency_contacts",
        ),
        ("DELETE FROM student_parents WHERE student_id = ?", "student_parents"),
        (
            "DELETE FROM student_guardians WHERE student_id = ?",
            "student_guardians",
        ),
        ("DELETE FROM enrollments WHERE student_id = ?", "enrollments"),
        ("DELETE FROM students WHERE id = ?", "students"),
    ] {
        if let Err(e) = tx.execute(sql, [&student_id]) {
            return Err(db_write("db_delete_failed", e, table));
        }
    }
    tx.commit()
        .map_err(|e| db_write("db_commit_failed", e, "students"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "student_deleted", &student_id);
    Ok(json!({ "success": true }))
}

fn contacts_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let student_id = helpers::required_str(&req.params, "studentId")?;
    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "data": student_contacts(conn, &student_id)? }))
}

fn contacts_add(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let student_id = helpers::required_str(&req.params, "studentId")?;
    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let name = helpers::required_trimmed(&req.params, "name")?;
    let contact_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO emergency_contacts(id, student_id, name, relation, phone, is_legal_guardian, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &contact_id,
            &student_id,
            &name,
            helpers::optional_str(&req.params, "relation").unwrap_or_default(),
            helpers::optional_str(&req.params, "phone").unwrap_or_default(),
            helpers::optional_bool(&req.params, "isLegalGuardian")
                .map(|b| if b { 1 } else { 0 })
                .unwrap_or(0),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "emergency_contacts"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "emergency_contact_created",
        &contact_id,
    );
    let sql = format!(
        "SELECT {} FROM emergency_contacts WHERE id = ?",
        CONTACT_COLS
    );
    let contact = conn.query_row(&sql, [&contact_id], contact_row)?;
    Ok(json!({ "data": contact }))
}

fn visible_contact(
    conn: &Connection,
    school_id: &str,
    contact_id: &str,
) -> Result<(), HandlerErr> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM emergency_contacts c
             JOIN students s ON s.id = c.student_id
             WHERE c.id = ? AND s.school_id = ?",
            (contact_id, school_id),
            |r| r.get(0),
        )
        .optional()?;
    if hit.is_none() {
        return Err(HandlerErr::not_found("contact not found"));
    }
    Ok(())
}

fn contacts_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let contact_id = helpers::required_str(&req.params, "contactId")?;
    visible_contact(conn, &school_id, &contact_id)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    for (key, column) in [("name", "name"), ("relation", "relation"), ("phone", "phone")] {
        if let Some(value) = helpers::optional_str(&req.params, key) {
            let sql = format!("UPDATE emergency_contacts SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &contact_id))
                .map_err(|e| db_write("db_update_failed", e, "emergency_contacts"))?;
        }
    }
    if let Some(is_legal) = helpers::optional_bool(&req.params, "isLegalGuardian") {
        conn.execute(
            "UPDATE emergency_contacts SET is_legal_guardian = ? WHERE id = ?",
            (if is_legal { 1 } else { 0 }, &contact_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "emergency_contacts"))?;
    }

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "emergency_contact_updated",
        &contact_id,
    );
    let sql = format!(
        "SELECT {} FROM emergency_contacts WHERE id = ?",
        CONTACT_COLS
    );
    let contact = conn.query_row(&sql, [&contact_id], contact_row)?;
    Ok(json!({ "data": contact }))
}

fn contacts_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let contact_id = helpers::required_str(&req.params, "contactId")?;
    visible_contact(conn, &school_id, &contact_id)?;
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    conn.execute("DELETE FROM emergency_contacts WHERE id = ?", [&contact_id])
        .map_err(|e| db_write("db_delete_failed", e, "emergency_contacts"))?;
    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "emergency_contact_deleted",
        &contact_id,
    );
    Ok(json!({ "success": true }))
}

fn parent_link_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "guardianId": r.get::<_, String>(2)?,
        "isPrimary": r.get::<_, i64>(3)? != 0,
        "createdAt": r.get::<_, String>(4)?,
    }))
}

fn parents_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let student_id = helpers::required_str(&req.params, "studentId")?;
    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let mut stmt = conn.prepare(
        "SELECT id, student_id, guardian_id, is_primary, created_at
         FROM student_parents
         WHERE student_id = ?
         ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map([&student_id], parent_link_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "data": rows }))
}

fn parents_set(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let student_id = helpers::required_str(&req.params, "studentId")?;
    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let guardian_id = helpers::required_str(&req.params, "guardianId")?;
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
        "INSERT INTO student_parents(id, student_id, guardian_id, is_primary, created_at)
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
    .map_err(|e| db_write("db_insert_failed", e, "student_parents"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "student_parent_set",
        &format!("student={} guardian={}", student_id, guardian_id),
    );
    let link = conn.query_row(
        "SELECT id, student_id, guardian_id, is_primary, created_at
         FROM student_parents WHERE student_id = ? AND guardian_id = ?",
        (&student_id, &guardian_id),
        parent_link_row,
    )?;
    Ok(json!({ "data": link }))
}

fn parents_remove(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let student_id = helpers::required_str(&req.params, "studentId")?;
    if !student_in_school(conn, &school_id, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    helpers::require_roles(&ctx, &MUTATE_ROLES)?;

    let guardian_id = helpers::required_str(&req.params, "guardianId")?;
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
        "DELETE FROM student_parents WHERE student_id = ? AND guardian_id = ?",
        (&student_id, &guardian_id),
    )
    .map_err(|e| db_write("db_delete_failed", e, "student_parents"))?;
    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "student_parent_deleted",
        &format!("student={} guardian={}", student_id, guardian_id),
    );
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(helpers::run(state, req, |conn| students_list(conn, req))),
        "students.create" => Some(helpers::run(state, req, |conn| students_create(conn, req))),
        "students.get" => Some(helpers::run(state, req, |conn| students_get(conn, req))),
        "students.update" => Some(helpers::run(state, req, |conn| students_update(conn, req))),
        "students.delete" => Some(helpers::run(state, req, |conn| students_delete(conn, req))),
        "students.contacts.list" => Some(helpers::run(state, req, |conn| contacts_list(conn, req))),
        "students.contacts.add" => Some(helpers::run(state, req, |conn| contacts_add(conn, req))),
        "contacts.update" => Some(helpers::run(state, req, |conn| contacts_update(conn, req))),
        "contacts.delete" => Some(helpers::run(state, req, |conn| contacts_delete(conn, req))),
        "students.parents.list" => Some(helpers::run(state, req, |conn| parents_list(conn, req))),
        "students.parents.set" => Some(helpers::run(state, req, |conn| parents_set(conn, req))),
        "students.parents.remove" => {
            Some(helpers::run(state, req, |conn| parents_remove(conn, req)))
        }
        _ => None,
    }
}
