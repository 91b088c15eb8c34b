use crate::ipc::handlers::auth::create_user;
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

/// Accept role spellings case-insensitively; unknown values pass through and
/// fail choice validation with the allowed list attached.
fn normalize_role(value: &str) -> String {
    let normalized = value.trim().to_lowercase();
    if roles::ALL.contains(&normalized.as_str()) {
        normalized
    } else {
        value.to_string()
    }
}

/// The staff view collapses back-office roles into the labels the original
/// frontend expects.
fn staff_role_label(role: &str) -> &str {
    match role {
        roles::TEACHER => "Teacher",
        roles::STUDENT => "Student",
        roles::COORDINATOR => "Coordinator",
        roles::ADMIN | roles::DIRECTOR => "Admin",
        roles::SUPPORT | roles::STAFF | roles::FINANCE => "Support",
        other => other,
    }
}

fn user_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "username": r.get::<_, String>(1)?,
        "email": r.get::<_, String>(2)?,
        "isActive": r.get::<_, i64>(3)? != 0,
        "role": r.get::<_, Option<String>>(4)?,
        "schoolId": r.get::<_, Option<String>>(5)?,
        "studentId": r.get::<_, Option<String>>(6)?,
        "department": r.get::<_, Option<String>>(7)?,
        "phone": r.get::<_, Option<String>>(8)?,
        "admissionDate": r.get::<_, Option<String>>(9)?,
        "createdAt": r.get::<_, String>(10)?,
    }))
}

const USER_COLS: &str = "u.id, u.username, u.email, u.active, p.role, p.school_id, p.student_id,
             p.department, p.phone, p.admission_date, u.created_at";

fn load_user(conn: &Connection, user_id: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    let sql = format!(
        "SELECT {}
         FROM users u
         LEFT JOIN user_profiles p ON p.user_id = u.id
         WHERE u.id = ?",
        USER_COLS
    );
    Ok(conn.query_row(&sql, [user_id], user_row).optional()?)
}

fn staff_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let user_id: String = r.get(0)?;
    let first: String = r.get(1)?;
    let last: String = r.get(2)?;
    let username: String = r.get(3)?;
    let email: String = r.get(4)?;
    let role: String = r.get(5)?;
    let department: String = r.get(6)?;
    let phone: String = r.get(7)?;
    let admission_date: Option<String> = r.get(8)?;
    Ok(json!({
        "id": user_id,
        "name": helpers::display_name(&first, &last, &username),
        "role": staff_role_label(&role),
        "department": department,
        "phone": phone,
        "email": email,
        "admissionDate": admission_date,
    }))
}

const STAFF_COLS: &str = "u.id, u.first_name, u.last_name, u.username, u.email, p.role,
             p.department, p.phone, p.admission_date";

/// Link a profile to a student, keeping the one-profile-per-student rule.
pub(crate) fn link_student_profile(
    conn: &Connection,
    profile_id: &str,
    school_id: &str,
    student_id: &str,
) -> Result<(), HandlerErr> {
    let student_school: Option<String> = conn
        .query_row(
            "SELECT school_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(student_school) = student_school else {
        return Err(HandlerErr::bad_params("invalid student"));
    };
    if student_school != school_id {
        return Err(HandlerErr::bad_params("student does not belong to school"));
    }
    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM user_profiles WHERE student_id = ? AND id != ?",
            (student_id, profile_id),
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::conflict("student already linked to another user"));
    }
    conn.execute(
        "UPDATE user_profiles SET student_id = ? WHERE id = ?",
        (student_id, profile_id),
    )
    .map_err(|e| db_write("db_update_failed", e, "user_profiles"))?;
    Ok(())
}

/// Dependency-ordered removal of a user account. Rows authored by the
/// profile are detached rather than deleted; teaching assignments go away
/// with the teacher.
fn delete_user_cascade(conn: &Connection, user_id: &str) -> Result<(), HandlerErr> {
    let profile_id: Option<String> = conn
        .query_row(
            "SELECT id FROM user_profiles WHERE user_id = ?",
            [user_id],
            |r| r.get(0),
        )
        .optional()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_write("db_tx_failed", e, "users"))?;

    if let Some(pid) = profile_id.as_deref() {
        for (sql, table) in [
            (
                "UPDATE notices SET author_profile_id = NULL WHERE author_profile_id = ?",
                "notices",
            ),
            (
                "UPDATE attendance_records SET teacher_profile_id = NULL WHERE teacher_profile_id = ?",
                "attendance_records",
            ),
            (
                "UPDATE class_diary_entries SET teacher_profile_id = NULL WHERE teacher_profile_id = ?",
                "class_diary_entries",
            ),
            (
                "UPDATE absence_justifications SET created_by = NULL WHERE created_by = ?",
                "absence_justifications",
            ),
            (
                "UPDATE absence_justifications SET decided_by = NULL WHERE decided_by = ?",
                "absence_justifications",
            ),
            (
                "UPDATE exam_submissions SET submitted_by = NULL WHERE submitted_by = ?",
                "exam_submissions",
            ),
            (
                "UPDATE exam_submissions SET decided_by = NULL WHERE decided_by = ?",
                "exam_submissions",
            ),
            (
                "UPDATE upload_attachments SET uploaded_by = NULL WHERE uploaded_by = ?",
                "upload_attachments",
            ),
            (
                "UPDATE audit_logs SET user_profile_id = NULL WHERE user_profile_id = ?",
                "audit_logs",
            ),
            (
                "UPDATE messages SET sender_profile_id = NULL WHERE sender_profile_id = ?",
                "messages",
            ),
            (
                "UPDATE class_schedule_entries SET teacher_profile_id = NULL WHERE teacher_profile_id = ?",
                "class_schedule_entries",
            ),
            (
                "DELETE FROM classroom_teacher_allocations WHERE teacher_profile_id = ?",
                "classroom_teacher_allocations",
            ),
            (
                "DELETE FROM teacher_availability WHERE teacher_profile_id = ?",
                "teacher_availability",
            ),
        ] {
            // Dropping the transaction without commit rolls everything back.
            if let Err(e) = tx.execute(sql, [pid]) {
                return Err(db_write("db_update_failed", e, table));
            }
        }
        tx.execute("DELETE FROM user_profiles WHERE id = ?", [pid])
            .map_err(|e| db_write("db_delete_failed", e, "user_profiles"))?;
    }

    tx.execute("DELETE FROM api_tokens WHERE user_id = ?", [user_id])
        .map_err(|e| db_write("db_delete_failed", e, "api_tokens"))?;
    tx.execute(
        "DELETE FROM password_reset_tokens WHERE user_id = ?",
        [user_id],
    )
    .map_err(|e| db_write("db_delete_failed", e, "password_reset_tokens"))?;
    tx.execute("DELETE FROM users WHERE id = ?", [user_id])
        .map_err(|e| db_write("db_delete_failed", e, "users"))?;

    tx.commit()
        .map_err(|e| db_write("db_commit_failed", e, "users"))?;
    Ok(())
}

fn users_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])?;
    let school_id = helpers::require_school(&ctx)?;

    if let Some(requested) = helpers::optional_str(&req.params, "schoolId") {
        if requested != school_id {
            return Err(HandlerErr::forbidden());
        }
    }

    let mut where_sql = "WHERE p.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(role) = helpers::optional_str(&req.params, "role") {
        where_sql.push_str(" AND p.role = ?");
        binds.push(SqlValue::Text(normalize_role(&role)));
    }
    if let Some(q) = helpers::optional_str(&req.params, "q") {
        where_sql.push_str(
            " AND (u.username LIKE ? OR u.email LIKE ? OR u.first_name LIKE ? OR u.last_name LIKE ?)",
        );
        let pattern = helpers::like_pattern(&q);
        for _ in 0..4 {
            binds.push(SqlValue::Text(pattern.clone()));
        }
    }

    let from = "FROM users u JOIN user_profiles p ON p.user_id = u.id";
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", from, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY u.username",
            USER_COLS, from, where_sql
        ),
        &binds,
        user_row,
    )
}

fn users_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])?;
    let school_id = helpers::require_school(&ctx)?;

    let username = helpers::required_trimmed(&req.params, "username")?;
    let email = helpers::required_trimmed(&req.params, "email")?;
    let password = helpers::required_str(&req.params, "password")?;
    let role = normalize_role(&helpers::required_str(&req.params, "role")?);
    helpers::validate_choice(&role, &roles::ALL, "role")?;
    helpers::validate_password(&password)?;

    let username_taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE username = ?",
            [&username],
            |r| r.get(0),
        )
        .optional()?;
    if username_taken.is_some() {
        return Err(HandlerErr::conflict("username already exists"));
    }
    let email_taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| {
            r.get(0)
        })
        .optional()?;
    if email_taken.is_some() {
        return Err(HandlerErr::conflict("email already exists"));
    }

    if let Some(requested) = helpers::optional_str(&req.params, "schoolId") {
        if requested != school_id {
            return Err(HandlerErr::forbidden());
        }
    }

    let user_id = create_user(conn, &username, &email, &password, "", "")?;
    let profile_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO user_profiles(id, user_id, school_id, role, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&profile_id, &user_id, &school_id, &role, helpers::now_iso()),
    )
    .map_err(|e| db_write("db_insert_failed", e, "user_profiles"))?;

    if let Some(student_id) = helpers::optional_str(&req.params, "studentId") {
        link_student_profile(conn, &profile_id, &school_id, &student_id)?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "user_created", &user_id);
    let user = load_user(conn, &user_id)?.ok_or_else(|| HandlerErr::not_found("user not found"))?;
    Ok(json!({ "data": user }))
}

/// Resolve a user visible to the caller's school. Users with a profile in a
/// different school are off limits; profile-less users are administered by
/// anyone with the role gate.
fn visible_user(
    conn: &Connection,
    school_id: &str,
    user_id: &str,
) -> Result<(String, Option<String>), HandlerErr> {
    let exists: Option<String> = conn
        .query_row("SELECT id FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()?;
    let Some(user_id) = exists else {
        return Err(HandlerErr::not_found("user not found"));
    };
    let profile: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT id, school_id FROM user_profiles WHERE user_id = ?",
            [&user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    if let Some((_, Some(profile_school))) = &profile {
        if profile_school != school_id {
            return Err(HandlerErr::forbidden());
        }
    }
    Ok((user_id, profile.map(|(id, _)| id)))
}

fn users_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])?;
    let school_id = helpers::require_school(&ctx)?;
    let user_id = helpers::required_str(&req.params, "userId")?;
    let (user_id, _) = visible_user(conn, &school_id, &user_id)?;
    let user = load_user(conn, &user_id)?.ok_or_else(|| HandlerErr::not_found("user not found"))?;
    Ok(json!({ "data": user }))
}

fn users_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])?;
    let school_id = helpers::require_school(&ctx)?;
    let user_id = helpers::required_str(&req.params, "userId")?;
    let (user_id, profile_id) = visible_user(conn, &school_id, &user_id)?;

    if let Some(requested) = helpers::optional_str(&req.params, "schoolId") {
        if requested != school_id {
            return Err(HandlerErr::forbidden());
        }
    }

    if let Some(email) = helpers::optional_str(&req.params, "email") {
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM users WHERE email = ? AND id != ?",
                (&email, &user_id),
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(HandlerErr::conflict("email already exists"));
        }
        conn.execute(
            "UPDATE users SET email = ? WHERE id = ?",
            (&email, &user_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "users"))?;
    }
    if let Some(username) = helpers::optional_str(&req.params, "username") {
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM users WHERE username = ? AND id != ?",
                (&username, &user_id),
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(HandlerErr::conflict("username already exists"));
        }
        conn.execute(
            "UPDATE users SET username = ? WHERE id = ?",
            (&username, &user_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "users"))?;
    }
    if let Some(password) = helpers::optional_str(&req.params, "password") {
        helpers::validate_password(&password)?;
        let salt = helpers::new_salt();
        let hash = helpers::hash_password(&salt, &password);
        conn.execute(
            "UPDATE users SET password_salt = ?, password_hash = ? WHERE id = ?",
            (&salt, &hash, &user_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "users"))?;
    }
    if let Some(active) = helpers::optional_bool(&req.params, "isActive") {
        conn.execute(
            "UPDATE users SET active = ? WHERE id = ?",
            (if active { 1 } else { 0 }, &user_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "users"))?;
    }

    if let Some(profile_id) = profile_id.as_deref() {
        if let Some(role) = helpers::optional_str(&req.params, "role") {
            let role = normalize_role(&role);
            helpers::validate_choice(&role, &roles::ALL, "role")?;
            conn.execute(
                "UPDATE user_profiles SET role = ? WHERE id = ?",
                (&role, profile_id),
            )
            .map_err(|e| db_write("db_update_failed", e, "user_profiles"))?;
        }
        match req.params.get("studentId") {
            Some(serde_json::Value::Null) => {
                conn.execute(
                    "UPDATE user_profiles SET student_id = NULL WHERE id = ?",
                    [profile_id],
                )
                .map_err(|e| db_write("db_update_failed", e, "user_profiles"))?;
            }
            Some(v) => {
                let Some(student_id) = v.as_str() else {
                    return Err(HandlerErr::bad_params("studentId must be a string or null"));
                };
                link_student_profile(conn, profile_id, &school_id, student_id)?;
            }
            None => {}
        }
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "user_updated", &user_id);
    let user = load_user(conn, &user_id)?.ok_or_else(|| HandlerErr::not_found("user not found"))?;
    Ok(json!({ "data": user }))
}

fn users_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])?;
    let school_id = helpers::require_school(&ctx)?;
    let user_id = helpers::required_str(&req.params, "userId")?;
    let (user_id, _) = visible_user(conn, &school_id, &user_id)?;

    if user_id == ctx.user_id {
        return Err(HandlerErr::bad_params("cannot delete current user"));
    }

    delete_user_cascade(conn, &user_id)?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "user_deleted", &user_id);
    Ok(json!({ "success": true }))
}

fn staff_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR])?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE p.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(role) = helpers::optional_str(&req.params, "role") {
        where_sql.push_str(" AND p.role = ?");
        binds.push(SqlValue::Text(normalize_role(&role)));
    }
    if let Some(q) = helpers::optional_str(&req.params, "q") {
        where_sql.push_str(
            " AND (u.username LIKE ? OR u.email LIKE ? OR u.first_name LIKE ? OR u.last_name LIKE ? OR p.department LIKE ?)",
        );
        let pattern = helpers::like_pattern(&q);
        for _ in 0..5 {
            binds.push(SqlValue::Text(pattern.clone()));
        }
    }

    let from = "FROM users u JOIN user_profiles p ON p.user_id = u.id";
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", from, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY u.first_name, u.last_name",
            STAFF_COLS, from, where_sql
        ),
        &binds,
        staff_row,
    )
}

fn staff_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR])?;
    let school_id = helpers::require_school(&ctx)?;

    let name = helpers::required_trimmed(&req.params, "name")?;
    let email = helpers::required_trimmed(&req.params, "email")?;
    let role = normalize_role(&helpers::required_str(&req.params, "role")?);
    helpers::validate_choice(&role, &roles::ALL, "role")?;

    let password = helpers::optional_str(&req.params, "password")
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(helpers::generate_password);
    helpers::validate_password(&password)?;

    let email_taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| {
            r.get(0)
        })
        .optional()?;
    if email_taken.is_some() {
        return Err(HandlerErr::conflict("email already exists"));
    }

    let base_username = helpers::optional_str(&req.params, "username")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
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

    let (first_name, last_name) = match name.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.to_string()),
        None => (name.clone(), String::new()),
    };
    let admission_date = helpers::optional_date_param(&req.params, "admissionDate")?;

    let user_id = create_user(conn, &username, &email, &password, &first_name, &last_name)?;
    let profile_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO user_profiles(id, user_id, school_id, role, department, phone, admission_date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &profile_id,
            &user_id,
            &school_id,
            &role,
            helpers::optional_str(&req.params, "department").unwrap_or_default(),
            helpers::optional_str(&req.params, "phone").unwrap_or_default(),
            admission_date.as_deref(),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "user_profiles"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "staff_created", &user_id);

    let sql = format!(
        "SELECT {} FROM users u JOIN user_profiles p ON p.user_id = u.id WHERE u.id = ?",
        STAFF_COLS
    );
    let staff = conn.query_row(&sql, [&user_id], staff_row)?;
    Ok(json!({
        "data": staff,
        "userCredentials": {
            "username": username,
            "password": password,
            "userId": user_id,
            "profileId": profile_id
        }
    }))
}

fn staff_profile(
    conn: &Connection,
    school_id: &str,
    user_id: &str,
) -> Result<String, HandlerErr> {
    let profile_id: Option<String> = conn
        .query_row(
            "SELECT id FROM user_profiles WHERE user_id = ? AND school_id = ?",
            (user_id, school_id),
            |r| r.get(0),
        )
        .optional()?;
    profile_id.ok_or_else(|| HandlerErr::not_found("staff member not found"))
}

fn staff_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR])?;
    let school_id = helpers::require_school(&ctx)?;
    let user_id = helpers::required_str(&req.params, "staffId")?;
    staff_profile(conn, &school_id, &user_id)?;
    let sql = format!(
        "SELECT {} FROM users u JOIN user_profiles p ON p.user_id = u.id WHERE u.id = ?",
        STAFF_COLS
    );
    let staff = conn.query_row(&sql, [&user_id], staff_row)?;
    Ok(json!({ "data": staff }))
}

fn staff_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR])?;
    let school_id = helpers::require_school(&ctx)?;
    let user_id = helpers::required_str(&req.params, "staffId")?;
    let profile_id = staff_profile(conn, &school_id, &user_id)?;

    if let Some(email) = helpers::optional_str(&req.params, "email") {
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM users WHERE email = ? AND id != ?",
                (&email, &user_id),
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(HandlerErr::conflict("email already exists"));
        }
        conn.execute(
            "UPDATE users SET email = ? WHERE id = ?",
            (&email, &user_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "users"))?;
    }
    if let Some(username) = helpers::optional_str(&req.params, "username") {
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM users WHERE username = ? AND id != ?",
                (&username, &user_id),
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(HandlerErr::conflict("username already exists"));
        }
        conn.execute(
            "UPDATE users SET username = ? WHERE id = ?",
            (&username, &user_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "users"))?;
    }
    if let Some(password) = helpers::optional_str(&req.params, "password") {
        helpers::validate_password(&password)?;
        let salt = helpers::new_salt();
        let hash = helpers::hash_password(&salt, &password);
        conn.execute(
            "UPDATE users SET password_salt = ?, password_hash = ? WHERE id = ?",
            (&salt, &hash, &user_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "users"))?;
    }
    if let Some(name) = helpers::optional_str(&req.params, "name") {
        let (first, last) = match name.split_once(' ') {
            Some((first, rest)) => (first.to_string(), rest.to_string()),
            None => (name.clone(), String::new()),
        };
        conn.execute(
            "UPDATE users SET first_name = ?, last_name = ? WHERE id = ?",
            (&first, &last, &user_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "users"))?;
    }

    if let Some(role) = helpers::optional_str(&req.params, "role") {
        let role = normalize_role(&role);
        helpers::validate_choice(&role, &roles::ALL, "role")?;
        conn.execute(
            "UPDATE user_profiles SET role = ? WHERE id = ?",
            (&role, &profile_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "user_profiles"))?;
    }
    if let Some(department) = helpers::optional_str(&req.params, "department") {
        conn.execute(
            "UPDATE user_profiles SET department = ? WHERE id = ?",
            (&department, &profile_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "user_profiles"))?;
    }
    if let Some(phone) = helpers::optional_str(&req.params, "phone") {
        conn.execute(
            "UPDATE user_profiles SET phone = ? WHERE id = ?",
            (&phone, &profile_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "user_profiles"))?;
    }
    if req.params.get("admissionDate").is_some() {
        let admission_date = helpers::optional_date_param(&req.params, "admissionDate")?;
        conn.execute(
            "UPDATE user_profiles SET admission_date = ? WHERE id = ?",
            (admission_date.as_deref(), &profile_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "user_profiles"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "staff_updated", &user_id);
    let sql = format!(
        "SELECT {} FROM users u JOIN user_profiles p ON p.user_id = u.id WHERE u.id = ?",
        STAFF_COLS
    );
    let staff = conn.query_row(&sql, [&user_id], staff_row)?;
    Ok(json!({ "data": staff }))
}

fn staff_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR])?;
    let school_id = helpers::require_school(&ctx)?;
    let user_id = helpers::required_str(&req.params, "staffId")?;
    staff_profile(conn, &school_id, &user_id)?;

    if user_id == ctx.user_id {
        return Err(HandlerErr::bad_params("cannot delete current user"));
    }
    delete_user_cascade(conn, &user_id)?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "staff_deleted", &user_id);
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(helpers::run(state, req, |conn| users_list(conn, req))),
        "users.create" => Some(helpers::run(state, req, |conn| users_create(conn, req))),
        "users.get" => Some(helpers::run(state, req, |conn| users_get(conn, req))),
        "users.update" => Some(helpers::run(state, req, |conn| users_update(conn, req))),
        "users.delete" => Some(helpers::run(state, req, |conn| users_delete(conn, req))),
        "staff.list" => Some(helpers::run(state, req, |conn| staff_list(conn, req))),
        "staff.create" => Some(helpers::run(state, req, |conn| staff_create(conn, req))),
        "staff.get" => Some(helpers::run(state, req, |conn| staff_get(conn, req))),
        "staff.update" => Some(helpers::run(state, req, |conn| staff_update(conn, req))),
        "staff.delete" => Some(helpers::run(state, req, |conn| staff_delete(conn, req))),
        _ => None,
    }
}
