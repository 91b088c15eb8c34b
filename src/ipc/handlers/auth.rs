use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn username_taken(conn: &Connection, username: &str) -> Result<bool, HandlerErr> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE username = ?",
            [username],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn email_taken(conn: &Connection, email: &str, exclude_user: Option<&str>) -> Result<bool, HandlerErr> {
    let hit: Option<i64> = match exclude_user {
        Some(user_id) => conn
            .query_row(
                "SELECT 1 FROM users WHERE email = ? AND id != ?",
                (email, user_id),
                |r| r.get(0),
            )
            .optional()?,
        None => conn
            .query_row("SELECT 1 FROM users WHERE email = ?", [email], |r| r.get(0))
            .optional()?,
    };
    Ok(hit.is_some())
}

pub(crate) fn create_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
) -> Result<String, HandlerErr> {
    let user_id = Uuid::new_v4().to_string();
    let salt = helpers::new_salt();
    let hash = helpers::hash_password(&salt, password);
    conn.execute(
        "INSERT INTO users(id, username, email, password_salt, password_hash, first_name, last_name, active, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 1, ?)",
        (
            &user_id,
            username,
            email,
            &salt,
            &hash,
            first_name,
            last_name,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "users"))?;
    Ok(user_id)
}

fn register(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let username = helpers::required_trimmed(&req.params, "username")?;
    let email = helpers::required_trimmed(&req.params, "email")?;
    let password = helpers::required_str(&req.params, "password")?;
    helpers::validate_password(&password)?;

    if username_taken(conn, &username)? {
        return Err(HandlerErr::conflict("username already exists"));
    }
    if email_taken(conn, &email, None)? {
        return Err(HandlerErr::conflict("email already exists"));
    }

    let user_id = create_user(conn, &username, &email, &password, "", "")?;

    let school_name = helpers::optional_str(&req.params, "schoolName")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let mut school_id: Option<String> = None;
    if let Some(name) = school_name {
        let sid = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO schools(id, name, created_at) VALUES(?, ?, ?)",
            (&sid, &name, helpers::now_iso()),
        )
        .map_err(|e| db_write("db_insert_failed", e, "schools"))?;
        school_id = Some(sid);
    }

    let role = if school_id.is_some() {
        roles::ADMIN
    } else {
        roles::STAFF
    };
    conn.execute(
        "INSERT INTO user_profiles(id, user_id, school_id, role, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &user_id,
            school_id.as_deref(),
            role,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "user_profiles"))?;

    let token = helpers::issue_token(conn, &user_id)?;
    Ok(json!({
        "token": token,
        "user": {
            "id": user_id,
            "username": username,
            "email": email,
            "role": role,
            "schoolId": school_id
        }
    }))
}

fn login(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let identifier = helpers::required_str(&req.params, "usernameOrEmail")?;
    let password = helpers::required_str(&req.params, "password")?;

    // Email logins resolve to the account's username first.
    let mut username = identifier.clone();
    if identifier.contains('@') {
        if let Some(by_email) = conn
            .query_row(
                "SELECT username FROM users WHERE email = ?",
                [&identifier],
                |r| r.get::<_, String>(0),
            )
            .optional()?
        {
            username = by_email;
        }
    }

    let row: Option<(String, String, String, i64)> = conn
        .query_row(
            "SELECT id, password_salt, password_hash, active FROM users WHERE username = ?",
            [&username],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((user_id, salt, hash, active)) = row else {
        return Err(HandlerErr {
            code: "unauthorized",
            message: "invalid credentials".to_string(),
            details: None,
        });
    };
    if active == 0 || helpers::hash_password(&salt, &password) != hash {
        return Err(HandlerErr {
            code: "unauthorized",
            message: "invalid credentials".to_string(),
            details: None,
        });
    }

    conn.execute(
        "UPDATE users SET last_login_at = ? WHERE id = ?",
        (helpers::now_iso(), &user_id),
    )
    .map_err(|e| db_write("db_update_failed", e, "users"))?;

    let token = helpers::issue_token(conn, &user_id)?;
    let ctx = helpers::load_auth_context(conn, &user_id)?;
    Ok(json!({
        "token": token,
        "user": {
            "id": user_id,
            "username": ctx.username,
            "email": ctx.email,
            "role": ctx.role(),
            "schoolId": ctx.profile.as_ref().and_then(|p| p.school_id.clone()),
            "studentId": ctx.profile.as_ref().and_then(|p| p.student_id.clone())
        }
    }))
}

fn logout(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    helpers::authenticate(conn, req)?;
    let token = req.token.as_deref().unwrap_or_default();
    conn.execute("DELETE FROM api_tokens WHERE key = ?", [token])
        .map_err(|e| db_write("db_delete_failed", e, "api_tokens"))?;
    Ok(json!({ "success": true }))
}

fn refresh(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let token = req.token.as_deref().unwrap_or_default();
    conn.execute("DELETE FROM api_tokens WHERE key = ?", [token])
        .map_err(|e| db_write("db_delete_failed", e, "api_tokens"))?;
    let new_token = helpers::issue_token(conn, &ctx.user_id)?;
    Ok(json!({ "token": new_token }))
}

fn revoke(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;

    if let Some(token_key) = helpers::optional_str(&req.params, "tokenKey") {
        helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM api_tokens WHERE key = ?",
                [&token_key],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(HandlerErr::not_found("token not found"));
        }
        conn.execute("DELETE FROM api_tokens WHERE key = ?", [&token_key])
            .map_err(|e| db_write("db_delete_failed", e, "api_tokens"))?;
        return Ok(json!({ "success": true }));
    }

    let token = req.token.as_deref().unwrap_or_default();
    conn.execute("DELETE FROM api_tokens WHERE key = ?", [token])
        .map_err(|e| db_write("db_delete_failed", e, "api_tokens"))?;
    Ok(json!({ "success": true }))
}

fn request_password_reset(
    conn: &Connection,
    req: &Request,
    debug: bool,
) -> Result<serde_json::Value, HandlerErr> {
    let email = helpers::required_trimmed(&req.params, "email")?;

    let user_id: Option<String> = conn
        .query_row("SELECT id FROM users WHERE email = ?", [&email], |r| {
            r.get(0)
        })
        .optional()?;

    // Do not reveal whether the address exists.
    let mut result = json!({ "success": true });
    if let Some(user_id) = user_id {
        let now = helpers::now_iso();
        conn.execute(
            "UPDATE password_reset_tokens SET used_at = ?
             WHERE user_id = ? AND used_at IS NULL AND expires_at > ?",
            (&now, &user_id, &now),
        )
        .map_err(|e| db_write("db_update_failed", e, "password_reset_tokens"))?;

        let token = helpers::new_token_key();
        let token_hash = helpers::sha256_hex(&token);
        let expires_at = (chrono::Utc::now() + chrono::Duration::hours(1))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        conn.execute(
            "INSERT INTO password_reset_tokens(id, user_id, token_hash, created_at, expires_at)
             VALUES(?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &user_id,
                &token_hash,
                &now,
                &expires_at,
            ),
        )
        .map_err(|e| db_write("db_insert_failed", e, "password_reset_tokens"))?;

        if debug {
            result["token"] = json!(token);
            result["expiresAt"] = json!(expires_at);
        }
    }
    Ok(result)
}

fn confirm_password_reset(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let email = helpers::required_trimmed(&req.params, "email")?;
    let token = helpers::required_str(&req.params, "token")?;
    let new_password = helpers::required_str(&req.params, "newPassword")?;
    helpers::validate_password(&new_password)?;

    let user_id: Option<String> = conn
        .query_row("SELECT id FROM users WHERE email = ?", [&email], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(user_id) = user_id else {
        return Err(HandlerErr::bad_params("invalid token"));
    };

    let token_hash = helpers::sha256_hex(&token);
    let now = helpers::now_iso();
    let reset_id: Option<String> = conn
        .query_row(
            "SELECT id FROM password_reset_tokens
             WHERE user_id = ? AND token_hash = ? AND used_at IS NULL AND expires_at > ?",
            (&user_id, &token_hash, &now),
            |r| r.get(0),
        )
        .optional()?;
    let Some(reset_id) = reset_id else {
        return Err(HandlerErr::bad_params("invalid token"));
    };

    let salt = helpers::new_salt();
    let hash = helpers::hash_password(&salt, &new_password);
    conn.execute(
        "UPDATE users SET password_salt = ?, password_hash = ? WHERE id = ?",
        (&salt, &hash, &user_id),
    )
    .map_err(|e| db_write("db_update_failed", e, "users"))?;
    conn.execute(
        "UPDATE password_reset_tokens SET used_at = ? WHERE id = ?",
        (&now, &reset_id),
    )
    .map_err(|e| db_write("db_update_failed", e, "password_reset_tokens"))?;

    Ok(json!({ "success": true }))
}

fn me(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school = match ctx.profile.as_ref().and_then(|p| p.school_id.as_deref()) {
        Some(school_id) => conn
            .query_row(
                "SELECT id, name FROM schools WHERE id = ?",
                [school_id],
                |r| {
                    Ok(json!({
                        "id": r.get::<_, String>(0)?,
                        "name": r.get::<_, String>(1)?
                    }))
                },
            )
            .optional()?,
        None => None,
    };
    Ok(json!({
        "id": ctx.user_id,
        "username": ctx.username,
        "email": ctx.email,
        "role": ctx.role(),
        "studentId": ctx.profile.as_ref().and_then(|p| p.student_id.clone()),
        "school": school
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let debug = state.config.debug;
    match req.method.as_str() {
        "auth.register" => Some(helpers::run(state, req, |conn| register(conn, req))),
        "auth.login" => Some(helpers::run(state, req, |conn| login(conn, req))),
        "auth.logout" => Some(helpers::run(state, req, |conn| logout(conn, req))),
        "auth.refresh" => Some(helpers::run(state, req, |conn| refresh(conn, req))),
        "auth.revoke" => Some(helpers::run(state, req, |conn| revoke(conn, req))),
        "auth.requestPasswordReset" => Some(helpers::run(state, req, |conn| {
            request_password_reset(conn, req, debug)
        })),
        "auth.confirmPasswordReset" => {
            Some(helpers::run(state, req, |conn| confirm_password_reset(conn, req)))
        }
        "me.get" => Some(helpers::run(state, req, |conn| me(conn, req))),
        _ => None,
    }
}
