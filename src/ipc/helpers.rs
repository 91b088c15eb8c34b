use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

/// Shared dispatch wrapper: resolve the open database and shape the
/// ok/error envelope around a handler body.
pub fn run<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const DIRECTOR: &str = "director";
    pub const COORDINATOR: &str = "coordinator";
    pub const TEACHER: &str = "teacher";
    pub const STAFF: &str = "staff";
    pub const FINANCE: &str = "finance";
    pub const SUPPORT: &str = "support";
    pub const STUDENT: &str = "student";

    pub const ALL: [&str; 8] = [
        ADMIN, DIRECTOR, COORDINATOR, TEACHER, STAFF, FINANCE, SUPPORT, STUDENT,
    ];
}

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_field(message: impl Into<String>, field: &str) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: Some(json!({ "field": field })),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            code: "unauthorized",
            message: "invalid or missing token".to_string(),
            details: None,
        }
    }

    pub fn forbidden() -> Self {
        Self {
            code: "forbidden",
            message: "role not allowed for this operation".to_string(),
            details: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            code: "conflict",
            message: message.into(),
            details: None,
        }
    }

    pub fn no_school() -> Self {
        Self {
            code: "no_school",
            message: "school not configured for user".to_string(),
            details: None,
        }
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        Self {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }
}

pub fn db_write(code: &'static str, e: rusqlite::Error, table: &str) -> HandlerErr {
    HandlerErr {
        code,
        message: e.to_string(),
        details: Some(json!({ "table": table })),
    }
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub id: String,
    pub school_id: Option<String>,
    pub student_id: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub profile: Option<Profile>,
}

impl AuthContext {
    pub fn role(&self) -> Option<&str> {
        self.profile.as_ref().map(|p| p.role.as_str())
    }

    pub fn profile_id(&self) -> Option<&str> {
        self.profile.as_ref().map(|p| p.id.as_str())
    }
}

pub fn authenticate(conn: &Connection, req: &Request) -> Result<AuthContext, HandlerErr> {
    let Some(token) = req.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return Err(HandlerErr::unauthorized());
    };
    let user_id: Option<String> = conn
        .query_row(
            "SELECT user_id FROM api_tokens WHERE key = ?",
            [token],
            |r| r.get(0),
        )
        .optional()?;
    let Some(user_id) = user_id else {
        return Err(HandlerErr::unauthorized());
    };
    conn.execute(
        "UPDATE api_tokens SET last_used_at = ? WHERE key = ?",
        (&now_iso(), token),
    )?;
    load_auth_context(conn, &user_id)
}

pub fn load_auth_context(conn: &Connection, user_id: &str) -> Result<AuthContext, HandlerErr> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT username, email FROM users WHERE id = ?",
            [user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((username, email)) = row else {
        return Err(HandlerErr::unauthorized());
    };
    let profile = conn
        .query_row(
            "SELECT id, school_id, student_id, role FROM user_profiles WHERE user_id = ?",
            [user_id],
            |r| {
                Ok(Profile {
                    id: r.get(0)?,
                    school_id: r.get(1)?,
                    student_id: r.get(2)?,
                    role: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(AuthContext {
        user_id: user_id.to_string(),
        username,
        email,
        profile,
    })
}

pub fn require_school(ctx: &AuthContext) -> Result<String, HandlerErr> {
    ctx.profile
        .as_ref()
        .and_then(|p| p.school_id.clone())
        .ok_or_else(HandlerErr::no_school)
}

pub fn require_roles(ctx: &AuthContext, allowed: &[&str]) -> Result<(), HandlerErr> {
    match ctx.role() {
        Some(role) if allowed.contains(&role) => Ok(()),
        _ => Err(HandlerErr::forbidden()),
    }
}

/// Resolve a teacher reference to a profile. Callers pass either the profile
/// id or the user id; both spellings are accepted across the API.
pub fn find_teacher_profile(
    conn: &Connection,
    school_id: &str,
    ident: &str,
) -> Result<Option<Profile>, HandlerErr> {
    let profile = conn
        .query_row(
            "SELECT p.id, p.school_id, p.student_id, p.role
             FROM user_profiles p
             WHERE p.school_id = ? AND p.role = 'teacher' AND (p.id = ? OR p.user_id = ?)",
            (school_id, ident, ident),
            |r| {
                Ok(Profile {
                    id: r.get(0)?,
                    school_id: r.get(1)?,
                    student_id: r.get(2)?,
                    role: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(profile)
}

/// Display name of a profile's user, falling back to the username. Empty
/// string when the profile (or its user) no longer exists.
pub fn profile_name(conn: &Connection, profile_id: Option<&str>) -> Result<String, HandlerErr> {
    let Some(profile_id) = profile_id else {
        return Ok(String::new());
    };
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT u.first_name, u.last_name, u.username
             FROM user_profiles p
             JOIN users u ON u.id = p.user_id
             WHERE p.id = ?",
            [profile_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    Ok(row
        .map(|(first, last, username)| display_name(&first, &last, &username))
        .unwrap_or_default())
}

pub fn display_name(first: &str, last: &str, username: &str) -> String {
    let name = format!("{} {}", first, last).trim().to_string();
    if name.is_empty() {
        username.to_string()
    } else {
        name
    }
}

pub fn log_action(conn: &Connection, school_id: &str, profile_id: Option<&str>, action: &str, detail: &str) {
    let res = conn.execute(
        "INSERT INTO audit_logs(id, school_id, user_profile_id, action, detail, ip_address, created_at)
         VALUES(?, ?, ?, ?, ?, '', ?)",
        (
            Uuid::new_v4().to_string(),
            school_id,
            profile_id,
            action,
            detail,
            now_iso(),
        ),
    );
    if let Err(e) = res {
        tracing::warn!(action, error = %e, "failed to write audit log entry");
    }
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn required_trimmed(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let value = required_str(params, key)?.trim().to_string();
    if value.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(value)
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn optional_bool(params: &serde_json::Value, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}

pub fn optional_i64(params: &serde_json::Value, key: &str) -> Option<i64> {
    let v = params.get(key)?;
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str().and_then(|s| s.trim().parse::<i64>().ok())
}

pub fn validate_choice(value: &str, allowed: &[&str], field: &str) -> Result<(), HandlerErr> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(HandlerErr {
        code: "bad_params",
        message: "invalid value".to_string(),
        details: Some(json!({ "field": field, "allowed": allowed })),
    })
}

pub fn validate_password(password: &str) -> Result<(), HandlerErr> {
    if password.len() < 8 {
        return Err(HandlerErr {
            code: "bad_params",
            message: "password too short".to_string(),
            details: Some(json!({ "minLength": 8 })),
        });
    }
    Ok(())
}

fn parse_date(value: &str, field: &str) -> Result<String, HandlerErr> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| HandlerErr::bad_field("invalid date", field))
}

pub fn optional_date_param(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_field("invalid date", key));
            };
            if s.trim().is_empty() {
                return Ok(None);
            }
            parse_date(s, key).map(Some)
        }
    }
}

pub fn required_date_param(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let value = required_str(params, key)?;
    parse_date(&value, key)
}

pub fn optional_datetime_param(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_field("invalid datetime", key));
            };
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            let parsed = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ"))
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                .map_err(|_| HandlerErr::bad_field("invalid datetime", key))?;
            Ok(Some(parsed.format("%Y-%m-%dT%H:%M:%S").to_string()))
        }
    }
}

fn parse_time(value: &str, field: &str) -> Result<String, HandlerErr> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| HandlerErr::bad_field("invalid time", field))
}

pub fn required_time_param(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let value = required_str(params, key)?;
    parse_time(&value, key)
}

pub fn optional_time_param(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_field("invalid time", key));
            };
            if s.trim().is_empty() {
                return Ok(None);
            }
            parse_time(s, key).map(Some)
        }
    }
}

fn amount_from_value(v: &serde_json::Value, field: &str) -> Result<f64, HandlerErr> {
    if let Some(n) = v.as_f64() {
        return Ok(n);
    }
    v.as_str()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or_else(|| HandlerErr::bad_field("invalid amount", field))
}

pub fn required_amount(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Err(HandlerErr::bad_field("invalid amount", key));
    };
    amount_from_value(v, key)
}

/// Grades are accepted as numbers or numeric strings on a 0..=10 scale.
pub fn optional_grade_param(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            if v.as_str().map(|s| s.trim().is_empty()) == Some(true) {
                return Ok(None);
            }
            let grade = amount_from_value(v, key)
                .map_err(|_| HandlerErr::bad_field("invalid grade", key))?;
            if !(0.0..=10.0).contains(&grade) {
                return Err(HandlerErr::bad_field("grade out of range", key));
            }
            Ok(Some(grade))
        }
    }
}

pub fn day_of_week_param(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    let day = optional_i64(params, key)
        .ok_or_else(|| HandlerErr::bad_params("invalid dayOfWeek"))?;
    if !(0..=6).contains(&day) {
        return Err(HandlerErr::bad_params("invalid dayOfWeek"));
    }
    Ok(day)
}

pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_password(salt: &str, password: &str) -> String {
    sha256_hex(&format!("{}:{}", salt, password))
}

pub fn new_token_key() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

pub fn generate_password() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

pub fn issue_token(conn: &Connection, user_id: &str) -> Result<String, HandlerErr> {
    let key = new_token_key();
    conn.execute(
        "INSERT INTO api_tokens(key, user_id, created_at) VALUES(?, ?, ?)",
        (&key, user_id, now_iso()),
    )
    .map_err(|e| db_write("db_insert_failed", e, "api_tokens"))?;
    Ok(key)
}

pub fn like_pattern(needle: &str) -> String {
    format!("%{}%", needle)
}

pub fn page_params(params: &serde_json::Value) -> (i64, i64) {
    let page = optional_i64(params, "page").unwrap_or(1).max(1);
    let page_size = optional_i64(params, "pageSize").unwrap_or(25).clamp(1, 100);
    (page, page_size)
}

/// Run a filtered list as a count + windowed select, shaping the standard
/// paginated response. `select_sql` must not carry LIMIT/OFFSET; both
/// queries share `binds`. An out-of-range page clamps to the last page.
pub fn paged<F>(
    conn: &Connection,
    params: &serde_json::Value,
    count_sql: &str,
    select_sql: &str,
    binds: &[SqlValue],
    map: F,
) -> Result<serde_json::Value, HandlerErr>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<serde_json::Value>,
{
    let (page, page_size) = page_params(params);

    let total: i64 = conn.query_row(count_sql, params_from_iter(binds.iter()), |r| r.get(0))?;
    if total == 0 {
        return Ok(json!({
            "data": [],
            "pagination": { "page": 1, "pageSize": page_size, "total": 0, "totalPages": 0 }
        }));
    }

    let total_pages = (total + page_size - 1) / page_size;
    let page = page.min(total_pages);
    let offset = (page - 1) * page_size;

    let sql = format!("{} LIMIT ? OFFSET ?", select_sql);
    let mut all_binds: Vec<SqlValue> = binds.to_vec();
    all_binds.push(SqlValue::Integer(page_size));
    all_binds.push(SqlValue::Integer(offset));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(all_binds.iter()), map)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({
        "data": rows,
        "pagination": {
            "page": page,
            "pageSize": page_size,
            "total": total,
            "totalPages": total_pages
        }
    }))
}
