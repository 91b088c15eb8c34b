use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

fn school_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "name": r.get::<_, String>(1)?,
        "cnpj": r.get::<_, Option<String>>(2)?,
        "email": r.get::<_, String>(3)?,
        "phone": r.get::<_, String>(4)?,
        "addressLine1": r.get::<_, String>(5)?,
        "addressLine2": r.get::<_, String>(6)?,
        "city": r.get::<_, String>(7)?,
        "state": r.get::<_, String>(8)?,
        "postalCode": r.get::<_, String>(9)?,
        "createdAt": r.get::<_, String>(10)?,
    }))
}

const SCHOOL_COLS: &str =
    "id, name, cnpj, email, phone, address_line1, address_line2, city, state, postal_code, created_at";

fn load_school(conn: &Connection, school_id: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    let sql = format!("SELECT {} FROM schools WHERE id = ?", SCHOOL_COLS);
    Ok(conn.query_row(&sql, [school_id], school_row).optional()?)
}

fn schools_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let (_, page_size) = helpers::page_params(&req.params);

    let Some(school_id) = ctx.profile.as_ref().and_then(|p| p.school_id.clone()) else {
        return Ok(json!({
            "data": [],
            "pagination": { "page": 1, "pageSize": page_size, "total": 0, "totalPages": 0 }
        }));
    };
    let school = load_school(conn, &school_id)?;
    let data: Vec<serde_json::Value> = school.into_iter().collect();
    let total = data.len() as i64;
    Ok(json!({
        "data": data,
        "pagination": { "page": 1, "pageSize": page_size, "total": total, "totalPages": if total > 0 { 1 } else { 0 } }
    }))
}

fn schools_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let name = helpers::required_trimmed(&req.params, "name")?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])?;

    let cnpj = helpers::optional_str(&req.params, "cnpj").filter(|s| !s.trim().is_empty());
    let school_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO schools(id, name, cnpj, email, phone, address_line1, address_line2, city, state, postal_code, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &school_id,
            &name,
            cnpj.as_deref(),
            helpers::optional_str(&req.params, "email").unwrap_or_default(),
            helpers::optional_str(&req.params, "phone").unwrap_or_default(),
            helpers::optional_str(&req.params, "addressLine1").unwrap_or_default(),
            helpers::optional_str(&req.params, "addressLine2").unwrap_or_default(),
            helpers::optional_str(&req.params, "city").unwrap_or_default(),
            helpers::optional_str(&req.params, "state").unwrap_or_default(),
            helpers::optional_str(&req.params, "postalCode").unwrap_or_default(),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "schools"))?;

    // The creator becomes (or stays) an admin of the new school.
    match ctx.profile.as_ref() {
        Some(profile) => {
            conn.execute(
                "UPDATE user_profiles SET school_id = ?, role = ? WHERE id = ?",
                (&school_id, roles::ADMIN, &profile.id),
            )
            .map_err(|e| db_write("db_update_failed", e, "user_profiles"))?;
        }
        None => {
            conn.execute(
                "INSERT INTO user_profiles(id, user_id, school_id, role, created_at)
                 VALUES(?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &ctx.user_id,
                    &school_id,
                    roles::ADMIN,
                    helpers::now_iso(),
                ),
            )
            .map_err(|e| db_write("db_insert_failed", e, "user_profiles"))?;
        }
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "school_created", &name);
    let school = load_school(conn, &school_id)?
        .ok_or_else(|| HandlerErr::not_found("school not found"))?;
    Ok(json!({ "data": school }))
}

fn schools_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::required_str(&req.params, "schoolId")?;
    let own_school = ctx.profile.as_ref().and_then(|p| p.school_id.as_deref());
    if own_school != Some(school_id.as_str()) {
        return Err(HandlerErr::forbidden());
    }
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR])?;

    let existing = load_school(conn, &school_id)?
        .ok_or_else(|| HandlerErr::not_found("school not found"))?;

    let field = |key: &str, current: &str| -> String {
        helpers::optional_str(&req.params, key).unwrap_or_else(|| current.to_string())
    };
    let current = |key: &str| -> String {
        existing
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let cnpj = match req.params.get("cnpj") {
        Some(serde_json::Value::Null) => None,
        Some(v) => v.as_str().map(|s| s.to_string()),
        None => existing
            .get("cnpj")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    };

    conn.execute(
        "UPDATE schools SET name = ?, cnpj = ?, email = ?, phone = ?, address_line1 = ?, address_line2 = ?, city = ?, state = ?, postal_code = ?
         WHERE id = ?",
        (
            field("name", &current("name")),
            cnpj.as_deref(),
            field("email", &current("email")),
            field("phone", &current("phone")),
            field("addressLine1", &current("addressLine1")),
            field("addressLine2", &current("addressLine2")),
            field("city", &current("city")),
            field("state", &current("state")),
            field("postalCode", &current("postalCode")),
            &school_id,
        ),
    )
    .map_err(|e| db_write("db_update_failed", e, "schools"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "school_updated", &school_id);
    let school = load_school(conn, &school_id)?
        .ok_or_else(|| HandlerErr::not_found("school not found"))?;
    Ok(json!({ "data": school }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schools.list" => Some(helpers::run(state, req, |conn| schools_list(conn, req))),
        "schools.create" => Some(helpers::run(state, req, |conn| schools_create(conn, req))),
        "schools.update" => Some(helpers::run(state, req, |conn| schools_update(conn, req))),
        _ => None,
    }
}
