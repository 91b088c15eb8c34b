use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const CATEGORIES: [&str; 4] = ["Stationery", "Cleaning", "Electronics", "Didactic"];

const INVENTORY_ROLES: [&str; 5] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::SUPPORT,
    roles::STAFF,
    roles::FINANCE,
];

fn item_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "schoolId": r.get::<_, String>(1)?,
        "name": r.get::<_, String>(2)?,
        "category": r.get::<_, String>(3)?,
        "quantity": r.get::<_, i64>(4)?,
        "minQuantity": r.get::<_, i64>(5)?,
        "unit": r.get::<_, String>(6)?,
        "location": r.get::<_, String>(7)?,
        "lastUpdated": r.get::<_, String>(8)?,
        "createdAt": r.get::<_, String>(9)?,
    }))
}

const ITEM_COLS: &str =
    "id, school_id, name, category, quantity, min_quantity, unit, location, updated_at, created_at";

fn load_item(
    conn: &Connection,
    school_id: &str,
    item_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM inventory_items WHERE id = ? AND school_id = ?",
        ITEM_COLS
    );
    conn.query_row(&sql, (item_id, school_id), item_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("inventory item not found"))
}

fn inventory_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(category) = helpers::optional_str(&req.params, "category") {
        where_sql.push_str(" AND category = ?");
        binds.push(SqlValue::Text(category));
    }
    if helpers::optional_bool(&req.params, "lowStock").unwrap_or(false) {
        where_sql.push_str(" AND quantity <= min_quantity");
    }
    if let Some(q) = helpers::optional_str(&req.params, "q") {
        where_sql.push_str(" AND name LIKE ?");
        binds.push(SqlValue::Text(helpers::like_pattern(&q)));
    }

    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) FROM inventory_items {}", where_sql),
        &format!(
            "SELECT {} FROM inventory_items {} ORDER BY name",
            ITEM_COLS, where_sql
        ),
        &binds,
        item_row,
    )
}

fn inventory_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &INVENTORY_ROLES)?;

    let name = helpers::required_trimmed(&req.params, "name")?;
    let category = helpers::required_str(&req.params, "category")?;
    helpers::validate_choice(&category, &CATEGORIES, "category")?;

    let item_id = Uuid::new_v4().to_string();
    let now = helpers::now_iso();
    conn.execute(
        "INSERT INTO inventory_items(id, school_id, name, category, quantity, min_quantity, unit, location, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &item_id,
            &school_id,
            &name,
            &category,
            helpers::optional_i64(&req.params, "quantity").unwrap_or(0),
            helpers::optional_i64(&req.params, "minQuantity").unwrap_or(0),
            helpers::optional_str(&req.params, "unit").unwrap_or_default(),
            helpers::optional_str(&req.params, "location").unwrap_or_default(),
            &now,
            &now,
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "inventory_items"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "inventory_created", &item_id);
    let item = load_item(conn, &school_id, &item_id)?;
    Ok(json!({ "data": item }))
}

fn inventory_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let item_id = helpers::required_str(&req.params, "itemId")?;
    load_item(conn, &school_id, &item_id)?;
    helpers::require_roles(&ctx, &INVENTORY_ROLES)?;

    if let Some(name) = helpers::optional_str(&req.params, "name") {
        conn.execute(
            "UPDATE inventory_items SET name = ? WHERE id = ?",
            (&name, &item_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "inventory_items"))?;
    }
    if let Some(category) = helpers::optional_str(&req.params, "category") {
        helpers::validate_choice(&category, &CATEGORIES, "category")?;
        conn.execute(
            "UPDATE inventory_items SET category = ? WHERE id = ?",
            (&category, &item_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "inventory_items"))?;
    }
    if let Some(quantity) = helpers::optional_i64(&req.params, "quantity") {
        conn.execute(
            "UPDATE inventory_items SET quantity = ? WHERE id = ?",
            (quantity, &item_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "inventory_items"))?;
    }
    if let Some(min_quantity) = helpers::optional_i64(&req.params, "minQuantity") {
        conn.execute(
            "UPDATE inventory_items SET min_quantity = ? WHERE id = ?",
            (min_quantity, &item_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "inventory_items"))?;
    }
    for (key, column) in [("unit", "unit"), ("location", "location")] {
        if let Some(value) = helpers::optional_str(&req.params, key) {
            let sql = format!("UPDATE inventory_items SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &item_id))
                .map_err(|e| db_write("db_update_failed", e, "inventory_items"))?;
        }
    }
    conn.execute(
        "UPDATE inventory_items SET updated_at = ? WHERE id = ?",
        (helpers::now_iso(), &item_id),
    )
    .map_err(|e| db_write("db_update_failed", e, "inventory_items"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "inventory_updated", &item_id);
    let item = load_item(conn, &school_id, &item_id)?;
    Ok(json!({ "data": item }))
}

fn inventory_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let item_id = helpers::required_str(&req.params, "itemId")?;
    load_item(conn, &school_id, &item_id)?;
    helpers::require_roles(&ctx, &INVENTORY_ROLES)?;

    conn.execute("DELETE FROM inventory_items WHERE id = ?", [&item_id])
        .map_err(|e| db_write("db_delete_failed", e, "inventory_items"))?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "inventory_deleted", &item_id);
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "inventory.list" => Some(helpers::run(state, req, |conn| inventory_list(conn, req))),
        "inventory.create" => Some(helpers::run(state, req, |conn| inventory_create(conn, req))),
        "inventory.update" => Some(helpers::run(state, req, |conn| inventory_update(conn, req))),
        "inventory.delete" => Some(helpers::run(state, req, |conn| inventory_delete(conn, req))),
        _ => None,
    }
}
