use crate::ipc::handlers::classrooms::classroom_in_school;
use crate::ipc::helpers::{self, db_write, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

const SLOT_ROLES: [&str; 3] = [roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR];
const AVAILABILITY_ROLES: [&str; 4] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::TEACHER,
];
const SCHEDULE_SET_ROLES: [&str; 5] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::STAFF,
    roles::TEACHER,
];
const SCHEDULE_EDIT_ROLES: [&str; 4] = [
    roles::ADMIN,
    roles::DIRECTOR,
    roles::COORDINATOR,
    roles::STAFF,
];

fn slot_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "schoolId": r.get::<_, String>(1)?,
        "label": r.get::<_, String>(2)?,
        "startTime": r.get::<_, String>(3)?,
        "endTime": r.get::<_, String>(4)?,
        "sortOrder": r.get::<_, i64>(5)?,
        "createdAt": r.get::<_, String>(6)?,
    }))
}

const SLOT_COLS: &str = "id, school_id, label, start_time, end_time, sort_order, created_at";

fn load_slot(
    conn: &Connection,
    school_id: &str,
    slot_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM time_slots WHERE id = ? AND school_id = ?",
        SLOT_COLS
    );
    conn.query_row(&sql, (slot_id, school_id), slot_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("time slot not found"))
}

fn slot_in_school(
    conn: &Connection,
    school_id: &str,
    slot_id: &str,
) -> Result<bool, HandlerErr> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM time_slots WHERE id = ? AND school_id = ?",
            (slot_id, school_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn time_slots_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    helpers::paged(
        conn,
        &req.params,
        "SELECT COUNT(*) FROM time_slots WHERE school_id = ?",
        &format!(
            "SELECT {} FROM time_slots WHERE school_id = ? ORDER BY sort_order, start_time",
            SLOT_COLS
        ),
        &binds,
        slot_row,
    )
}

fn time_slots_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &SLOT_ROLES)?;

    let start_time = helpers::required_time_param(&req.params, "startTime")?;
    let end_time = helpers::required_time_param(&req.params, "endTime")?;
    if end_time <= start_time {
        return Err(HandlerErr::bad_params("endTime must be after startTime"));
    }
    let sort_order = helpers::optional_i64(&req.params, "sortOrder").unwrap_or(0);

    let slot_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO time_slots(id, school_id, label, start_time, end_time, sort_order, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &slot_id,
            &school_id,
            helpers::optional_str(&req.params, "label").unwrap_or_default(),
            &start_time,
            &end_time,
            sort_order,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "time_slots"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "time_slot_created", &slot_id);
    let slot = load_slot(conn, &school_id, &slot_id)?;
    Ok(json!({ "data": slot }))
}

fn time_slots_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let slot_id = helpers::required_str(&req.params, "slotId")?;
    let existing = load_slot(conn, &school_id, &slot_id)?;
    helpers::require_roles(&ctx, &SLOT_ROLES)?;

    if let Some(label) = helpers::optional_str(&req.params, "label") {
        conn.execute(
            "UPDATE time_slots SET label = ? WHERE id = ?",
            (&label, &slot_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "time_slots"))?;
    }
    let mut start_time = existing
        .get("startTime")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let mut end_time = existing
        .get("endTime")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if let Some(t) = helpers::optional_time_param(&req.params, "startTime")? {
        start_time = t;
    }
    if let Some(t) = helpers::optional_time_param(&req.params, "endTime")? {
        end_time = t;
    }
    if end_time <= start_time {
        return Err(HandlerErr::bad_params("endTime must be after startTime"));
    }
    conn.execute(
        "UPDATE time_slots SET start_time = ?, end_time = ? WHERE id = ?",
        (&start_time, &end_time, &slot_id),
    )
    .map_err(|e| db_write("db_update_failed", e, "time_slots"))?;
    if let Some(sort_order) = helpers::optional_i64(&req.params, "sortOrder") {
        conn.execute(
            "UPDATE time_slots SET sort_order = ? WHERE id = ?",
            (sort_order, &slot_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "time_slots"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "time_slot_updated", &slot_id);
    let slot = load_slot(conn, &school_id, &slot_id)?;
    Ok(json!({ "data": slot }))
}

fn time_slots_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let slot_id = helpers::required_str(&req.params, "slotId")?;
    load_slot(conn, &school_id, &slot_id)?;
    helpers::require_roles(&ctx, &SLOT_ROLES)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_write("db_tx_failed", e, "time_slots"))?;
    for (sql, table) in [
        (
            "DELETE FROM teacher_availability WHERE time_slot_id = ?",
            "teacher_availability",
        ),
        (
            "DELETE FROM class_schedule_entries WHERE time_slot_id = ?",
            "class_schedule_entries",
        ),
        ("DELETE FROM time_slots WHERE id = ?", "time_slots"),
    ] {
        if let Err(e) = tx.execute(sql, [&slot_id]) {
            return Err(db_write("db_delete_failed", e, table));
        }
    }
    tx.commit()
        .map_err(|e| db_write("db_commit_failed", e, "time_slots"))?;

    helpers::log_action(conn, &school_id, ctx.profile_id(), "time_slot_deleted", &slot_id);
    Ok(json!({ "success": true }))
}

fn availability_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "teacherId": r.get::<_, String>(1)?,
        "timeSlotId": r.get::<_, String>(2)?,
        "dayOfWeek": r.get::<_, i64>(3)?,
        "createdAt": r.get::<_, String>(4)?,
    }))
}

const AVAILABILITY_COLS: &str =
    "av.id, p.user_id, av.time_slot_id, av.day_of_week, av.created_at";

fn availability_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE p.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(teacher_id) = helpers::optional_str(&req.params, "teacherId") {
        where_sql.push_str(" AND (p.id = ? OR p.user_id = ?)");
        binds.push(SqlValue::Text(teacher_id.clone()));
        binds.push(SqlValue::Text(teacher_id));
    }
    if req.params.get("dayOfWeek").is_some() {
        let day = helpers::day_of_week_param(&req.params, "dayOfWeek")?;
        where_sql.push_str(" AND av.day_of_week = ?");
        binds.push(SqlValue::Integer(day));
    }

    let from = "FROM teacher_availability av
         JOIN user_profiles p ON p.id = av.teacher_profile_id
         JOIN time_slots t ON t.id = av.time_slot_id";
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", from, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY av.day_of_week, t.sort_order",
            AVAILABILITY_COLS, from, where_sql
        ),
        &binds,
        availability_row,
    )
}

fn availability_set(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &AVAILABILITY_ROLES)?;

    let day = helpers::day_of_week_param(&req.params, "dayOfWeek")?;
    let slot_id = helpers::required_str(&req.params, "timeSlotId")?;
    if !slot_in_school(conn, &school_id, &slot_id)? {
        return Err(HandlerErr::bad_params("invalid time slot"));
    }

    // Teachers can only block out their own calendar.
    let teacher = if ctx.role() == Some(roles::TEACHER) {
        ctx.profile.clone()
    } else {
        let teacher_ident = helpers::required_str(&req.params, "teacherId")?;
        helpers::find_teacher_profile(conn, &school_id, &teacher_ident)?
    };
    let Some(teacher) = teacher else {
        return Err(HandlerErr::bad_params("invalid teacher"));
    };

    conn.execute(
        "INSERT INTO teacher_availability(id, teacher_profile_id, time_slot_id, day_of_week, created_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(teacher_profile_id, time_slot_id, day_of_week) DO NOTHING",
        (
            Uuid::new_v4().to_string(),
            &teacher.id,
            &slot_id,
            day,
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "teacher_availability"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "availability_set",
        &format!("teacher={} day={} slot={}", teacher.id, day, slot_id),
    );
    let sql = format!(
        "SELECT {} FROM teacher_availability av
         JOIN user_profiles p ON p.id = av.teacher_profile_id
         WHERE av.teacher_profile_id = ? AND av.time_slot_id = ? AND av.day_of_week = ?",
        AVAILABILITY_COLS
    );
    let availability = conn.query_row(&sql, (&teacher.id, &slot_id, day), availability_row)?;
    Ok(json!({ "data": availability }))
}

fn load_availability(
    conn: &Connection,
    school_id: &str,
    availability_id: &str,
) -> Result<(String, String), HandlerErr> {
    // Returns (row id, owning teacher's user id).
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT av.id, p.user_id
             FROM teacher_availability av
             JOIN user_profiles p ON p.id = av.teacher_profile_id
             WHERE av.id = ? AND p.school_id = ?",
            (availability_id, school_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    row.ok_or_else(|| HandlerErr::not_found("availability not found"))
}

fn availability_guard(
    conn: &Connection,
    ctx: &helpers::AuthContext,
    school_id: &str,
    owner_user_id: &str,
) -> Result<(), HandlerErr> {
    // A teacher may only touch their own rows.
    if owner_user_id != ctx.user_id {
        let is_teacher: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM user_profiles WHERE user_id = ? AND school_id = ? AND role = 'teacher'",
                (&ctx.user_id, school_id),
                |r| r.get(0),
            )
            .optional()?;
        if is_teacher.is_some() {
            return Err(HandlerErr::forbidden());
        }
    }
    Ok(())
}

fn availability_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let availability_id = helpers::required_str(&req.params, "availabilityId")?;
    let (_, owner_user_id) = load_availability(conn, &school_id, &availability_id)?;
    helpers::require_roles(&ctx, &AVAILABILITY_ROLES)?;
    availability_guard(conn, &ctx, &school_id, &owner_user_id)?;

    if req.params.get("dayOfWeek").is_some() {
        let day = helpers::day_of_week_param(&req.params, "dayOfWeek")?;
        conn.execute(
            "UPDATE teacher_availability SET day_of_week = ? WHERE id = ?",
            (day, &availability_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "teacher_availability"))?;
    }
    if let Some(slot_id) = helpers::optional_str(&req.params, "timeSlotId") {
        if !slot_in_school(conn, &school_id, &slot_id)? {
            return Err(HandlerErr::bad_params("invalid time slot"));
        }
        conn.execute(
            "UPDATE teacher_availability SET time_slot_id = ? WHERE id = ?",
            (&slot_id, &availability_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "teacher_availability"))?;
    }

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "availability_updated",
        &availability_id,
    );
    let sql = format!(
        "SELECT {} FROM teacher_availability av
         JOIN user_profiles p ON p.id = av.teacher_profile_id
         WHERE av.id = ?",
        AVAILABILITY_COLS
    );
    let availability = conn.query_row(&sql, [&availability_id], availability_row)?;
    Ok(json!({ "data": availability }))
}

fn availability_remove(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let availability_id = helpers::required_str(&req.params, "availabilityId")?;
    let (_, owner_user_id) = load_availability(conn, &school_id, &availability_id)?;
    helpers::require_roles(&ctx, &AVAILABILITY_ROLES)?;
    availability_guard(conn, &ctx, &school_id, &owner_user_id)?;

    conn.execute(
        "DELETE FROM teacher_availability WHERE id = ?",
        [&availability_id],
    )
    .map_err(|e| db_write("db_delete_failed", e, "teacher_availability"))?;
    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "availability_deleted",
        &availability_id,
    );
    Ok(json!({ "success": true }))
}

/// The three slot checks the scheduler enforces: a slot/day belongs to at
/// most one classroom per school, a teacher can't be in two rooms at once,
/// and a blocked slot can't be assigned at all.
fn check_schedule_conflicts(
    conn: &Connection,
    school_id: &str,
    classroom_id: Option<&str>,
    teacher_profile_id: Option<&str>,
    day: i64,
    slot_id: &str,
) -> Result<(), HandlerErr> {
    let classroom_conflict: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM class_schedule_entries e
             JOIN classrooms c ON c.id = e.classroom_id
             WHERE c.school_id = ? AND e.day_of_week = ? AND e.time_slot_id = ?
               AND (? IS NULL OR e.classroom_id != ?)
             LIMIT 1",
            (school_id, day, slot_id, classroom_id, classroom_id),
            |r| r.get(0),
        )
        .optional()?;
    if classroom_conflict.is_some() {
        return Err(HandlerErr::conflict("classroom slot already occupied"));
    }

    if let Some(teacher_id) = teacher_profile_id {
        let teacher_conflict: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM class_schedule_entries e
                 JOIN classrooms c ON c.id = e.classroom_id
                 WHERE c.school_id = ? AND e.teacher_profile_id = ?
                   AND e.day_of_week = ? AND e.time_slot_id = ?
                   AND (? IS NULL OR e.classroom_id != ?)
                 LIMIT 1",
                (school_id, teacher_id, day, slot_id, classroom_id, classroom_id),
                |r| r.get(0),
            )
            .optional()?;
        if teacher_conflict.is_some() {
            return Err(HandlerErr::conflict("teacher slot already occupied"));
        }

        let blocked: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM teacher_availability
                 WHERE teacher_profile_id = ? AND day_of_week = ? AND time_slot_id = ?",
                (teacher_id, day, slot_id),
                |r| r.get(0),
            )
            .optional()?;
        if blocked.is_some() {
            return Err(HandlerErr::conflict("teacher unavailable in this slot"));
        }
    }
    Ok(())
}

fn schedule_row(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "classroomId": r.get::<_, String>(1)?,
        "timeSlotId": r.get::<_, String>(2)?,
        "dayOfWeek": r.get::<_, i64>(3)?,
        "subject": r.get::<_, String>(4)?,
        "teacherId": r.get::<_, Option<String>>(5)?,
        "createdAt": r.get::<_, String>(6)?,
    }))
}

const SCHEDULE_COLS: &str = "e.id, e.classroom_id, e.time_slot_id, e.day_of_week, e.subject,
             p.user_id, e.created_at";

const SCHEDULE_FROM: &str = "FROM class_schedule_entries e
         JOIN classrooms c ON c.id = e.classroom_id
         JOIN time_slots t ON t.id = e.time_slot_id
         LEFT JOIN user_profiles p ON p.id = e.teacher_profile_id";

fn schedules_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;

    let mut where_sql = "WHERE c.school_id = ?".to_string();
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(school_id)];
    if let Some(classroom_id) = helpers::optional_str(&req.params, "classroomId") {
        where_sql.push_str(" AND e.classroom_id = ?");
        binds.push(SqlValue::Text(classroom_id));
    }
    if let Some(teacher_id) = helpers::optional_str(&req.params, "teacherId") {
        where_sql.push_str(" AND (p.id = ? OR p.user_id = ?)");
        binds.push(SqlValue::Text(teacher_id.clone()));
        binds.push(SqlValue::Text(teacher_id));
    }
    if req.params.get("dayOfWeek").is_some() {
        let day = helpers::day_of_week_param(&req.params, "dayOfWeek")?;
        where_sql.push_str(" AND e.day_of_week = ?");
        binds.push(SqlValue::Integer(day));
    }

    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", SCHEDULE_FROM, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY e.day_of_week, t.sort_order",
            SCHEDULE_COLS, SCHEDULE_FROM, where_sql
        ),
        &binds,
        schedule_row,
    )
}

fn schedules_set(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    helpers::require_roles(&ctx, &SCHEDULE_SET_ROLES)?;

    let classroom_id = helpers::required_str(&req.params, "classroomId")?;
    let slot_id = helpers::required_str(&req.params, "timeSlotId")?;
    let subject = helpers::required_trimmed(&req.params, "subject")?;
    let day = helpers::day_of_week_param(&req.params, "dayOfWeek")?;

    if !classroom_in_school(conn, &school_id, &classroom_id)? {
        return Err(HandlerErr::bad_params("invalid classroom"));
    }
    if !slot_in_school(conn, &school_id, &slot_id)? {
        return Err(HandlerErr::bad_params("invalid time slot"));
    }

    let mut teacher_profile_id: Option<String> = None;
    if let Some(teacher_ident) = helpers::optional_str(&req.params, "teacherId") {
        let teacher = helpers::find_teacher_profile(conn, &school_id, &teacher_ident)?
            .ok_or_else(|| HandlerErr::bad_params("invalid teacher"))?;
        teacher_profile_id = Some(teacher.id);
    }

    check_schedule_conflicts(
        conn,
        &school_id,
        Some(&classroom_id),
        teacher_profile_id.as_deref(),
        day,
        &slot_id,
    )?;

    conn.execute(
        "INSERT INTO class_schedule_entries(id, classroom_id, time_slot_id, day_of_week, subject, teacher_profile_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(classroom_id, time_slot_id, day_of_week) DO UPDATE SET
           subject = excluded.subject,
           teacher_profile_id = excluded.teacher_profile_id",
        (
            Uuid::new_v4().to_string(),
            &classroom_id,
            &slot_id,
            day,
            &subject,
            teacher_profile_id.as_deref(),
            helpers::now_iso(),
        ),
    )
    .map_err(|e| db_write("db_insert_failed", e, "class_schedule_entries"))?;

    helpers::log_action(
        conn,
        &school_id,
        ctx.profile_id(),
        "schedule_set",
        &format!("classroom={} day={} slot={}", classroom_id, day, slot_id),
    );
    let sql = format!(
        "SELECT {} {} WHERE e.classroom_id = ? AND e.time_slot_id = ? AND e.day_of_week = ?",
        SCHEDULE_COLS, SCHEDULE_FROM
    );
    let entry = conn.query_row(&sql, (&classroom_id, &slot_id, day), schedule_row)?;
    Ok(json!({ "data": entry }))
}

struct ScheduleEntry {
    classroom_id: String,
    time_slot_id: String,
    day_of_week: i64,
    teacher_profile_id: Option<String>,
}

fn load_schedule_entry(
    conn: &Connection,
    school_id: &str,
    schedule_id: &str,
) -> Result<ScheduleEntry, HandlerErr> {
    let entry: Option<ScheduleEntry> = conn
        .query_row(
            "SELECT e.classroom_id, e.time_slot_id, e.day_of_week, e.teacher_profile_id
             FROM class_schedule_entries e
             JOIN classrooms c ON c.id = e.classroom_id
             WHERE e.id = ? AND c.school_id = ?",
            (schedule_id, school_id),
            |r| {
                Ok(ScheduleEntry {
                    classroom_id: r.get(0)?,
                    time_slot_id: r.get(1)?,
                    day_of_week: r.get(2)?,
                    teacher_profile_id: r.get(3)?,
                })
            },
        )
        .optional()?;
    entry.ok_or_else(|| HandlerErr::not_found("schedule entry not found"))
}

fn schedules_update(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let schedule_id = helpers::required_str(&req.params, "scheduleId")?;
    let mut entry = load_schedule_entry(conn, &school_id, &schedule_id)?;
    helpers::require_roles(&ctx, &SCHEDULE_EDIT_ROLES)?;

    if req.params.get("dayOfWeek").is_some() {
        entry.day_of_week = helpers::day_of_week_param(&req.params, "dayOfWeek")?;
    }
    if let Some(slot_id) = helpers::optional_str(&req.params, "timeSlotId") {
        if !slot_in_school(conn, &school_id, &slot_id)? {
            return Err(HandlerErr::bad_params("invalid time slot"));
        }
        entry.time_slot_id = slot_id;
    }
    match req.params.get("teacherId") {
        Some(serde_json::Value::Null) => entry.teacher_profile_id = None,
        Some(v) => {
            let Some(teacher_ident) = v.as_str() else {
                return Err(HandlerErr::bad_params("teacherId must be a string or null"));
            };
            let teacher = helpers::find_teacher_profile(conn, &school_id, teacher_ident)?
                .ok_or_else(|| HandlerErr::bad_params("invalid teacher"))?;
            entry.teacher_profile_id = Some(teacher.id);
        }
        None => {}
    }

    check_schedule_conflicts(
        conn,
        &school_id,
        Some(&entry.classroom_id),
        entry.teacher_profile_id.as_deref(),
        entry.day_of_week,
        &entry.time_slot_id,
    )?;

    conn.execute(
        "UPDATE class_schedule_entries
         SET time_slot_id = ?, day_of_week = ?, teacher_profile_id = ?
         WHERE id = ?",
        (
            &entry.time_slot_id,
            entry.day_of_week,
            entry.teacher_profile_id.as_deref(),
            &schedule_id,
        ),
    )
    .map_err(|e| db_write("db_update_failed", e, "class_schedule_entries"))?;
    if let Some(subject) = helpers::optional_str(&req.params, "subject") {
        conn.execute(
            "UPDATE class_schedule_entries SET subject = ? WHERE id = ?",
            (&subject, &schedule_id),
        )
        .map_err(|e| db_write("db_update_failed", e, "class_schedule_entries"))?;
    }

    helpers::log_action(conn, &school_id, ctx.profile_id(), "schedule_updated", &schedule_id);
    let sql = format!(
        "SELECT {} {} WHERE e.id = ?",
        SCHEDULE_COLS, SCHEDULE_FROM
    );
    let entry = conn.query_row(&sql, [&schedule_id], schedule_row)?;
    Ok(json!({ "data": entry }))
}

fn schedules_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let schedule_id = helpers::required_str(&req.params, "scheduleId")?;
    load_schedule_entry(conn, &school_id, &schedule_id)?;
    helpers::require_roles(&ctx, &SCHEDULE_EDIT_ROLES)?;

    conn.execute(
        "DELETE FROM class_schedule_entries WHERE id = ?",
        [&schedule_id],
    )
    .map_err(|e| db_write("db_delete_failed", e, "class_schedule_entries"))?;
    helpers::log_action(conn, &school_id, ctx.profile_id(), "schedule_deleted", &schedule_id);
    Ok(json!({ "success": true }))
}

fn schedules_for_teacher(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    let school_id = helpers::require_school(&ctx)?;
    let teacher_id = helpers::required_str(&req.params, "teacherId")?;

    let where_sql = "WHERE c.school_id = ? AND (p.id = ? OR p.user_id = ?)";
    let binds: Vec<SqlValue> = vec![
        SqlValue::Text(school_id),
        SqlValue::Text(teacher_id.clone()),
        SqlValue::Text(teacher_id),
    ];
    helpers::paged(
        conn,
        &req.params,
        &format!("SELECT COUNT(*) {} {}", SCHEDULE_FROM, where_sql),
        &format!(
            "SELECT {} {} {} ORDER BY e.day_of_week, t.sort_order",
            SCHEDULE_COLS, SCHEDULE_FROM, where_sql
        ),
        &binds,
        schedule_row,
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timeSlots.list" => Some(helpers::run(state, req, |conn| time_slots_list(conn, req))),
        "timeSlots.create" => Some(helpers::run(state, req, |conn| time_slots_create(conn, req))),
        "timeSlots.update" => Some(helpers::run(state, req, |conn| time_slots_update(conn, req))),
        "timeSlots.delete" => Some(helpers::run(state, req, |conn| time_slots_delete(conn, req))),
        "availability.list" => Some(helpers::run(state, req, |conn| availability_list(conn, req))),
        "availability.set" => Some(helpers::run(state, req, |conn| availability_set(conn, req))),
        "availability.update" => {
            Some(helpers::run(state, req, |conn| availability_update(conn, req)))
        }
        "availability.remove" => {
            Some(helpers::run(state, req, |conn| availability_remove(conn, req)))
        }
        "schedules.list" => Some(helpers::run(state, req, |conn| schedules_list(conn, req))),
        "schedules.set" => Some(helpers::run(state, req, |conn| schedules_set(conn, req))),
        "schedules.update" => Some(helpers::run(state, req, |conn| schedules_update(conn, req))),
        "schedules.delete" => Some(helpers::run(state, req, |conn| schedules_delete(conn, req))),
        "schedules.forTeacher" => {
            Some(helpers::run(state, req, |conn| schedules_for_teacher(conn, req)))
        }
        _ => None,
    }
}
