use crate::ipc::handlers::students::load_student_json;
use crate::ipc::helpers::{self, roles, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::Datelike;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;

fn fmt_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

fn recent_notices(
    conn: &Connection,
    school_id: &str,
    limit: i64,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT n.id, n.title, n.content, n.notice_type, n.author_profile_id, n.date, n.created_at
         FROM notices n
         WHERE n.school_id = ?
         ORDER BY n.date DESC, n.created_at DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map((school_id, limit), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut notices = Vec::with_capacity(rows.len());
    for (id, title, content, notice_type, author, date, created_at) in rows {
        notices.push(json!({
            "id": id,
            "title": title,
            "content": content,
            "type": notice_type,
            "author": helpers::profile_name(conn, author.as_deref())?,
            "date": date,
            "createdAt": created_at,
        }));
    }
    Ok(notices)
}

fn count_by_status(
    conn: &Connection,
    sql: &str,
    binds: &[&str],
) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    let mut out = serde_json::Map::new();
    for (status, count) in rows {
        out.insert(status, json!(count));
    }
    Ok(serde_json::Value::Object(out))
}

fn dashboard_admin(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(
        &ctx,
        &[
            roles::ADMIN,
            roles::DIRECTOR,
            roles::FINANCE,
            roles::COORDINATOR,
        ],
    )?;
    let school_id = helpers::require_school(&ctx)?;

    let today = helpers::today();
    let today_str = today.format("%Y-%m-%d").to_string();
    let start_month = today.with_day(1).unwrap_or(today);
    let start_month_str = start_month.format("%Y-%m-%d").to_string();

    let students_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM students WHERE school_id = ?",
        [&school_id],
        |r| r.get(0),
    )?;
    let staff_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM user_profiles WHERE school_id = ?",
        [&school_id],
        |r| r.get(0),
    )?;
    let classrooms_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM classrooms WHERE school_id = ?",
        [&school_id],
        |r| r.get(0),
    )?;

    let (invoices_total, invoices_open, invoices_overdue): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN i.status = 'open' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN i.status = 'overdue' THEN 1 ELSE 0 END), 0)
         FROM invoices i
         JOIN students s ON s.id = i.student_id
         WHERE s.school_id = ?",
        [&school_id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    let delinquency_rate = if invoices_total > 0 {
        (invoices_overdue as f64 / invoices_total as f64) * 100.0
    } else {
        0.0
    };

    let month_total = |kind: &str| -> Result<f64, HandlerErr> {
        let total: Option<f64> = conn.query_row(
            "SELECT SUM(amount) FROM financial_transactions
             WHERE school_id = ? AND transaction_type = ? AND date >= ? AND date <= ?",
            (&school_id, kind, &start_month_str, &today_str),
            |r| r.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    };
    let income = month_total("income")?;
    let expense = month_total("expense")?;

    let attendance_today = count_by_status(
        conn,
        "SELECT a.status, COUNT(*)
         FROM attendance_records a
         JOIN classrooms c ON c.id = a.classroom_id
         WHERE c.school_id = ? AND a.date = ?
         GROUP BY a.status",
        &[school_id.as_str(), today_str.as_str()],
    )?;

    let mut stmt = conn.prepare(
        "SELECT c.grade, COUNT(*)
         FROM enrollments e
         JOIN classrooms c ON c.id = e.classroom_id
         WHERE c.school_id = ? AND e.status = 'active'
         GROUP BY c.grade
         ORDER BY c.grade",
    )?;
    let enrollment_by_grade = stmt
        .query_map([&school_id], |r| {
            let grade: String = r.get(0)?;
            let total: i64 = r.get(1)?;
            Ok(json!({
                "name": if grade.is_empty() { "No grade".to_string() } else { grade },
                "value": total
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    // Six months of history, bucketed per month.
    let start_period = (start_month - chrono::Duration::days(180))
        .with_day(1)
        .unwrap_or(start_month);
    let start_period_str = start_period.format("%Y-%m-%d").to_string();
    let mut stmt = conn.prepare(
        "SELECT date, transaction_type, SUM(amount)
         FROM financial_transactions
         WHERE school_id = ? AND date >= ? AND date <= ?
         GROUP BY date, transaction_type",
    )?;
    let rows = stmt
        .query_map((&school_id, &start_period_str, &today_str), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, f64>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    let mut monthly: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for (date, kind, total) in rows {
        let month_key = date.get(..7).unwrap_or(&date).to_string();
        let entry = monthly.entry(month_key).or_insert((0.0, 0.0));
        if kind == "income" {
            entry.0 += total;
        } else {
            entry.1 += total;
        }
    }
    let finance_series: Vec<serde_json::Value> = monthly
        .into_iter()
        .map(|(name, (income, expense))| {
            json!({ "name": name, "income": income, "expense": expense })
        })
        .collect();

    Ok(json!({
        "counts": {
            "students": students_count,
            "staff": staff_count,
            "classrooms": classrooms_count,
        },
        "invoices": {
            "total": invoices_total,
            "open": invoices_open,
            "overdue": invoices_overdue,
            "delinquencyRate": (delinquency_rate * 100.0).round() / 100.0,
        },
        "financeMonth": {
            "income": fmt_amount(income),
            "expense": fmt_amount(expense),
            "net": fmt_amount(income - expense),
        },
        "financeSeries": finance_series,
        "enrollmentByGrade": enrollment_by_grade,
        "attendanceToday": attendance_today,
        "recentNotices": recent_notices(conn, &school_id, 5)?,
    }))
}

fn dashboard_teacher(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::TEACHER, roles::COORDINATOR])?;
    let school_id = helpers::require_school(&ctx)?;
    let Some(profile) = ctx.profile.as_ref() else {
        return Err(HandlerErr::not_found("user profile not found"));
    };

    let classes_count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT classroom_id) FROM classroom_teacher_allocations WHERE teacher_profile_id = ?",
        [&profile.id],
        |r| r.get(0),
    )?;
    let subjects_count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT subject) FROM classroom_teacher_allocations WHERE teacher_profile_id = ?",
        [&profile.id],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT e.id, c.name, e.subject, e.day_of_week, t.label, t.start_time, t.end_time
         FROM class_schedule_entries e
         JOIN classrooms c ON c.id = e.classroom_id
         JOIN time_slots t ON t.id = e.time_slot_id
         WHERE e.teacher_profile_id = ? AND c.school_id = ?
         ORDER BY e.day_of_week, t.sort_order",
    )?;
    let entries = stmt
        .query_map((&profile.id, &school_id), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let schedule: Vec<serde_json::Value> = entries
        .iter()
        .map(|(id, classroom, subject, day, label, start, end)| {
            json!({
                "id": id,
                "classroom": classroom,
                "subject": subject,
                "dayOfWeek": day,
                "timeSlot": { "label": label, "startTime": start, "endTime": end }
            })
        })
        .collect();

    let today = helpers::today();
    let weekday = today.weekday().num_days_from_monday() as i64;
    let today_schedule: Vec<serde_json::Value> = entries
        .iter()
        .filter(|(_, _, _, day, _, _, _)| *day == weekday)
        .map(|(id, classroom, subject, _, _, start, end)| {
            json!({
                "id": id,
                "classroom": classroom,
                "subject": subject,
                "time": format!("{} - {}", start, end),
                "room": classroom,
            })
        })
        .collect();

    let week_start = (today - chrono::Duration::days(7))
        .format("%Y-%m-%d")
        .to_string();
    let diary_last7: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM class_diary_entries d
         JOIN classrooms c ON c.id = d.classroom_id
         WHERE d.teacher_profile_id = ? AND c.school_id = ? AND d.date >= ?",
        (&profile.id, &school_id, &week_start),
        |r| r.get(0),
    )?;
    let pending_diary = (classes_count * 5 - diary_last7).max(0);

    Ok(json!({
        "counts": {
            "classes": classes_count,
            "subjects": subjects_count,
            "diaryEntriesLast7": diary_last7,
            "pendingDiary": pending_diary,
        },
        "schedule": schedule,
        "todaySchedule": today_schedule,
        "recentNotices": recent_notices(conn, &school_id, 3)?,
    }))
}

fn dashboard_student(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(
        &ctx,
        &[
            roles::ADMIN,
            roles::DIRECTOR,
            roles::COORDINATOR,
            roles::TEACHER,
            roles::STAFF,
            roles::STUDENT,
        ],
    )?;
    let school_id = helpers::require_school(&ctx)?;

    let student_id = helpers::optional_str(&req.params, "studentId")
        .or_else(|| ctx.profile.as_ref().and_then(|p| p.student_id.clone()))
        .ok_or_else(|| HandlerErr::bad_params("studentId is required"))?;
    let student = load_student_json(conn, &school_id, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;

    let attendance = count_by_status(
        conn,
        "SELECT status, COUNT(*) FROM attendance_records WHERE student_id = ?
         GROUP BY status",
        &[student_id.as_str()],
    )?;

    let average_final: Option<f64> = conn.query_row(
        "SELECT AVG(final_grade) FROM grade_records WHERE student_id = ?",
        [&student_id],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, student_id, amount, due_date, reference_month, status, paid_at, created_at
         FROM invoices WHERE student_id = ? ORDER BY due_date DESC LIMIT 5",
    )?;
    let invoice_map = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "studentId": r.get::<_, String>(1)?,
            "amount": fmt_amount(r.get::<_, f64>(2)?),
            "dueDate": r.get::<_, String>(3)?,
            "referenceMonth": r.get::<_, Option<String>>(4)?,
            "status": r.get::<_, String>(5)?,
            "paidAt": r.get::<_, Option<String>>(6)?,
            "createdAt": r.get::<_, String>(7)?,
        }))
    };
    let invoices = stmt
        .query_map([&student_id], invoice_map)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let next_invoice = conn
        .query_row(
            "SELECT id, student_id, amount, due_date, reference_month, status, paid_at, created_at
             FROM invoices WHERE student_id = ? AND status = 'open'
             ORDER BY due_date LIMIT 1",
            [&student_id],
            invoice_map,
        )
        .optional()?;

    let today_str = helpers::today().format("%Y-%m-%d").to_string();
    let mut stmt = conn.prepare(
        "SELECT scheduled_date, subject, exam_type, status
         FROM exam_submissions
         WHERE school_id = ? AND scheduled_date >= ?
         ORDER BY scheduled_date LIMIT 5",
    )?;
    let upcoming_events = stmt
        .query_map((&school_id, &today_str), |r| {
            let exam_type: String = r.get(2)?;
            Ok(json!({
                "date": r.get::<_, Option<String>>(0)?,
                "subject": r.get::<_, String>(1)?,
                "type": if exam_type == "Standard" { "Exam" } else { "Adapted Exam" },
                "status": r.get::<_, String>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({
        "student": student,
        "attendance": attendance,
        "grades": { "averageFinal": average_final },
        "invoices": invoices,
        "nextInvoice": next_invoice,
        "upcomingEvents": upcoming_events,
        "recentNotices": recent_notices(conn, &school_id, 3)?,
    }))
}

fn teacher_activities(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ctx = helpers::authenticate(conn, req)?;
    helpers::require_roles(&ctx, &[roles::ADMIN, roles::DIRECTOR, roles::COORDINATOR])?;
    let school_id = helpers::require_school(&ctx)?;

    let mut stmt = conn.prepare(
        "SELECT p.id, u.first_name, u.last_name, u.username, u.last_login_at
         FROM user_profiles p
         JOIN users u ON u.id = p.user_id
         WHERE p.school_id = ? AND p.role = 'teacher'
         ORDER BY u.first_name, u.last_name",
    )?;
    let teachers = stmt
        .query_map([&school_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let today = helpers::today();
    let mut data = Vec::with_capacity(teachers.len());
    let mut active = 0i64;
    let mut warning = 0i64;
    let mut idle = 0i64;

    for (profile_id, first, last, username, last_login) in teachers {
        let mut subject_stmt = conn.prepare(
            "SELECT DISTINCT subject FROM classroom_teacher_allocations
             WHERE teacher_profile_id = ? ORDER BY subject",
        )?;
        let subjects = subject_stmt
            .query_map([&profile_id], |r| r.get::<_, String>(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        let subject = if subjects.is_empty() {
            "No subject".to_string()
        } else {
            subjects.join(", ")
        };

        let last_diary: Option<String> = conn
            .query_row(
                "SELECT d.date
                 FROM class_diary_entries d
                 JOIN classrooms c ON c.id = d.classroom_id
                 WHERE d.teacher_profile_id = ? AND c.school_id = ?
                 ORDER BY d.date DESC LIMIT 1",
                (&profile_id, &school_id),
                |r| r.get(0),
            )
            .optional()?;
        let last_attendance: Option<String> = conn
            .query_row(
                "SELECT date FROM attendance_records
                 WHERE teacher_profile_id = ?
                 ORDER BY date DESC LIMIT 1",
                [&profile_id],
                |r| r.get(0),
            )
            .optional()?;

        // Latest signal from login, diary, or attendance decides the status.
        let last_activity = [
            last_login
                .as_deref()
                .map(|ts| ts.split('T').next().unwrap_or(ts).to_string()),
            last_diary.clone(),
            last_attendance.clone(),
        ]
        .into_iter()
        .flatten()
        .max();

        let status = match last_activity.as_deref() {
            Some(date_str) => {
                let delta_days = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                    .map(|d| (today - d).num_days())
                    .unwrap_or(i64::MAX);
                if delta_days <= 7 {
                    "Active"
                } else if delta_days <= 14 {
                    "Warning"
                } else {
                    "Idle"
                }
            }
            None => "Idle",
        };
        match status {
            "Active" => active += 1,
            "Warning" => warning += 1,
            _ => idle += 1,
        }

        data.push(json!({
            "id": profile_id,
            "name": helpers::display_name(&first, &last, &username),
            "subject": subject,
            "lastLogin": last_login,
            "lastDiaryUpdate": last_diary,
            "lastAttendanceUpdate": last_attendance,
            "status": status,
        }));
    }

    Ok(json!({
        "summary": {
            "active": active,
            "warning": warning,
            "idle": idle,
            "total": data.len(),
        },
        "data": data,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.admin" => Some(helpers::run(state, req, |conn| dashboard_admin(conn, req))),
        "dashboard.teacher" => Some(helpers::run(state, req, |conn| dashboard_teacher(conn, req))),
        "dashboard.student" => Some(helpers::run(state, req, |conn| dashboard_student(conn, req))),
        "teacherActivities.list" => {
            Some(helpers::run(state, req, |conn| teacher_activities(conn, req)))
        }
        _ => None,
    }
}
