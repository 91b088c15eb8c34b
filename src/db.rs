use rusqlite::Connection;
use std::path::Path;

pub const DB_FILENAME: &str = "nexus.sqlite3";
pub const UPLOADS_DIR: &str = "uploads";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILENAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            cnpj TEXT UNIQUE,
            email TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            address_line1 TEXT NOT NULL DEFAULT '',
            address_line2 TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT '',
            postal_code TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL DEFAULT '',
            password_salt TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            active INTEGER NOT NULL DEFAULT 1,
            last_login_at TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL DEFAULT '',
            birth_date TEXT,
            cpf TEXT NOT NULL DEFAULT '',
            main_address TEXT NOT NULL DEFAULT '',
            reserve_address TEXT NOT NULL DEFAULT '',
            health_allergies TEXT NOT NULL DEFAULT '[]',
            health_medications TEXT NOT NULL DEFAULT '[]',
            health_conditions TEXT NOT NULL DEFAULT '',
            blood_type TEXT NOT NULL DEFAULT '',
            enrollment_code TEXT NOT NULL DEFAULT '',
            tuition_status TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_school ON students(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_school_code ON students(school_id, enrollment_code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_profiles(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            school_id TEXT,
            student_id TEXT UNIQUE,
            role TEXT NOT NULL,
            department TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            admission_date TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_profiles_school ON user_profiles(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_profiles_role ON user_profiles(school_id, role)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS api_tokens(
            key TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_used_at TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_api_tokens_user ON api_tokens(user_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS password_reset_tokens(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            token_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            used_at TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_password_reset_tokens_user ON password_reset_tokens(user_id, expires_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS guardians(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            relation TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            cpf TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_guardians_school ON guardians(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS emergency_contacts(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            name TEXT NOT NULL,
            relation TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            is_legal_guardian INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_emergency_contacts_student ON emergency_contacts(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_parents(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            guardian_id TEXT NOT NULL,
            is_primary INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE(student_id, guardian_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(guardian_id) REFERENCES guardians(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_guardians(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            guardian_id TEXT NOT NULL,
            is_primary INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE(student_id, guardian_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(guardian_id) REFERENCES guardians(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            grade TEXT NOT NULL DEFAULT '',
            year INTEGER NOT NULL,
            shift TEXT NOT NULL DEFAULT 'morning',
            capacity INTEGER NOT NULL DEFAULT 30,
            created_at TEXT NOT NULL,
            UNIQUE(school_id, name, year),
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classrooms_school ON classrooms(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classroom_teacher_allocations(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            teacher_profile_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(classroom_id, teacher_profile_id, subject),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id),
            FOREIGN KEY(teacher_profile_id) REFERENCES user_profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_allocations_teacher ON classroom_teacher_allocations(teacher_profile_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            classroom_id TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            UNIQUE(student_id, classroom_id, start_date),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_classroom ON enrollments(classroom_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS invoices(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            amount REAL NOT NULL,
            due_date TEXT NOT NULL,
            reference_month TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            paid_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invoices_student ON invoices(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status, due_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS financial_transactions(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            invoice_id TEXT,
            description TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            amount REAL NOT NULL,
            transaction_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(invoice_id) REFERENCES invoices(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_school_date ON financial_transactions(school_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_invoice ON financial_transactions(invoice_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS inventory_items(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 0,
            min_quantity INTEGER NOT NULL DEFAULT 0,
            unit TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_inventory_school ON inventory_items(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            classroom_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            term TEXT NOT NULL DEFAULT '',
            date TEXT,
            grade1 REAL,
            grade2 REAL,
            recovery_grade REAL,
            average REAL,
            final_grade REAL,
            created_at TEXT NOT NULL,
            UNIQUE(student_id, classroom_id, subject, term),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_records_student ON grade_records(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_records_classroom ON grade_records(classroom_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grading_configs(
            school_id TEXT PRIMARY KEY,
            system TEXT NOT NULL DEFAULT 'bimestral',
            calculation_method TEXT NOT NULL DEFAULT 'arithmetic',
            min_passing_grade REAL NOT NULL DEFAULT 6,
            weights TEXT NOT NULL DEFAULT '{}',
            recovery_rule TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            classroom_id TEXT NOT NULL,
            teacher_profile_id TEXT,
            date TEXT NOT NULL,
            subject TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(student_id, classroom_id, date, subject),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id),
            FOREIGN KEY(teacher_profile_id) REFERENCES user_profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance_records(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_classroom_date ON attendance_records(classroom_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS absence_justifications(
            id TEXT PRIMARY KEY,
            attendance_id TEXT NOT NULL UNIQUE,
            reason TEXT NOT NULL,
            observation TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            created_by TEXT,
            decided_by TEXT,
            decided_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(attendance_id) REFERENCES attendance_records(id),
            FOREIGN KEY(created_by) REFERENCES user_profiles(id),
            FOREIGN KEY(decided_by) REFERENCES user_profiles(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_diary_entries(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            teacher_profile_id TEXT,
            subject TEXT NOT NULL,
            date TEXT NOT NULL,
            topic TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            homework TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id),
            FOREIGN KEY(teacher_profile_id) REFERENCES user_profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_diary_classroom_date ON class_diary_entries(classroom_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_diary_teacher ON class_diary_entries(teacher_profile_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS learning_materials(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            title TEXT NOT NULL,
            material_type TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL,
            size TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_materials_classroom ON learning_materials(classroom_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS syllabi(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            grade_level TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            objectives TEXT NOT NULL DEFAULT '[]',
            bibliography TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_syllabi_school ON syllabi(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_targets(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            month_label TEXT NOT NULL,
            required_classes INTEGER NOT NULL DEFAULT 0,
            grade_submission_deadline TEXT NOT NULL,
            exam_submission_deadline TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_submissions(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            title TEXT NOT NULL,
            subject TEXT NOT NULL,
            grade_level TEXT NOT NULL DEFAULT '',
            exam_type TEXT NOT NULL DEFAULT 'Standard',
            status TEXT NOT NULL DEFAULT 'Pending',
            student_name TEXT NOT NULL DEFAULT '',
            feedback TEXT NOT NULL DEFAULT '',
            scheduled_date TEXT,
            submitted_by TEXT,
            decided_by TEXT,
            submitted_at TEXT NOT NULL,
            decided_at TEXT,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(submitted_by) REFERENCES user_profiles(id),
            FOREIGN KEY(decided_by) REFERENCES user_profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_submissions_school ON exam_submissions(school_id, submitted_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notices(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            author_profile_id TEXT,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            notice_type TEXT NOT NULL DEFAULT 'general',
            date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(author_profile_id) REFERENCES user_profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notices_school_date ON notices(school_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversations(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(school_id, student_id),
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages(
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            sender_type TEXT NOT NULL,
            sender_profile_id TEXT,
            text TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            FOREIGN KEY(conversation_id) REFERENCES conversations(id),
            FOREIGN KEY(sender_profile_id) REFERENCES user_profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, sent_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS time_slots(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT '',
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_time_slots_school ON time_slots(school_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_availability(
            id TEXT PRIMARY KEY,
            teacher_profile_id TEXT NOT NULL,
            time_slot_id TEXT NOT NULL,
            day_of_week INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(teacher_profile_id, time_slot_id, day_of_week),
            FOREIGN KEY(teacher_profile_id) REFERENCES user_profiles(id),
            FOREIGN KEY(time_slot_id) REFERENCES time_slots(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_schedule_entries(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            time_slot_id TEXT NOT NULL,
            day_of_week INTEGER NOT NULL,
            subject TEXT NOT NULL,
            teacher_profile_id TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(classroom_id, time_slot_id, day_of_week),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id),
            FOREIGN KEY(time_slot_id) REFERENCES time_slots(id),
            FOREIGN KEY(teacher_profile_id) REFERENCES user_profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_slot_day ON class_schedule_entries(time_slot_id, day_of_week)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_teacher ON class_schedule_entries(teacher_profile_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS upload_attachments(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            uploaded_by TEXT,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            stored_path TEXT NOT NULL,
            original_name TEXT NOT NULL,
            content_type TEXT NOT NULL DEFAULT '',
            size INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(uploaded_by) REFERENCES user_profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_uploads_entity ON upload_attachments(school_id, entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_logs(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            user_profile_id TEXT,
            action TEXT NOT NULL,
            detail TEXT NOT NULL DEFAULT '',
            ip_address TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(user_profile_id) REFERENCES user_profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_school ON audit_logs(school_id, created_at)",
        [],
    )?;

    // Early databases predate a few columns. Add and backfill where needed.
    ensure_attendance_subject(&conn)?;
    ensure_exam_scheduled_date(&conn)?;
    ensure_transaction_invoice(&conn)?;

    Ok(conn)
}

fn ensure_attendance_subject(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "attendance_records", "subject")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE attendance_records ADD COLUMN subject TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    Ok(())
}

fn ensure_exam_scheduled_date(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "exam_submissions", "scheduled_date")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE exam_submissions ADD COLUMN scheduled_date TEXT",
        [],
    )?;
    Ok(())
}

fn ensure_transaction_invoice(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "financial_transactions", "invoice_id")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE financial_transactions ADD COLUMN invoice_id TEXT",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
