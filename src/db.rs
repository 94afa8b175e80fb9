use crate::model::{AttendanceRecord, AttendanceStatus};
use crate::roster::{ClassInfo, Roster};
use crate::store::AttendancePersistence;
use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "attendance.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            section TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_students(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_students_class_sort ON class_students(class_id, sort_order)",
        [],
    )?;

    // Attendance rows are not tied to class_students: a record outlives a
    // roster change until the owner purges it.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            UNIQUE(student_id, class_id, date)
        )",
        [],
    )?;
    ensure_attendance_marked_by(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_records_class_date ON attendance_records(class_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_records_student ON attendance_records(student_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_attendance_marked_by(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "attendance_records", "marked_by")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE attendance_records ADD COLUMN marked_by TEXT NOT NULL DEFAULT ''",
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

pub fn load_attendance(conn: &Connection) -> anyhow::Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, class_id, date, status, marked_by
         FROM attendance_records
         ORDER BY date, class_id, student_id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, student_id, class_id, date, status, marked_by)| {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("attendance record {} has bad date {:?}", id, date))?;
            Ok(AttendanceRecord {
                id,
                student_id,
                class_id,
                date,
                status: AttendanceStatus::from(status),
                marked_by,
            })
        })
        .collect()
}

/// Rewrites the whole table in one transaction.
pub fn save_attendance(conn: &Connection, records: &[AttendanceRecord]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM attendance_records", [])?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO attendance_records(id, student_id, class_id, date, status, marked_by)
             VALUES(?, ?, ?, ?, ?, ?)",
        )?;
        for r in records {
            insert
                .execute((
                    &r.id,
                    &r.student_id,
                    &r.class_id,
                    r.date.format("%Y-%m-%d").to_string(),
                    r.status.as_str(),
                    &r.marked_by,
                ))
                .with_context(|| format!("failed to write attendance record {}", r.id))?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn upsert_class(conn: &Connection, info: &ClassInfo, student_ids: &[String]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO classes(id, name, section)
         VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           section = excluded.section",
        (&info.id, &info.name, &info.section),
    )?;
    tx.execute("DELETE FROM class_students WHERE class_id = ?", [&info.id])?;
    for (i, student_id) in student_ids.iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO class_students(class_id, student_id, sort_order) VALUES(?, ?, ?)",
            (&info.id, student_id, i as i64),
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn get_class(conn: &Connection, class_id: &str) -> anyhow::Result<Option<ClassInfo>> {
    let info = conn
        .query_row(
            "SELECT id, name, section FROM classes WHERE id = ?",
            [class_id],
            |r| {
                Ok(ClassInfo {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    section: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(info)
}

pub struct SqliteAttendance<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAttendance<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl AttendancePersistence for SqliteAttendance<'_> {
    fn load_all(&self) -> anyhow::Result<Vec<AttendanceRecord>> {
        load_attendance(self.conn)
    }

    fn save_all(&self, records: &[AttendanceRecord]) -> anyhow::Result<()> {
        save_attendance(self.conn, records)
    }
}

pub struct SqliteRoster<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRoster<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl Roster for SqliteRoster<'_> {
    fn students_in_class(&self, class_id: &str) -> anyhow::Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id FROM class_students WHERE class_id = ? ORDER BY sort_order",
        )?;
        let ids = stmt
            .query_map([class_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn classes(&self) -> anyhow::Result<Vec<ClassInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, section FROM classes ORDER BY name, section, id")?;
        let classes = stmt
            .query_map([], |r| {
                Ok(ClassInfo {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    section: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classes)
    }
}
