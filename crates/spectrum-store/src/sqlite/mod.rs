//! SQLite-based store implementation

mod attendance;
mod directory;
mod subscriptions;
mod trainings;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, AuditLog, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id INTEGER NOT NULL UNIQUE,
                first_name TEXT NOT NULL,
                last_name TEXT,
                username TEXT,
                role TEXT NOT NULL,
                registered_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
                athletic_title TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS coaches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS training_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                code TEXT,
                age_min INTEGER,
                age_max INTEGER,
                description TEXT,
                created_at TEXT NOT NULL
            );

            -- One training per group and start
            CREATE TABLE IF NOT EXISTS trainings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL REFERENCES training_groups(id),
                coach_id INTEGER REFERENCES coaches(id),
                training_date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                max_participants INTEGER,
                created_by INTEGER REFERENCES users(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (group_id, training_date, start_time)
            );

            CREATE TABLE IF NOT EXISTS week_templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL REFERENCES training_groups(id),
                day_of_week INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS attendance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                training_id INTEGER NOT NULL REFERENCES trainings(id),
                student_id INTEGER NOT NULL REFERENCES students(id),
                status TEXT NOT NULL DEFAULT 'registered',
                attended INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                recorded_by INTEGER REFERENCES coaches(id),
                recorded_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL REFERENCES students(id),
                total_lessons INTEGER NOT NULL,
                remaining_lessons INTEGER NOT NULL CHECK (remaining_lessons >= 0),
                start_date TEXT NOT NULL,
                end_date TEXT,
                created_at TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- At most one live registration per student and training
            CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_registered
                ON attendance(training_id, student_id) WHERE status = 'registered';

            CREATE INDEX IF NOT EXISTS idx_trainings_date ON trainings(training_date);
            CREATE INDEX IF NOT EXISTS idx_trainings_coach ON trainings(coach_id, training_date);
            CREATE INDEX IF NOT EXISTS idx_subscriptions_student ON subscriptions(student_id);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl AuditLog for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![fmt_ts(&event.timestamp), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, get_ts(row, 1)?, row.get::<_, String>(2)?))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, event_json) = row?;
            events.push(AuditEvent {
                id,
                timestamp,
                event: serde_json::from_str(&event_json)?,
            });
        }

        Ok(events)
    }
}

impl Store for SqliteStore {
    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

// Column encodings. Timestamps are stored as UTC RFC 3339 with fixed
// millisecond precision so that text comparison orders them correctly.

fn fmt_ts(dt: &DateTime<Local>) -> String {
    dt.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn fmt_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| conversion_error(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Local>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Local)))
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

fn get_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, "%H:%M:%S").map_err(|e| conversion_error(idx, e))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Display name from the users table columns
fn display_name(first_name: String, last_name: Option<String>) -> String {
    match last_name {
        Some(last) if !last.is_empty() => format!("{} {}", first_name, last),
        _ => first_name,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::DirectoryStore;
    use spectrum_api::{Group, NewGroup, NewTraining, NewUser, Role, Student};
    use spectrum_util::{GroupId, TelegramId};

    pub fn group(store: &SqliteStore, name: &str) -> Group {
        store
            .create_group(&NewGroup {
                name: name.into(),
                code: None,
                age_min: None,
                age_max: None,
                description: None,
            })
            .unwrap()
    }

    pub fn student(store: &SqliteStore, telegram_id: i64, first_name: &str) -> Student {
        let user = store
            .upsert_user(
                &NewUser {
                    telegram_id: TelegramId::new(telegram_id),
                    first_name: first_name.into(),
                    last_name: None,
                    username: None,
                },
                Role::Student,
            )
            .unwrap();
        store.ensure_student(user.id).unwrap()
    }

    pub fn new_training(group_id: GroupId, date: NaiveDate, hour: u32) -> NewTraining {
        NewTraining {
            group_id,
            coach_id: None,
            date,
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
            description: "Зал".into(),
            max_participants: None,
            created_by: None,
        }
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use chrono::TimeZone;

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::ConfigLoaded { plan_count: 3 }))
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, AuditEventType::ConfigLoaded { plan_count: 3 });
        assert!(matches!(events[1].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn test_open_on_disk_reuses_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spectrum.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_recent_audits(10).unwrap().len(), 1);
    }

    #[test]
    fn test_timestamp_text_orders_like_time() {
        let earlier = Local.with_ymd_and_hms(2025, 3, 30, 1, 59, 0).unwrap();
        let later = Local.with_ymd_and_hms(2025, 11, 2, 9, 0, 0).unwrap();
        assert!(fmt_ts(&earlier) < fmt_ts(&later));
        assert_eq!(fmt_ts(&earlier).len(), fmt_ts(&later).len());
    }
}
