//! Club directory: users, students, coaches, groups

use rusqlite::{Connection, OptionalExtension, Row, params};
use spectrum_api::{Coach, Group, NewGroup, NewUser, Role, Student, User};
use spectrum_util::{CoachId, GroupId, StudentId, TelegramId, UserId};
use tracing::debug;

use super::{SqliteStore, conversion_error, display_name, fmt_ts, get_ts};
use crate::{DirectoryStore, StoreError, StoreResult};

const STUDENT_SELECT: &str = r#"
    SELECT s.id, s.user_id, u.first_name, u.last_name, s.athletic_title
    FROM students s
    JOIN users u ON u.id = s.user_id
"#;

const COACH_SELECT: &str = r#"
    SELECT c.id, c.user_id, u.first_name, u.last_name
    FROM coaches c
    JOIN users u ON u.id = c.user_id
"#;

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(5)?;
    Ok(User {
        id: UserId::new(row.get(0)?),
        telegram_id: TelegramId::new(row.get(1)?),
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        username: row.get(4)?,
        role: Role::parse(&role)
            .ok_or_else(|| conversion_error(5, StoreError::Database(format!("unknown role {}", role))))?,
        registered_at: get_ts(row, 6)?,
    })
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: StudentId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        name: display_name(row.get(2)?, row.get(3)?),
        athletic_title: row.get(4)?,
    })
}

fn coach_from_row(row: &Row<'_>) -> rusqlite::Result<Coach> {
    Ok(Coach {
        id: CoachId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        name: display_name(row.get(2)?, row.get(3)?),
    })
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: GroupId::new(row.get(0)?),
        name: row.get(1)?,
        code: row.get(2)?,
        age_min: row.get(3)?,
        age_max: row.get(4)?,
        description: row.get(5)?,
    })
}

fn fetch_user(conn: &Connection, telegram_id: TelegramId) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        r#"
        SELECT id, telegram_id, first_name, last_name, username, role, registered_at
        FROM users WHERE telegram_id = ?
        "#,
        [telegram_id.get()],
        user_from_row,
    )
    .optional()
}

fn fetch_student_by_user(conn: &Connection, user_id: UserId) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        &format!("{} WHERE s.user_id = ?", STUDENT_SELECT),
        [user_id.get()],
        student_from_row,
    )
    .optional()
}

fn fetch_coach_by_user(conn: &Connection, user_id: UserId) -> rusqlite::Result<Option<Coach>> {
    conn.query_row(
        &format!("{} WHERE c.user_id = ?", COACH_SELECT),
        [user_id.get()],
        coach_from_row,
    )
    .optional()
}

impl DirectoryStore for SqliteStore {
    fn upsert_user(&self, user: &NewUser, role: Role) -> StoreResult<User> {
        let conn = self.lock()?;
        let now = fmt_ts(&spectrum_util::now());

        conn.execute(
            r#"
            INSERT INTO users (telegram_id, first_name, last_name, username, role,
                               registered_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT (telegram_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                username = excluded.username,
                role = excluded.role,
                updated_at = excluded.updated_at
            "#,
            params![
                user.telegram_id.get(),
                user.first_name,
                user.last_name,
                user.username,
                role.as_str(),
                now,
            ],
        )?;

        debug!(telegram_id = %user.telegram_id, role = role.as_str(), "User upserted");
        fetch_user(&conn, user.telegram_id)?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user.telegram_id)))
    }

    fn user_by_telegram_id(&self, telegram_id: TelegramId) -> StoreResult<Option<User>> {
        let conn = self.lock()?;
        Ok(fetch_user(&conn, telegram_id)?)
    }

    fn ensure_student(&self, user_id: UserId) -> StoreResult<Student> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO students (user_id, created_at) VALUES (?, ?) ON CONFLICT (user_id) DO NOTHING",
            params![user_id.get(), fmt_ts(&spectrum_util::now())],
        )?;
        fetch_student_by_user(&conn, user_id)?
            .ok_or_else(|| StoreError::NotFound(format!("student for user {}", user_id)))
    }

    fn ensure_coach(&self, user_id: UserId) -> StoreResult<Coach> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO coaches (user_id, created_at) VALUES (?, ?) ON CONFLICT (user_id) DO NOTHING",
            params![user_id.get(), fmt_ts(&spectrum_util::now())],
        )?;
        fetch_coach_by_user(&conn, user_id)?
            .ok_or_else(|| StoreError::NotFound(format!("coach for user {}", user_id)))
    }

    fn student_for_user(&self, user_id: UserId) -> StoreResult<Option<Student>> {
        let conn = self.lock()?;
        Ok(fetch_student_by_user(&conn, user_id)?)
    }

    fn coach_for_user(&self, user_id: UserId) -> StoreResult<Option<Coach>> {
        let conn = self.lock()?;
        Ok(fetch_coach_by_user(&conn, user_id)?)
    }

    fn get_student(&self, id: StudentId) -> StoreResult<Option<Student>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("{} WHERE s.id = ?", STUDENT_SELECT),
                [id.get()],
                student_from_row,
            )
            .optional()?)
    }

    fn list_students(&self) -> StoreResult<Vec<Student>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY u.first_name, u.last_name, s.id",
            STUDENT_SELECT
        ))?;
        let rows = stmt.query_map([], student_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn create_group(&self, group: &NewGroup) -> StoreResult<Group> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO training_groups (name, code, age_min, age_max, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                group.name,
                group.code,
                group.age_min,
                group.age_max,
                group.description,
                fmt_ts(&spectrum_util::now()),
            ],
        )?;

        Ok(Group {
            id: GroupId::new(conn.last_insert_rowid()),
            name: group.name.clone(),
            code: group.code.clone(),
            age_min: group.age_min,
            age_max: group.age_max,
            description: group.description.clone(),
        })
    }

    fn get_group(&self, id: GroupId) -> StoreResult<Option<Group>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id, name, code, age_min, age_max, description FROM training_groups WHERE id = ?",
                [id.get()],
                group_from_row,
            )
            .optional()?)
    }

    fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, code, age_min, age_max, description FROM training_groups ORDER BY name, id",
        )?;
        let rows = stmt.query_map([], group_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
