//! Trainings and week templates

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params, params_from_iter};
use spectrum_api::{NewTemplate, NewTraining, TemplateUpdate, Training, TrainingUpdate, WeekTemplate};
use spectrum_util::{CoachId, GroupId, TemplateId, TrainingId, UserId};
use tracing::debug;

use super::{
    SqliteStore, fmt_date, fmt_time, fmt_ts, get_date, get_time, get_ts, is_unique_violation,
};
use crate::{StoreError, StoreResult, TemplateStore, TrainingStore};

const TRAINING_COLUMNS: &str = "id, group_id, coach_id, training_date, start_time, end_time, \
     description, max_participants, created_by, created_at, updated_at";

const TEMPLATE_COLUMNS: &str =
    "id, group_id, day_of_week, start_time, end_time, description, is_active, created_at";

pub(super) fn training_from_row(row: &Row<'_>) -> rusqlite::Result<Training> {
    training_from_row_at(row, 0)
}

/// Map a training whose columns start at `offset` (for joins)
pub(super) fn training_from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Training> {
    Ok(Training {
        id: TrainingId::new(row.get(offset)?),
        group_id: GroupId::new(row.get(offset + 1)?),
        coach_id: row.get::<_, Option<i64>>(offset + 2)?.map(CoachId::new),
        date: get_date(row, offset + 3)?,
        start_time: get_time(row, offset + 4)?,
        end_time: get_time(row, offset + 5)?,
        description: row.get(offset + 6)?,
        max_participants: row.get(offset + 7)?,
        created_by: row.get::<_, Option<i64>>(offset + 8)?.map(UserId::new),
        created_at: get_ts(row, offset + 9)?,
        updated_at: get_ts(row, offset + 10)?,
    })
}

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<WeekTemplate> {
    Ok(WeekTemplate {
        id: TemplateId::new(row.get(0)?),
        group_id: GroupId::new(row.get(1)?),
        day_of_week: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        description: row.get(5)?,
        is_active: row.get(6)?,
        created_at: get_ts(row, 7)?,
    })
}

pub(super) fn fetch_training(conn: &Connection, id: TrainingId) -> rusqlite::Result<Option<Training>> {
    conn.query_row(
        &format!("SELECT {} FROM trainings WHERE id = ?", TRAINING_COLUMNS),
        [id.get()],
        training_from_row,
    )
    .optional()
}

fn fetch_template(conn: &Connection, id: TemplateId) -> rusqlite::Result<Option<WeekTemplate>> {
    conn.query_row(
        &format!("SELECT {} FROM week_templates WHERE id = ?", TEMPLATE_COLUMNS),
        [id.get()],
        template_from_row,
    )
    .optional()
}

fn query_trainings(
    conn: &Connection,
    filter: &str,
    args: &[&dyn ToSql],
) -> StoreResult<Vec<Training>> {
    let sql = format!(
        "SELECT {} FROM trainings WHERE {} ORDER BY training_date, start_time, id",
        TRAINING_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, training_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn insert_training(conn: &Connection, training: &NewTraining, conflict: &str) -> rusqlite::Result<usize> {
    let now = fmt_ts(&spectrum_util::now());
    conn.execute(
        &format!(
            r#"
            INSERT INTO trainings (group_id, coach_id, training_date, start_time, end_time,
                                   description, max_participants, created_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            {}
            "#,
            conflict
        ),
        params![
            training.group_id.get(),
            training.coach_id.map(CoachId::get),
            fmt_date(training.date),
            fmt_time(training.start_time),
            fmt_time(training.end_time),
            training.description,
            training.max_participants,
            training.created_by.map(UserId::get),
            now,
        ],
    )
}

impl TrainingStore for SqliteStore {
    fn create_training(&self, training: &NewTraining) -> StoreResult<Training> {
        let conn = self.lock()?;

        insert_training(&conn, training, "").map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "group {} already has a training on {} at {}",
                    training.group_id, training.date, training.start_time
                ))
            } else {
                e.into()
            }
        })?;

        let id = TrainingId::new(conn.last_insert_rowid());
        debug!(training_id = %id, group_id = %training.group_id, "Training inserted");
        fetch_training(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("training {}", id)))
    }

    fn insert_training_if_absent(&self, training: &NewTraining) -> StoreResult<Option<Training>> {
        let conn = self.lock()?;

        let inserted = insert_training(
            &conn,
            training,
            "ON CONFLICT (group_id, training_date, start_time) DO NOTHING",
        )?;
        if inserted == 0 {
            return Ok(None);
        }

        let id = TrainingId::new(conn.last_insert_rowid());
        Ok(fetch_training(&conn, id)?)
    }

    fn get_training(&self, id: TrainingId) -> StoreResult<Option<Training>> {
        let conn = self.lock()?;
        Ok(fetch_training(&conn, id)?)
    }

    fn list_trainings(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<Training>> {
        let conn = self.lock()?;
        query_trainings(
            &conn,
            "training_date BETWEEN ?1 AND ?2",
            &[&fmt_date(from), &fmt_date(to)],
        )
    }

    fn list_group_trainings(
        &self,
        group_id: GroupId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Training>> {
        let conn = self.lock()?;
        query_trainings(
            &conn,
            "group_id = ?1 AND training_date BETWEEN ?2 AND ?3",
            &[&group_id.get(), &fmt_date(from), &fmt_date(to)],
        )
    }

    fn list_coach_trainings(
        &self,
        coach_id: CoachId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Training>> {
        let conn = self.lock()?;
        query_trainings(
            &conn,
            "coach_id = ?1 AND training_date BETWEEN ?2 AND ?3",
            &[&coach_id.get(), &fmt_date(from), &fmt_date(to)],
        )
    }

    fn update_training(&self, id: TrainingId, update: &TrainingUpdate) -> StoreResult<Training> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(group_id) = update.group_id {
            sets.push("group_id = ?");
            values.push(Box::new(group_id.get()));
        }
        if let Some(coach_id) = update.coach_id {
            sets.push("coach_id = ?");
            values.push(Box::new(coach_id.map(CoachId::get)));
        }
        if let Some(date) = update.date {
            sets.push("training_date = ?");
            values.push(Box::new(fmt_date(date)));
        }
        if let Some(start_time) = update.start_time {
            sets.push("start_time = ?");
            values.push(Box::new(fmt_time(start_time)));
        }
        if let Some(end_time) = update.end_time {
            sets.push("end_time = ?");
            values.push(Box::new(fmt_time(end_time)));
        }
        if let Some(description) = &update.description {
            sets.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        if let Some(max_participants) = update.max_participants {
            sets.push("max_participants = ?");
            values.push(Box::new(max_participants));
        }
        if sets.is_empty() {
            return Err(StoreError::Database("empty training update".into()));
        }

        sets.push("updated_at = ?");
        values.push(Box::new(fmt_ts(&spectrum_util::now())));
        values.push(Box::new(id.get()));

        let conn = self.lock()?;
        let sql = format!("UPDATE trainings SET {} WHERE id = ?", sets.join(", "));
        let changed = conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("training {} would take an occupied slot", id))
                } else {
                    e.into()
                }
            })?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("training {}", id)));
        }

        debug!(training_id = %id, fields = sets.len() - 1, "Training updated");
        fetch_training(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("training {}", id)))
    }

    fn delete_training(&self, id: TrainingId) -> StoreResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM attendance WHERE training_id = ?", [id.get()])?;
        let deleted = tx.execute("DELETE FROM trainings WHERE id = ?", [id.get()])?;
        tx.commit()?;

        Ok(deleted > 0)
    }
}

impl TemplateStore for SqliteStore {
    fn create_template(&self, template: &NewTemplate) -> StoreResult<WeekTemplate> {
        let conn = self.lock()?;
        let now = fmt_ts(&spectrum_util::now());

        conn.execute(
            r#"
            INSERT INTO week_templates (group_id, day_of_week, start_time, end_time,
                                        description, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
            "#,
            params![
                template.group_id.get(),
                template.day_of_week,
                template.start_time,
                template.end_time,
                template.description,
                now,
            ],
        )?;

        let id = TemplateId::new(conn.last_insert_rowid());
        fetch_template(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("template {}", id)))
    }

    fn get_template(&self, id: TemplateId) -> StoreResult<Option<WeekTemplate>> {
        let conn = self.lock()?;
        Ok(fetch_template(&conn, id)?)
    }

    fn list_active_templates(&self) -> StoreResult<Vec<WeekTemplate>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM week_templates WHERE is_active = 1 ORDER BY day_of_week, start_time, id",
            TEMPLATE_COLUMNS
        ))?;
        let rows = stmt.query_map([], template_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn list_group_templates(&self, group_id: GroupId) -> StoreResult<Vec<WeekTemplate>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM week_templates WHERE group_id = ? ORDER BY day_of_week, start_time, id",
            TEMPLATE_COLUMNS
        ))?;
        let rows = stmt.query_map([group_id.get()], template_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn update_template(
        &self,
        id: TemplateId,
        update: &TemplateUpdate,
    ) -> StoreResult<WeekTemplate> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(group_id) = update.group_id {
            sets.push("group_id = ?");
            values.push(Box::new(group_id.get()));
        }
        if let Some(day_of_week) = update.day_of_week {
            sets.push("day_of_week = ?");
            values.push(Box::new(day_of_week));
        }
        if let Some(start_time) = &update.start_time {
            sets.push("start_time = ?");
            values.push(Box::new(start_time.clone()));
        }
        if let Some(end_time) = &update.end_time {
            sets.push("end_time = ?");
            values.push(Box::new(end_time.clone()));
        }
        if let Some(description) = &update.description {
            sets.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        if let Some(is_active) = update.is_active {
            sets.push("is_active = ?");
            values.push(Box::new(is_active));
        }
        if sets.is_empty() {
            return Err(StoreError::Database("empty template update".into()));
        }

        sets.push("updated_at = ?");
        values.push(Box::new(fmt_ts(&spectrum_util::now())));
        values.push(Box::new(id.get()));

        let conn = self.lock()?;
        let sql = format!("UPDATE week_templates SET {} WHERE id = ?", sets.join(", "));
        if conn.execute(&sql, params_from_iter(values.iter()))? == 0 {
            return Err(StoreError::NotFound(format!("template {}", id)));
        }

        fetch_template(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("template {}", id)))
    }

    fn delete_template(&self, id: TemplateId) -> StoreResult<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM week_templates WHERE id = ?", [id.get()])? > 0)
    }
}
