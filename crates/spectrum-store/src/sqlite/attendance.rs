//! Attendance: sign-ups, cancellations, and attendance marks

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use spectrum_api::{Attendance, AttendanceStatus, Booking, Participant, TrainingStats, TrainingView};
use spectrum_util::{AttendanceId, CoachId, StudentId, TrainingId};
use tracing::debug;

use super::trainings::training_from_row_at;
use super::{SqliteStore, conversion_error, display_name, fmt_date, fmt_ts, get_opt_ts, get_ts};
use crate::{AttendanceMarkInput, AttendanceStore, Registration, StoreError, StoreResult};

const ATTENDANCE_COLUMNS: &str = "a.id, a.training_id, a.student_id, a.status, a.attended, \
     a.notes, a.recorded_by, a.recorded_at, a.created_at";

fn attendance_from_row(row: &Row<'_>) -> rusqlite::Result<Attendance> {
    let status: String = row.get(3)?;
    Ok(Attendance {
        id: AttendanceId::new(row.get(0)?),
        training_id: TrainingId::new(row.get(1)?),
        student_id: StudentId::new(row.get(2)?),
        status: AttendanceStatus::parse(&status)
            .ok_or_else(|| conversion_error(3, StoreError::Database(format!("unknown status {}", status))))?,
        attended: row.get(4)?,
        notes: row.get(5)?,
        recorded_by: row.get::<_, Option<i64>>(6)?.map(CoachId::new),
        recorded_at: get_opt_ts(row, 7)?,
        created_at: get_ts(row, 8)?,
    })
}

fn fetch_registration(
    conn: &Connection,
    training_id: TrainingId,
    student_id: StudentId,
) -> rusqlite::Result<Option<Attendance>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM attendance a \
             WHERE a.training_id = ? AND a.student_id = ? AND a.status = 'registered'",
            ATTENDANCE_COLUMNS
        ),
        [training_id.get(), student_id.get()],
        attendance_from_row,
    )
    .optional()
}

impl AttendanceStore for SqliteStore {
    fn register_attendance(
        &self,
        training_id: TrainingId,
        student_id: StudentId,
    ) -> StoreResult<Registration> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let capacity: Option<Option<u32>> = tx
            .query_row(
                "SELECT max_participants FROM trainings WHERE id = ?",
                [training_id.get()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(capacity) = capacity else {
            return Ok(Registration::TrainingMissing);
        };

        if fetch_registration(&tx, training_id, student_id)?.is_some() {
            return Ok(Registration::AlreadyRegistered);
        }

        if let Some(capacity) = capacity {
            let registered: u32 = tx.query_row(
                "SELECT COUNT(*) FROM attendance WHERE training_id = ? AND status = 'registered'",
                [training_id.get()],
                |row| row.get(0),
            )?;
            if registered >= capacity {
                return Ok(Registration::Full { capacity });
            }
        }

        tx.execute(
            r#"
            INSERT INTO attendance (training_id, student_id, status, attended, created_at)
            VALUES (?, ?, 'registered', 0, ?)
            "#,
            params![training_id.get(), student_id.get(), fmt_ts(&spectrum_util::now())],
        )?;

        let attendance = fetch_registration(&tx, training_id, student_id)?
            .ok_or_else(|| StoreError::NotFound(format!("attendance for training {}", training_id)))?;
        tx.commit()?;

        debug!(training_id = %training_id, student_id = %student_id, "Registration inserted");
        Ok(Registration::Created(attendance))
    }

    fn cancel_registration(
        &self,
        training_id: TrainingId,
        student_id: StudentId,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            r#"
            UPDATE attendance SET status = 'cancelled'
            WHERE training_id = ? AND student_id = ? AND status = 'registered'
            "#,
            [training_id.get(), student_id.get()],
        )?;
        Ok(changed > 0)
    }

    fn get_registration(
        &self,
        training_id: TrainingId,
        student_id: StudentId,
    ) -> StoreResult<Option<Attendance>> {
        let conn = self.lock()?;
        Ok(fetch_registration(&conn, training_id, student_id)?)
    }

    fn set_attended(
        &self,
        training_id: TrainingId,
        student_id: StudentId,
        mark: &AttendanceMarkInput,
    ) -> StoreResult<Option<bool>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(existing) = fetch_registration(&tx, training_id, student_id)? else {
            return Ok(None);
        };

        tx.execute(
            r#"
            UPDATE attendance
            SET attended = ?, notes = COALESCE(?, notes), recorded_by = ?, recorded_at = ?
            WHERE id = ?
            "#,
            params![
                mark.attended,
                mark.notes,
                mark.recorded_by.map(CoachId::get),
                fmt_ts(&mark.recorded_at),
                existing.id.get(),
            ],
        )?;
        tx.commit()?;

        Ok(Some(existing.attended))
    }

    fn count_registered(&self, training_id: TrainingId) -> StoreResult<u32> {
        let conn = self.lock()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE training_id = ? AND status = 'registered'",
            [training_id.get()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn list_participants(&self, training_id: TrainingId) -> StoreResult<Vec<Participant>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT a.id, a.student_id, u.first_name, u.last_name, a.attended, a.created_at
            FROM attendance a
            JOIN students s ON s.id = a.student_id
            JOIN users u ON u.id = s.user_id
            WHERE a.training_id = ? AND a.status = 'registered'
            ORDER BY u.first_name, u.last_name, a.id
            "#,
        )?;

        let rows = stmt.query_map([training_id.get()], |row| {
            Ok(Participant {
                attendance_id: AttendanceId::new(row.get(0)?),
                student_id: StudentId::new(row.get(1)?),
                name: display_name(row.get(2)?, row.get(3)?),
                attended: row.get(4)?,
                registered_at: get_ts(row, 5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn training_stats(&self, training_id: TrainingId) -> StoreResult<TrainingStats> {
        let conn = self.lock()?;
        let (registered, present): (u32, u32) = conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(attended), 0)
            FROM attendance
            WHERE training_id = ? AND status = 'registered'
            "#,
            [training_id.get()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(TrainingStats {
            registered,
            present,
            absent: registered - present,
        })
    }

    fn list_student_bookings(
        &self,
        student_id: StudentId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Booking>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {},
                   t.id, t.group_id, t.coach_id, t.training_date, t.start_time, t.end_time,
                   t.description, t.max_participants, t.created_by, t.created_at, t.updated_at,
                   g.name
            FROM attendance a
            JOIN trainings t ON t.id = a.training_id
            JOIN training_groups g ON g.id = t.group_id
            WHERE a.student_id = ? AND a.status = 'registered'
              AND t.training_date BETWEEN ? AND ?
            ORDER BY t.training_date, t.start_time, t.id
            "#,
            ATTENDANCE_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![student_id.get(), fmt_date(from), fmt_date(to)],
            |row| {
                Ok(Booking {
                    attendance: attendance_from_row(row)?,
                    training: TrainingView {
                        training: training_from_row_at(row, 9)?,
                        group_name: row.get(20)?,
                    },
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
