//! Subscriptions and the lesson debit

use chrono::{DateTime, Local};
use rusqlite::{Connection, OptionalExtension, Row, params};
use spectrum_api::{NewSubscription, Subscription};
use spectrum_util::{StudentId, SubscriptionId};
use tracing::debug;

use super::{SqliteStore, fmt_ts, get_opt_ts, get_ts};
use crate::{StoreError, StoreResult, SubscriptionStore};

const SUBSCRIPTION_COLUMNS: &str =
    "id, student_id, total_lessons, remaining_lessons, start_date, end_date, created_at";

/// Newest active subscription first; ties on creation time go to the later row
const ACTIVE_FILTER: &str = "student_id = ?1 AND remaining_lessons > 0 \
     AND (end_date IS NULL OR end_date > ?2) \
     ORDER BY created_at DESC, id DESC LIMIT 1";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: SubscriptionId::new(row.get(0)?),
        student_id: StudentId::new(row.get(1)?),
        total_lessons: row.get(2)?,
        remaining_lessons: row.get(3)?,
        start_date: get_ts(row, 4)?,
        end_date: get_opt_ts(row, 5)?,
        created_at: get_ts(row, 6)?,
    })
}

fn fetch_subscription(
    conn: &Connection,
    id: SubscriptionId,
) -> rusqlite::Result<Option<Subscription>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM subscriptions WHERE id = ?",
            SUBSCRIPTION_COLUMNS
        ),
        [id.get()],
        subscription_from_row,
    )
    .optional()
}

impl SubscriptionStore for SqliteStore {
    fn create_subscription(&self, subscription: &NewSubscription) -> StoreResult<Subscription> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO subscriptions (student_id, total_lessons, remaining_lessons,
                                       start_date, end_date, created_at)
            VALUES (?1, ?2, ?2, ?3, ?4, ?5)
            "#,
            params![
                subscription.student_id.get(),
                subscription.total_lessons,
                fmt_ts(&subscription.start_date),
                subscription.end_date.as_ref().map(fmt_ts),
                fmt_ts(&spectrum_util::now()),
            ],
        )?;

        let id = SubscriptionId::new(conn.last_insert_rowid());
        fetch_subscription(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("subscription {}", id)))
    }

    fn get_subscription(&self, id: SubscriptionId) -> StoreResult<Option<Subscription>> {
        let conn = self.lock()?;
        Ok(fetch_subscription(&conn, id)?)
    }

    fn list_student_subscriptions(&self, student_id: StudentId) -> StoreResult<Vec<Subscription>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscriptions WHERE student_id = ? ORDER BY created_at DESC, id DESC",
            SUBSCRIPTION_COLUMNS
        ))?;
        let rows = stmt.query_map([student_id.get()], subscription_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn list_all_subscriptions(&self) -> StoreResult<Vec<Subscription>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscriptions ORDER BY student_id, created_at DESC, id DESC",
            SUBSCRIPTION_COLUMNS
        ))?;
        let rows = stmt.query_map([], subscription_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn active_subscription(
        &self,
        student_id: StudentId,
        now: DateTime<Local>,
    ) -> StoreResult<Option<Subscription>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM subscriptions WHERE {}",
                    SUBSCRIPTION_COLUMNS, ACTIVE_FILTER
                ),
                params![student_id.get(), fmt_ts(&now)],
                subscription_from_row,
            )
            .optional()?)
    }

    fn debit_lesson(
        &self,
        student_id: StudentId,
        now: DateTime<Local>,
    ) -> StoreResult<Option<Subscription>> {
        let conn = self.lock()?;

        // One statement: the row is chosen and decremented atomically, and the
        // outer guard keeps the balance from going negative.
        let debited = conn
            .query_row(
                &format!(
                    r#"
                    UPDATE subscriptions
                    SET remaining_lessons = remaining_lessons - 1
                    WHERE id = (SELECT id FROM subscriptions WHERE {})
                      AND remaining_lessons > 0
                    RETURNING {}
                    "#,
                    ACTIVE_FILTER, SUBSCRIPTION_COLUMNS
                ),
                params![student_id.get(), fmt_ts(&now)],
                subscription_from_row,
            )
            .optional()?;

        if let Some(subscription) = &debited {
            debug!(
                student_id = %student_id,
                subscription_id = %subscription.id,
                remaining = subscription.remaining_lessons,
                "Lesson debited"
            );
        }
        Ok(debited)
    }

    fn delete_subscription(&self, id: SubscriptionId) -> StoreResult<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM subscriptions WHERE id = ?", [id.get()])? > 0)
    }
}
