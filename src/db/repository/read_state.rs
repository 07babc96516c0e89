use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};

use crate::error::{AppError, AppResult};

const LAST_SEEN_KEY: &str = "lastSeenAt";

fn from_millis(ms: i64) -> AppResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "stored {} out of range: {}",
            LAST_SEEN_KEY,
            ms
        ))
    })
}

/// Watermarks are stored in whole milliseconds, rounded up so that anything
/// at or before the requested moment stays covered.
fn to_stored_millis(at: DateTime<Utc>) -> i64 {
    let ms = at.timestamp_millis();
    if at.timestamp_subsec_nanos() % 1_000_000 == 0 {
        ms
    } else {
        ms + 1
    }
}

// ============================================================================
// Read-State Repository
// ============================================================================

/// Device-local read tracking: the `lastSeenAt` watermark and the set of
/// explicitly read notification ids.
///
/// The watermark is only ever moved forward. The clamp happens inside the
/// upsert (`MAX(stored, new)`) so concurrent writers cannot move it back.
pub struct ReadStateRepository;

impl ReadStateRepository {
    /// Stored watermark, if this device has one yet.
    pub async fn get_last_seen(pool: &SqlitePool) -> AppResult<Option<DateTime<Utc>>> {
        let value: Option<Option<i64>> =
            sqlx::query_scalar("SELECT int_value FROM device_state WHERE key = ?")
                .bind(LAST_SEEN_KEY)
                .fetch_optional(pool)
                .await
                .map_err(AppError::Database)?;

        value.flatten().map(from_millis).transpose()
    }

    /// Return the stored watermark, writing `now` first when none exists.
    ///
    /// Called once per session so the first launch on a device fixes the
    /// watermark at install time.
    pub async fn init_last_seen(pool: &SqlitePool, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        let now_ms = to_stored_millis(now);

        sqlx::query(
            r#"
            INSERT INTO device_state (key, int_value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(LAST_SEEN_KEY)
        .bind(now_ms)
        .bind(now_ms)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        match Self::get_last_seen(pool).await? {
            Some(stored) => Ok(stored),
            None => Ok(now),
        }
    }

    /// Persist `at` as the watermark unless the stored one is later.
    /// Returns the effective stored value.
    pub async fn advance_last_seen(pool: &SqlitePool, at: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        let mut conn = pool.acquire().await.map_err(AppError::Database)?;
        Self::advance_last_seen_with(&mut *conn, at).await
    }

    async fn advance_last_seen_with(
        conn: &mut sqlx::SqliteConnection,
        at: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>> {
        let at_ms = to_stored_millis(at);
        let updated_at = Utc::now().timestamp_millis();

        let stored: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO device_state (key, int_value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                int_value = MAX(COALESCE(device_state.int_value, excluded.int_value), excluded.int_value),
                updated_at = excluded.updated_at
            RETURNING int_value
            "#,
        )
        .bind(LAST_SEEN_KEY)
        .bind(at_ms)
        .bind(updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        if stored > at_ms {
            tracing::debug!(
                "Ignored attempt to move {} back from {} to {}",
                LAST_SEEN_KEY,
                stored,
                at_ms
            );
        }

        from_millis(stored)
    }

    pub async fn get_read_ids(pool: &SqlitePool) -> AppResult<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM read_notification_ids")
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(ids.into_iter().collect())
    }

    /// Record `id` as read. Returns false when it was already recorded.
    pub async fn add_read_id(pool: &SqlitePool, id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO read_notification_ids (id, marked_at) VALUES (?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(Utc::now().timestamp_millis())
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop every explicit id. Accepts a pool or an open transaction.
    pub async fn clear_read_ids<'e, E>(executor: E) -> AppResult<u64>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM read_notification_ids")
            .execute(executor)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Advance the watermark to `at` and drop the explicit ids in one
    /// transaction. Returns the effective watermark.
    pub async fn mark_all_read(pool: &SqlitePool, at: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let stored = Self::advance_last_seen_with(&mut *tx, at).await?;

        Self::clear_read_ids(&mut *tx).await?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(stored)
    }
}
