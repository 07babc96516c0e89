use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::NotificationItem;
use crate::error::{AppError, AppResult};

const CACHE_KEY: &str = "cached_notifications";

// ============================================================================
// Feed Cache Repository
// ============================================================================

/// Last known notification list, kept so there is something to show before
/// the live feed answers (and after the server has expired old documents).
pub struct FeedCacheRepository;

impl FeedCacheRepository {
    /// Replace the cached list with `items`, keeping their order.
    pub async fn save(pool: &SqlitePool, items: &[NotificationItem]) -> AppResult<()> {
        let payload = serde_json::to_string(items)?;
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO device_state (key, text_value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                text_value = excluded.text_value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(CACHE_KEY)
        .bind(payload)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Cached list, or an empty one when nothing was saved yet.
    ///
    /// Entries that no longer decode are skipped; only a payload that is not
    /// a JSON array at all is an error.
    pub async fn load(pool: &SqlitePool) -> AppResult<Vec<NotificationItem>> {
        let payload: Option<Option<String>> =
            sqlx::query_scalar("SELECT text_value FROM device_state WHERE key = ?")
                .bind(CACHE_KEY)
                .fetch_optional(pool)
                .await
                .map_err(AppError::Database)?;

        let payload = match payload.flatten() {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Ok(Vec::new()),
        };

        let entries: Vec<serde_json::Value> = serde_json::from_str(&payload)?;
        let total = entries.len();

        let items: Vec<NotificationItem> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::debug!("Skipping malformed cached notification: {}", e);
                    None
                }
            })
            .collect();

        if items.len() < total {
            tracing::warn!(
                "Dropped {} malformed entries from the notification cache",
                total - items.len()
            );
        }

        Ok(items)
    }
}
