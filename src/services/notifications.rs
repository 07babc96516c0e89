//! Notification center: the in-memory owner of the device's reconciled feed.
//!
//! Every mutation goes through one write lock, recomputes the `read` flags
//! with [`reconcile_with`], publishes the result on a watch channel and then
//! writes it to the local cache. Persistence is best effort: a failed write is
//! logged and the in-memory state is still updated.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::{watch, RwLock};

use crate::db::models::{NotificationItem, ReadState};
use crate::db::repository::{FeedCacheRepository, ReadStateRepository};
use crate::services::feed::FeedError;
use crate::services::reconcile::{reconcile_with, unread_count};

struct CenterState {
    read_state: ReadState,
    items: Vec<NotificationItem>,
}

pub struct NotificationCenter {
    pool: SqlitePool,
    state: RwLock<CenterState>,
    notifications: watch::Sender<Vec<NotificationItem>>,
    loading: watch::Sender<bool>,
    errors: watch::Sender<Option<FeedError>>,
}

impl NotificationCenter {
    pub async fn new(pool: SqlitePool) -> Self {
        Self::new_at(pool, Utc::now()).await
    }

    /// Seed the center from the store and the feed cache. `now` becomes the
    /// watermark when this device has none yet.
    pub async fn new_at(pool: SqlitePool, now: DateTime<Utc>) -> Self {
        let last_seen_at = match ReadStateRepository::init_last_seen(&pool, now).await {
            Ok(at) => at,
            Err(e) => {
                tracing::warn!("Failed to load last-seen watermark, using now: {}", e);
                now
            }
        };

        let read_ids = ReadStateRepository::get_read_ids(&pool)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load read notification ids: {}", e);
                Default::default()
            });

        let cached = FeedCacheRepository::load(&pool).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load cached notifications: {}", e);
            Vec::new()
        });

        let mut read_state = ReadState::new(last_seen_at);
        read_state.read_ids = read_ids;
        let items = reconcile_with(&cached, &read_state);

        let (notifications, _) = watch::channel(items.clone());
        let (loading, _) = watch::channel(false);
        let (errors, _) = watch::channel(None);

        Self {
            pool,
            state: RwLock::new(CenterState { read_state, items }),
            notifications,
            loading,
            errors,
        }
    }

    /// Latest published (reconciled) list.
    pub fn notifications(&self) -> Vec<NotificationItem> {
        self.notifications.borrow().clone()
    }

    pub fn subscribe_notifications(&self) -> watch::Receiver<Vec<NotificationItem>> {
        self.notifications.subscribe()
    }

    pub fn unread_count(&self) -> usize {
        unread_count(&self.notifications.borrow())
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.send_replace(loading);
    }

    pub fn last_error(&self) -> Option<FeedError> {
        self.errors.borrow().clone()
    }

    pub async fn read_state(&self) -> ReadState {
        self.state.read().await.read_state.clone()
    }

    /// Advance the watermark. Earlier values leave it unchanged.
    pub async fn set_last_seen(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let mut state = self.state.write().await;

        // The store rounds up to whole milliseconds; follow it when it answers.
        let effective = match ReadStateRepository::advance_last_seen(&self.pool, at).await {
            Ok(stored) => state.read_state.advance_last_seen(stored),
            Err(e) => {
                tracing::warn!("Failed to persist last-seen watermark: {}", e);
                state.read_state.advance_last_seen(at)
            }
        };

        self.publish(&mut state).await;
        effective
    }

    /// Replace the feed with a fresh server snapshot.
    pub async fn apply_snapshot(&self, items: Vec<NotificationItem>) {
        let mut state = self.state.write().await;
        state.items = items;

        self.errors.send_replace(None);
        self.loading.send_replace(false);
        self.publish(&mut state).await;

        tracing::debug!(
            "Applied feed snapshot: {} item(s), {} unread",
            state.items.len(),
            unread_count(&state.items)
        );
    }

    /// Record a feed failure. The last published list stays in place.
    pub fn apply_feed_error(&self, err: FeedError) {
        tracing::warn!("Notification feed error ({}): {}", err.kind(), err);
        self.errors.send_replace(Some(err));
        self.loading.send_replace(false);
    }

    /// Acknowledge one notification. Returns false when it was already in
    /// the explicit read set.
    pub async fn mark_as_read(&self, id: &str) -> bool {
        let mut state = self.state.write().await;

        if let Err(e) = ReadStateRepository::add_read_id(&self.pool, id).await {
            tracing::warn!("Failed to persist read id {}: {}", id, e);
        }
        let inserted = state.read_state.read_ids.insert(id.to_string());

        self.publish(&mut state).await;
        inserted
    }

    pub async fn mark_all_as_read(&self) -> DateTime<Utc> {
        self.mark_all_as_read_at(Utc::now()).await
    }

    /// Everything delivered at or before `at` becomes read and the explicit
    /// ids are dropped. Returns the effective watermark.
    pub async fn mark_all_as_read_at(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let mut state = self.state.write().await;

        let effective = match ReadStateRepository::mark_all_read(&self.pool, at).await {
            Ok(stored) => state.read_state.advance_last_seen(stored),
            Err(e) => {
                tracing::warn!("Failed to persist mark-all-as-read: {}", e);
                state.read_state.advance_last_seen(at)
            }
        };
        state.read_state.read_ids.clear();

        self.publish(&mut state).await;
        effective
    }

    /// Re-reconcile, notify observers and refresh the cache.
    async fn publish(&self, state: &mut CenterState) {
        state.items = reconcile_with(&state.items, &state.read_state);
        self.notifications.send_replace(state.items.clone());

        if let Err(e) = FeedCacheRepository::save(&self.pool, &state.items).await {
            tracing::warn!("Failed to cache notifications: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::init::test_pool;
    use chrono::{Duration, TimeZone};
    use std::collections::{BTreeMap, HashSet};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 7, 0, 0).unwrap()
    }

    fn item(id: &str, offset_secs: i64) -> NotificationItem {
        NotificationItem {
            id: id.to_string(),
            title: format!("title {}", id),
            body: String::new(),
            timestamp: t0() + Duration::seconds(offset_secs),
            data: BTreeMap::new(),
            expire_at: None,
            read: false,
        }
    }

    fn read_flags(center: &NotificationCenter) -> Vec<(String, bool)> {
        center
            .notifications()
            .into_iter()
            .map(|i| (i.id, i.read))
            .collect()
    }

    #[tokio::test]
    async fn first_run_uses_construction_time_as_watermark() {
        let center = NotificationCenter::new_at(test_pool().await, t0()).await;

        let state = center.read_state().await;
        assert_eq!(state.last_seen_at, t0());
        assert!(state.read_ids.is_empty());
        assert!(center.notifications().is_empty());
        assert_eq!(center.unread_count(), 0);
    }

    #[tokio::test]
    async fn read_state_scenarios() {
        let center = NotificationCenter::new_at(test_pool().await, t0() + Duration::seconds(5)).await;

        center.apply_snapshot(vec![item("b", 10), item("a", 0)]).await;
        assert_eq!(
            read_flags(&center),
            vec![("b".to_string(), false), ("a".to_string(), true)]
        );
        assert_eq!(center.unread_count(), 1);

        assert!(center.mark_as_read("b").await);
        assert!(!center.mark_as_read("b").await);
        let state = center.read_state().await;
        assert_eq!(state.read_ids, HashSet::from(["b".to_string()]));
        assert_eq!(center.unread_count(), 0);

        let at = t0() + Duration::seconds(20);
        assert_eq!(center.mark_all_as_read_at(at).await, at);
        let state = center.read_state().await;
        assert_eq!(state.last_seen_at, at);
        assert!(state.read_ids.is_empty());
        assert!(center.notifications().iter().all(|i| i.read));
    }

    #[tokio::test]
    async fn mark_all_leaves_future_items_unread() {
        let center = NotificationCenter::new_at(test_pool().await, t0()).await;
        center.apply_snapshot(vec![item("later", 60), item("now", 10)]).await;

        center.mark_all_as_read_at(t0() + Duration::seconds(30)).await;

        assert_eq!(
            read_flags(&center),
            vec![("later".to_string(), false), ("now".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn mark_all_covers_items_in_the_same_millisecond() {
        let center = NotificationCenter::new_at(test_pool().await, t0()).await;
        let mut same_ms = item("a", 3_600);
        same_ms.timestamp = same_ms.timestamp + Duration::microseconds(400);
        let at = t0() + Duration::seconds(3_600) + Duration::microseconds(900);
        center.apply_snapshot(vec![same_ms]).await;

        let effective = center.mark_all_as_read_at(at).await;

        assert!(effective >= at);
        assert_eq!(center.unread_count(), 0);
    }

    #[tokio::test]
    async fn set_last_seen_is_clamped() {
        let center = NotificationCenter::new_at(test_pool().await, t0()).await;

        assert_eq!(center.set_last_seen(t0() - Duration::hours(1)).await, t0());
        let later = t0() + Duration::minutes(1);
        assert_eq!(center.set_last_seen(later).await, later);
        assert_eq!(center.read_state().await.last_seen_at, later);
    }

    #[tokio::test]
    async fn state_survives_a_restart() {
        let pool = test_pool().await;

        {
            let center = NotificationCenter::new_at(pool.clone(), t0()).await;
            center.apply_snapshot(vec![item("b", 20), item("a", 10)]).await;
            center.mark_as_read("a").await;
        }

        // A later launch must not move the stored watermark.
        let center = NotificationCenter::new_at(pool, t0() + Duration::days(1)).await;
        let state = center.read_state().await;
        assert_eq!(state.last_seen_at, t0());
        assert!(state.read_ids.contains("a"));
        assert_eq!(
            read_flags(&center),
            vec![("b".to_string(), false), ("a".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn feed_error_keeps_last_good_list() {
        let center = NotificationCenter::new_at(test_pool().await, t0()).await;
        center.apply_snapshot(vec![item("a", 10)]).await;
        center.set_loading(true);

        center.apply_feed_error(FeedError::Unavailable("offline".into()));

        assert_eq!(center.notifications().len(), 1);
        assert_eq!(center.last_error(), Some(FeedError::Unavailable("offline".into())));
        assert!(!center.is_loading());

        center.apply_snapshot(vec![item("a", 10), item("b", 20)]).await;
        assert_eq!(center.last_error(), None);
        assert_eq!(center.notifications().len(), 2);
    }

    #[tokio::test]
    async fn observers_see_every_change() {
        let center = NotificationCenter::new_at(test_pool().await, t0()).await;
        let mut rx = center.subscribe_notifications();

        center.apply_snapshot(vec![item("a", 10)]).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        center.mark_as_read("a").await;
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update()[0].read);
    }

    #[tokio::test]
    async fn persistence_failures_are_not_fatal() {
        let pool = test_pool().await;
        let center = NotificationCenter::new_at(pool.clone(), t0()).await;
        center.apply_snapshot(vec![item("a", 10), item("b", 20)]).await;

        pool.close().await;

        assert!(center.mark_as_read("a").await);
        assert_eq!(center.unread_count(), 1);
        center.mark_all_as_read_at(t0() + Duration::minutes(5)).await;
        assert_eq!(center.unread_count(), 0);
    }

    #[tokio::test]
    async fn closed_store_falls_back_to_now() {
        let pool = test_pool().await;
        pool.close().await;

        let center = NotificationCenter::new_at(pool, t0()).await;

        assert_eq!(center.read_state().await.last_seen_at, t0());
        assert!(center.notifications().is_empty());
    }
}
