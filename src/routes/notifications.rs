use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::NotificationItem;
use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::routes::resolve_lang;
use crate::services::feed::FeedError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(get_unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/last-seen", put(set_last_seen))
        .route(
            "/subscription",
            post(start_subscription).delete(stop_subscription),
        )
        .route("/:id/read", post(mark_read))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LangQuery {
    pub lang: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsListResponse {
    pub items: Vec<NotificationResponse>,
    pub unread_count: usize,
    pub last_seen_at: DateTime<Utc>,
    pub is_loading: bool,
    pub error: Option<FeedErrorResponse>,
    pub subscription: &'static str,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: String,
    pub title: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub expire_at: Option<DateTime<Utc>>,
    pub data: BTreeMap<String, String>,
    pub read: bool,
    pub kind: &'static str,
    pub kind_label: String,
    pub item_id: Option<String>,
    pub time_ago: String,
}

#[derive(Debug, Serialize)]
pub struct FeedErrorResponse {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub id: String,
    /// False when the id had already been acknowledged.
    pub newly_read: bool,
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub last_seen_at: DateTime<Utc>,
    pub unread_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct SetLastSeenRequest {
    /// Epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LastSeenResponse {
    pub last_seen_at: DateTime<Utc>,
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub state: &'static str,
}

impl NotificationResponse {
    fn from_item(item: NotificationItem, lang: Option<&str>, now: DateTime<Utc>) -> Self {
        let kind = item.kind();
        let item_id = item.item_id().map(str::to_string);
        let time_ago = i18n::time_ago(lang, item.timestamp, now);

        Self {
            kind: kind.as_str(),
            kind_label: i18n::tr(lang, &format!("notification.kind.{}", kind.as_str()), None),
            item_id,
            time_ago,
            id: item.id,
            title: item.title,
            body: item.body,
            timestamp: item.timestamp,
            expire_at: item.expire_at,
            data: item.data,
            read: item.read,
        }
    }
}

impl From<FeedError> for FeedErrorResponse {
    fn from(err: FeedError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Reconciled feed, newest first, with the current loading/error state
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LangQuery>,
) -> AppResult<Json<NotificationsListResponse>> {
    let lang = resolve_lang(query.lang.as_deref())?;
    let now = Utc::now();

    let items = state.center.notifications();
    let unread_count = items.iter().filter(|i| !i.read).count();
    let last_seen_at = state.center.read_state().await.last_seen_at;

    Ok(Json(NotificationsListResponse {
        items: items
            .into_iter()
            .map(|item| NotificationResponse::from_item(item, lang.as_deref(), now))
            .collect(),
        unread_count,
        last_seen_at,
        is_loading: state.center.is_loading(),
        error: state.center.last_error().map(FeedErrorResponse::from),
        subscription: state.subscriber.state().as_str(),
    }))
}

async fn get_unread_count(State(state): State<Arc<AppState>>) -> Json<UnreadCountResponse> {
    Json(UnreadCountResponse {
        unread_count: state.center.unread_count(),
    })
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<MarkReadResponse>> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::Validation(i18n::tr(
            None,
            "error.empty_notification_id",
            None,
        )));
    }

    let newly_read = state.center.mark_as_read(id).await;

    Ok(Json(MarkReadResponse {
        id: id.to_string(),
        newly_read,
        unread_count: state.center.unread_count(),
    }))
}

async fn mark_all_read(State(state): State<Arc<AppState>>) -> Json<MarkAllReadResponse> {
    let last_seen_at = state.center.mark_all_as_read().await;

    Json(MarkAllReadResponse {
        last_seen_at,
        unread_count: state.center.unread_count(),
    })
}

/// Move the watermark forward; earlier values are ignored
async fn set_last_seen(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetLastSeenRequest>,
) -> Json<LastSeenResponse> {
    let last_seen_at = state.center.set_last_seen(req.last_seen_at).await;

    Json(LastSeenResponse {
        last_seen_at,
        unread_count: state.center.unread_count(),
    })
}

async fn start_subscription(State(state): State<Arc<AppState>>) -> Json<SubscriptionResponse> {
    state.subscriber.subscribe();
    Json(SubscriptionResponse {
        state: state.subscriber.state().as_str(),
    })
}

async fn stop_subscription(State(state): State<Arc<AppState>>) -> Json<SubscriptionResponse> {
    state.subscriber.unsubscribe();
    Json(SubscriptionResponse {
        state: state.subscriber.state().as_str(),
    })
}
