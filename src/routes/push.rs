use std::sync::Arc;

use axum::{
    extract::Query,
    routing::post,
    Json, Router,
};

use crate::error::AppResult;
use crate::routes::notifications::LangQuery;
use crate::routes::resolve_lang;
use crate::services::push::{resolve, DisplayNotification, PushMessage};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(resolve_push))
}

/// Resolve what an incoming push message would display
async fn resolve_push(
    Query(query): Query<LangQuery>,
    Json(message): Json<PushMessage>,
) -> AppResult<Json<DisplayNotification>> {
    let lang = resolve_lang(query.lang.as_deref())?;

    let shown = resolve(&message, lang.as_deref());
    tracing::debug!("Resolved push message to '{}'", shown.title);

    Ok(Json(shown))
}
