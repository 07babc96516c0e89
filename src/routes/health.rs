use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub database: String,
    pub feed: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!("Health check database ping failed: {}", e);
            "unavailable"
        }
    };

    // The service keeps answering from memory without the local store.
    let status = if database == "ok" { "healthy" } else { "degraded" };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database: database.to_string(),
        feed: state.subscriber.state().as_str().to_string(),
    };

    (StatusCode::OK, Json(response))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{call, test_app};
    use chrono::Utc;

    #[tokio::test]
    async fn reports_database_and_feed_state() {
        let app = test_app(Utc::now()).await;

        let (status, body) = call(&app.router, "GET", "/health", None).await;

        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "ok");
        assert_eq!(body["feed"], "idle");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn closed_database_is_degraded() {
        let app = test_app(Utc::now()).await;
        app.state.db.close().await;

        let (status, body) = call(&app.router, "GET", "/health", None).await;

        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(body["status"], "degraded");
    }
}
