use std::sync::Arc;

use axum::{routing::get, Router};
use http::HeaderValue;
use tower_http::cors::CorsLayer;

use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::AppState;

pub mod health;
pub mod notifications;
pub mod push;

/// All routes, with state applied. Middleware layers are added by `main`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/notifications", notifications::router())
        .nest("/api/push", push::router())
        .fallback(not_found)
        .with_state(state)
}

/// CORS for the front-end origin, covering every method the API routes use.
pub fn cors_layer(frontend_origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(frontend_origin)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT])
}

async fn not_found() -> AppError {
    AppError::NotFound("No such route".to_string())
}

/// Normalize an optional `?lang=` value, rejecting languages without
/// translations.
pub(crate) fn resolve_lang(lang: Option<&str>) -> AppResult<Option<String>> {
    let Some(raw) = lang.filter(|l| !l.trim().is_empty()) else {
        return Ok(None);
    };

    let lang = i18n::normalize_language(raw);
    if !i18n::is_supported_language(&lang) {
        return Err(AppError::BadRequest(i18n::tr(
            None,
            "error.unsupported_language",
            Some(&[("lang", raw)]),
        )));
    }
    Ok(Some(lang))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::{body::Body, http::Request, Router};
    use chrono::{DateTime, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::services::feed::testing::ChannelFeedSource;
    use crate::services::init::test_pool;
    use crate::services::notifications::NotificationCenter;
    use crate::services::subscriber::FeedSubscriber;
    use crate::AppState;

    pub struct TestApp {
        pub state: Arc<AppState>,
        pub source: Arc<ChannelFeedSource>,
        pub router: Router,
    }

    pub async fn test_app(now: DateTime<Utc>) -> TestApp {
        let db = test_pool().await;
        let center = Arc::new(NotificationCenter::new_at(db.clone(), now).await);
        let source = Arc::new(ChannelFeedSource::default());
        let subscriber = Arc::new(FeedSubscriber::new(source.clone(), center.clone()));

        let state = Arc::new(AppState {
            db,
            center,
            subscriber,
        });

        TestApp {
            router: super::app(state.clone()),
            state,
            source,
        }
    }

    /// Send one request and decode the JSON body.
    pub async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (http::StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
