use std::sync::Arc;

use http::HeaderValue;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod i18n;
mod routes;
mod services;

use config::Config;
use services::{init, notifications::NotificationCenter, subscriber::FeedSubscriber};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub center: Arc<NotificationCenter>,
    pub subscriber: Arc<FeedSubscriber>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lostfound_notifications=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Campus Lost & Found notification service");

    // Initialize database
    let pool = init::init_db(&config).await?;

    // Seed the notification center from the local store and start the feed
    let (center, subscriber) = init::init_notifications(&config, pool.clone()).await?;

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        center,
        subscriber: subscriber.clone(),
    });

    let frontend_origin = config
        .server
        .frontend_url
        .parse::<HeaderValue>()
        .map_err(|e| anyhow::anyhow!("Invalid FRONTEND_URL for CORS: {}", e))?;

    // Build router
    let app = routes::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(routes::cors_layer(frontend_origin));

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(listener, app);

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
    }

    subscriber.unsubscribe();
    pool.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to bind SIGTERM, only Ctrl+C will stop the server: {}", e);
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
