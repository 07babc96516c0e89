use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin of the front-end allowed by CORS.
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Whether the feed subscription is started at boot.
    pub enabled: bool,
    /// Base URL of the document database REST API (without trailing slash).
    pub base_url: String,
    pub project_id: String,
    /// Optional API key appended as `?key=` to every request.
    pub api_key: Option<String>,
    /// Collection holding the globally shared notifications.
    pub collection: String,
    /// How often (seconds) the collection is polled for a new snapshot.
    pub poll_interval_seconds: u64,
    /// Upper bound on the number of documents fetched per snapshot.
    pub limit: Option<u32>,
    pub request_timeout_seconds: u64,
}

fn parse_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// `value` when set; required only while `enabled`.
fn required_if(
    enabled: bool,
    name: &str,
    value: Option<String>,
) -> Result<String, ConfigError> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => Ok(v),
        None if enabled => Err(ConfigError::MissingEnv(name.to_string())),
        None => Ok(String::new()),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let feed_enabled = parse_bool("FEED_ENABLED", true);

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/notifications.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            feed: FeedConfig {
                enabled: feed_enabled,
                base_url: env::var("FIRESTORE_BASE_URL")
                    .unwrap_or_else(|_| "https://firestore.googleapis.com/v1".to_string()),
                project_id: required_if(
                    feed_enabled,
                    "FIRESTORE_PROJECT_ID",
                    env::var("FIRESTORE_PROJECT_ID").ok(),
                )?,
                api_key: env::var("FIRESTORE_API_KEY").ok().filter(|k| !k.is_empty()),
                collection: env::var("FEED_COLLECTION")
                    .unwrap_or_else(|_| "global_notifications".to_string()),
                poll_interval_seconds: env::var("FEED_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("FEED_POLL_INTERVAL_SECONDS".to_string()))?,
                limit: match env::var("FEED_LIMIT") {
                    Ok(v) => Some(
                        v.parse()
                            .map_err(|_| ConfigError::InvalidValue("FEED_LIMIT".to_string()))?,
                    ),
                    Err(_) => None,
                },
                request_timeout_seconds: env::var("FEED_REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Local defaults with the feed switched off, so no project id is needed.
impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/notifications.db".to_string(),
                max_connections: 5,
            },
            feed: FeedConfig {
                enabled: false,
                base_url: "https://firestore.googleapis.com/v1".to_string(),
                project_id: String::new(),
                api_key: None,
                collection: "global_notifications".to_string(),
                poll_interval_seconds: 15,
                limit: None,
                request_timeout_seconds: 10,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_is_only_required_for_an_enabled_feed() {
        assert!(matches!(
            required_if(true, "FIRESTORE_PROJECT_ID", None),
            Err(ConfigError::MissingEnv(name)) if name == "FIRESTORE_PROJECT_ID"
        ));
        assert!(required_if(true, "FIRESTORE_PROJECT_ID", Some(" ".into())).is_err());
        assert_eq!(
            required_if(true, "FIRESTORE_PROJECT_ID", Some("campus".into())).unwrap(),
            "campus"
        );
        assert_eq!(required_if(false, "FIRESTORE_PROJECT_ID", None).unwrap(), "");
    }

    #[test]
    fn defaults_leave_the_feed_off() {
        let config = Config::default();
        assert!(!config.feed.enabled);
        assert_eq!(config.feed.collection, "global_notifications");
        assert_eq!(config.server.port, 8080);
    }
}
