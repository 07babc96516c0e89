//! Vendor-independent view of the shared notification feed.
//!
//! A [`FeedSource`] hands out a stream of snapshots. Each snapshot is the full
//! ordered list of documents (newest first) at that moment; errors travel on
//! the same stream so a source can report a failure and keep going.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::db::models::NotificationItem;

/// Failure reported by a feed source. Never fatal: the last good snapshot
/// stays published while one of these is current.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("Feed unavailable: {0}")]
    Unavailable(String),

    #[error("Feed access denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid feed response: {0}")]
    InvalidResponse(String),
}

impl FeedError {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Unavailable(_) => "unavailable",
            FeedError::PermissionDenied(_) => "permission_denied",
            FeedError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// One server document: its id and its fields as plain JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    pub id: String,
    pub fields: Map<String, Value>,
}

pub type FeedSnapshot = Vec<FeedDocument>;

pub type FeedStream = BoxStream<'static, Result<FeedSnapshot, FeedError>>;

#[async_trait]
pub trait FeedSource: Send + Sync + 'static {
    /// Start following the feed. Dropping the returned stream stops it.
    async fn open(&self) -> Result<FeedStream, FeedError>;
}

/// Stand-in used when the feed is switched off in the configuration.
pub struct DisabledFeedSource;

#[async_trait]
impl FeedSource for DisabledFeedSource {
    async fn open(&self) -> Result<FeedStream, FeedError> {
        Err(FeedError::Unavailable(
            "feed subscription is disabled (FEED_ENABLED=false)".to_string(),
        ))
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> DocumentError {
    DocumentError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn optional_string(fields: &Map<String, Value>, field: &'static str) -> Result<String, DocumentError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(invalid(field, format!("expected string, got {}", other))),
    }
}

/// Accepts an RFC 3339 string, epoch milliseconds, or `{seconds, nanos}`.
fn parse_moment(value: &Value, field: &'static str) -> Result<DateTime<Utc>, DocumentError> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| invalid(field, e.to_string())),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| invalid(field, format!("out of range: {}", n))),
        Value::Object(obj) => {
            let seconds = obj
                .get("seconds")
                .and_then(Value::as_i64)
                .ok_or_else(|| invalid(field, "missing seconds"))?;
            let nanos = obj.get("nanos").and_then(Value::as_u64).unwrap_or(0);
            let nanos = u32::try_from(nanos).map_err(|_| invalid(field, "nanos out of range"))?;
            DateTime::<Utc>::from_timestamp(seconds, nanos)
                .ok_or_else(|| invalid(field, "out of range"))
        }
        other => Err(invalid(field, format!("unsupported value {}", other))),
    }
}

fn parse_data(value: Option<&Value>) -> Result<BTreeMap<String, String>, DocumentError> {
    let obj = match value {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(obj)) => obj,
        Some(other) => return Err(invalid("data", format!("expected object, got {}", other))),
    };

    let mut data = BTreeMap::new();
    for (key, value) in obj {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(invalid("data", format!("nested value under `{}`", key)))
            }
        };
        data.insert(key.clone(), value);
    }
    Ok(data)
}

impl NotificationItem {
    /// Build an unread item from a feed document.
    pub fn from_document(doc: &FeedDocument) -> Result<Self, DocumentError> {
        let timestamp = match doc.fields.get("timestamp") {
            None | Some(Value::Null) => return Err(DocumentError::MissingField("timestamp")),
            Some(value) => parse_moment(value, "timestamp")?,
        };

        let expire_at = match doc.fields.get("expireAt") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_moment(value, "expireAt")?),
        };

        Ok(NotificationItem {
            id: doc.id.clone(),
            title: optional_string(&doc.fields, "title")?,
            body: optional_string(&doc.fields, "body")?,
            timestamp,
            data: parse_data(doc.fields.get("data"))?,
            expire_at,
            read: false,
        })
    }
}

/// Map a snapshot to items, skipping documents that do not decode.
pub fn map_documents(snapshot: &[FeedDocument]) -> Vec<NotificationItem> {
    snapshot
        .iter()
        .filter_map(|doc| match NotificationItem::from_document(doc) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping malformed notification document {}: {}", doc.id, e);
                None
            }
        })
        .collect()
}
