//! Firestore REST adapter for the notification feed.
//!
//! The collection is followed by polling `documents:runQuery` with a
//! structured query ordered by `timestamp` descending. A snapshot is emitted
//! for the first successful poll and afterwards only when the result changed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use crate::config::FeedConfig;
use crate::error::{AppError, AppResult};
use crate::services::feed::{FeedDocument, FeedError, FeedSnapshot, FeedSource, FeedStream};

pub struct FirestoreFeedSource {
    client: reqwest::Client,
    query_url: url::Url,
    collection: String,
    limit: Option<u32>,
    poll_interval: Duration,
}

impl FirestoreFeedSource {
    pub fn new(config: &FeedConfig) -> AppResult<Self> {
        let base = config.base_url.trim_end_matches('/');
        let mut query_url = url::Url::parse(&format!(
            "{}/projects/{}/databases/(default)/documents:runQuery",
            base, config.project_id
        ))
        .map_err(|e| AppError::Config(format!("invalid FIRESTORE_BASE_URL: {}", e)))?;

        if let Some(key) = &config.api_key {
            query_url.query_pairs_mut().append_pair("key", key);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            query_url,
            collection: config.collection.clone(),
            limit: config.limit,
            poll_interval: Duration::from_secs(config.poll_interval_seconds.max(1)),
        })
    }

    fn query_body(&self) -> Value {
        let mut query = json!({
            "from": [{ "collectionId": self.collection }],
            "orderBy": [{
                "field": { "fieldPath": "timestamp" },
                "direction": "DESCENDING"
            }]
        });
        if let Some(limit) = self.limit {
            query["limit"] = json!(limit);
        }
        json!({ "structuredQuery": query })
    }
}

#[async_trait]
impl FeedSource for FirestoreFeedSource {
    async fn open(&self) -> Result<FeedStream, FeedError> {
        let poller = Poller {
            client: self.client.clone(),
            query_url: self.query_url.clone(),
            body: self.query_body(),
            poll_interval: self.poll_interval,
            last: None,
            first: true,
        };

        tracing::info!(
            "Polling collection '{}' every {}s",
            self.collection,
            self.poll_interval.as_secs()
        );

        let stream = futures::stream::unfold(poller, |mut poller| async move {
            let event = poller.next_change().await;
            Some((event, poller))
        });

        Ok(Box::pin(stream))
    }
}

/// Owned polling state moved into the stream.
struct Poller {
    client: reqwest::Client,
    query_url: url::Url,
    body: Value,
    poll_interval: Duration,
    last: Option<FeedSnapshot>,
    first: bool,
}

impl Poller {
    /// Poll until the result differs from the last emitted snapshot, or fails.
    async fn next_change(&mut self) -> Result<FeedSnapshot, FeedError> {
        loop {
            if self.first {
                self.first = false;
            } else {
                tokio::time::sleep(self.poll_interval).await;
            }

            match fetch_snapshot(&self.client, &self.query_url, &self.body).await {
                Ok(snapshot) => {
                    if self.last.as_ref() == Some(&snapshot) {
                        continue;
                    }
                    self.last = Some(snapshot.clone());
                    return Ok(snapshot);
                }
                Err(e) => {
                    // Re-emit the next good snapshot even if unchanged, so
                    // observers see the recovery.
                    self.last = None;
                    return Err(e);
                }
            }
        }
    }
}

async fn fetch_snapshot(
    client: &reqwest::Client,
    query_url: &url::Url,
    body: &Value,
) -> Result<FeedSnapshot, FeedError> {
    let resp = client
        .post(query_url.clone())
        .json(body)
        .send()
        .await
        .map_err(|e| FeedError::Unavailable(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                FeedError::PermissionDenied(format!("{}: {}", status, text))
            }
            _ => FeedError::Unavailable(format!("{}: {}", status, text)),
        });
    }

    let body: Value = resp
        .json()
        .await
        .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;

    parse_run_query_response(&body)
}

/// Decode a `runQuery` response: an array of `{document?, readTime}` rows.
pub fn parse_run_query_response(body: &Value) -> Result<FeedSnapshot, FeedError> {
    let rows = body
        .as_array()
        .ok_or_else(|| FeedError::InvalidResponse("expected a JSON array".to_string()))?;

    let mut snapshot = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(document) = row.get("document") else {
            continue;
        };

        let name = document
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| FeedError::InvalidResponse("document without name".to_string()))?;
        let id = name.rsplit('/').next().unwrap_or(name).to_string();

        let fields = match document.get("fields") {
            Some(Value::Object(fields)) => decode_fields(fields),
            _ => Map::new(),
        };

        snapshot.push(FeedDocument { id, fields });
    }

    Ok(snapshot)
}

fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), decode_value(value)))
        .collect()
}

/// Convert a Firestore typed value (`{"stringValue": "x"}`, ...) to plain JSON.
///
/// Timestamps stay RFC 3339 strings. Unknown value types decode to null.
pub fn decode_value(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = obj.iter().next() else {
        return Value::Null;
    };

    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => inner.as_bool().map(Value::Bool).unwrap_or(Value::Null),
        // int64 values are transported as strings
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            Value::Number(_) => inner.clone(),
            _ => Value::Null,
        },
        "doubleValue" => match inner {
            Value::Number(_) => inner.clone(),
            Value::String(s) => s.parse::<f64>().map(Value::from).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        other => {
            tracing::debug!("Unknown Firestore value type '{}'", other);
            Value::Null
        }
    }
}
