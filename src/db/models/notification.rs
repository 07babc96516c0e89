use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification from the shared feed as seen by this device.
///
/// Everything except `read` comes from the server document. `read` is derived
/// locally from the device read-state and is recomputed on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Delivery time set by the server. Stored as epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Payload, e.g. `itemId` and `type` of the referenced report.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// Server-side expiry, informative only.
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
}

/// Report event a notification was written for, taken from `data.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    NewReport,
    ReportCompleted,
    Other,
}

impl NotificationKind {
    pub fn from_type(value: Option<&str>) -> Self {
        match value {
            Some("NEW_REPORT") => NotificationKind::NewReport,
            Some("REPORT_COMPLETED") => NotificationKind::ReportCompleted,
            _ => NotificationKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewReport => "new_report",
            NotificationKind::ReportCompleted => "report_completed",
            NotificationKind::Other => "other",
        }
    }
}

impl NotificationItem {
    pub fn kind(&self) -> NotificationKind {
        NotificationKind::from_type(self.data.get("type").map(String::as_str))
    }

    /// Id of the lost/found report this notification refers to.
    pub fn item_id(&self) -> Option<&str> {
        self.data.get("itemId").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn kind_and_item_id_come_from_payload() {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "REPORT_COMPLETED".to_string());
        data.insert("itemId".to_string(), "item-42".to_string());
        let item = NotificationItem {
            id: "n1".to_string(),
            title: "Laporan Selesai: Dompet".to_string(),
            body: String::new(),
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            data,
            expire_at: None,
            read: false,
        };

        assert_eq!(item.kind(), NotificationKind::ReportCompleted);
        assert_eq!(item.kind().as_str(), "report_completed");
        assert_eq!(item.item_id(), Some("item-42"));
    }

    #[test]
    fn unknown_type_is_other() {
        assert_eq!(NotificationKind::from_type(Some("PROMO")), NotificationKind::Other);
        assert_eq!(NotificationKind::from_type(None), NotificationKind::Other);
    }

    #[test]
    fn cached_json_uses_epoch_millis() {
        let item: NotificationItem = serde_json::from_str(
            r#"{"id":"a","title":"t","body":"b","timestamp":1700000000000,"data":{"itemId":"x"}}"#,
        )
        .unwrap();
        assert_eq!(item.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert!(!item.read);
        assert!(item.expire_at.is_none());

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
        assert!(json.get("expire_at").is_none());
    }
}
