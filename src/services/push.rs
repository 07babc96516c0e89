use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::i18n;

/// Android channel the notifications are posted on.
pub const CHANNEL_ID: &str = "campus_lostfound_notifications";

/// Incoming push message as delivered by the messaging service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub notification: Option<PushNotification>,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushNotification {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// What would be shown in the system tray for a push message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayNotification {
    pub title: String,
    pub body: String,
    pub channel_id: String,
    pub channel_name: String,
    pub data: HashMap<String, String>,
}

/// Resolve title and body: the notification block wins, then the data
/// payload, then the localized defaults.
pub fn resolve(message: &PushMessage, lang: Option<&str>) -> DisplayNotification {
    let notification = message.notification.as_ref();

    let title = notification
        .and_then(|n| n.title.clone())
        .or_else(|| message.data.get("title").cloned())
        .unwrap_or_else(|| i18n::tr(lang, "app.name", None));

    let body = notification
        .and_then(|n| n.body.clone())
        .or_else(|| message.data.get("body").cloned())
        .unwrap_or_else(|| i18n::tr(lang, "push.default_body", None));

    DisplayNotification {
        title,
        body,
        channel_id: CHANNEL_ID.to_string(),
        channel_name: i18n::tr(lang, "push.channel_name", None),
        data: message.data.clone(),
    }
}
