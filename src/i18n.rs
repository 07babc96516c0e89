/*
Small i18n helper for user-facing strings.

This module provides:
- An embedded translations store for ID/EN (compile-time embedded JSON).
- `tr` to look up a key in a language with optional `{name}` params.
- `time_ago` for the relative timestamps shown next to notifications.

Default language is `id`. Keys missing in the requested language fall back
to the default language, then to the key itself.
*/

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};

pub const DEFAULT_LANG: &str = "id";

static TRANSLATIONS: OnceLock<HashMap<String, HashMap<String, String>>> = OnceLock::new();

const ID_JSON: &str = r#"
{
  "app.name": "Campus Lost & Found",
  "push.default_body": "Anda memiliki notifikasi baru",
  "push.channel_name": "Notifikasi Campus Lost & Found",
  "notification.kind.new_report": "Laporan Baru",
  "notification.kind.report_completed": "Laporan Selesai",
  "notification.kind.other": "Notifikasi",
  "time_ago.just_now": "Baru saja",
  "time_ago.minutes": "{n} menit lalu",
  "time_ago.hours": "{n} jam lalu",
  "time_ago.days": "{n} hari lalu",
  "time_ago.weeks": "{n} minggu lalu",
  "error.unsupported_language": "Bahasa tidak didukung: {lang}",
  "error.empty_notification_id": "ID notifikasi tidak boleh kosong"
}
"#;

const EN_JSON: &str = r#"
{
  "app.name": "Campus Lost & Found",
  "push.default_body": "You have a new notification",
  "push.channel_name": "Campus Lost & Found notifications",
  "notification.kind.new_report": "New report",
  "notification.kind.report_completed": "Report completed",
  "notification.kind.other": "Notification",
  "time_ago.just_now": "Just now",
  "time_ago.minutes": "{n} minutes ago",
  "time_ago.hours": "{n} hours ago",
  "time_ago.days": "{n} days ago",
  "time_ago.weeks": "{n} weeks ago",
  "error.unsupported_language": "Unsupported language: {lang}",
  "error.empty_notification_id": "Notification id must not be empty"
}
"#;

fn build_translations() -> HashMap<String, HashMap<String, String>> {
    let mut out: HashMap<String, HashMap<String, String>> = HashMap::new();

    let id_map: HashMap<String, String> = serde_json::from_str(ID_JSON).unwrap_or_else(|e| {
        panic!("failed to parse ID_JSON in i18n module: {}", e);
    });
    out.insert("id".to_string(), id_map);

    let en_map: HashMap<String, String> = serde_json::from_str(EN_JSON).unwrap_or_else(|e| {
        panic!("failed to parse EN_JSON in i18n module: {}", e);
    });
    out.insert("en".to_string(), en_map);

    out
}

fn translations() -> &'static HashMap<String, HashMap<String, String>> {
    TRANSLATIONS.get_or_init(build_translations)
}

/// Normalize a language tag into a short, lowercase code (e.g. "en-US" -> "en").
pub fn normalize_language(lang: &str) -> String {
    lang.split('-').next().unwrap_or(lang).trim().to_lowercase()
}

pub fn is_supported_language(lang: &str) -> bool {
    translations().contains_key(lang)
}

/// Translate `key` into `lang` (or [`DEFAULT_LANG`]), substituting `{name}`
/// placeholders from `params`.
pub fn tr(lang: Option<&str>, key: &str, params: Option<&[(&str, &str)]>) -> String {
    let map = translations();

    let desired = lang.unwrap_or(DEFAULT_LANG);

    let val = map
        .get(desired)
        .and_then(|m| m.get(key))
        .cloned()
        .or_else(|| map.get(DEFAULT_LANG).and_then(|m| m.get(key)).cloned())
        .unwrap_or_else(|| key.to_string());

    if let Some(params) = params {
        let mut s = val;
        for (k, v) in params {
            s = s.replace(&format!("{{{}}}", k), v);
        }
        s
    } else {
        val
    }
}

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;
const WEEK_MS: i64 = 604_800_000;

/// Relative age of `then` as seen at `now`. Timestamps in the future read as
/// "just now".
pub fn time_ago(lang: Option<&str>, then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - then).num_milliseconds();

    if diff < MINUTE_MS {
        return tr(lang, "time_ago.just_now", None);
    }

    let (key, n) = if diff < HOUR_MS {
        ("time_ago.minutes", diff / MINUTE_MS)
    } else if diff < DAY_MS {
        ("time_ago.hours", diff / HOUR_MS)
    } else if diff < WEEK_MS {
        ("time_ago.days", diff / DAY_MS)
    } else {
        ("time_ago.weeks", diff / WEEK_MS)
    };

    let n = n.to_string();
    tr(lang, key, Some(&[("n", n.as_str())]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_tr_basic() {
        assert_eq!(tr(Some("en"), "push.default_body", None), "You have a new notification");
        assert_eq!(tr(None, "push.default_body", None), "Anda memiliki notifikasi baru");
    }

    #[test]
    fn test_tr_with_params() {
        let s = tr(Some("en"), "error.unsupported_language", Some(&[("lang", "fr")]));
        assert_eq!(s, "Unsupported language: fr");
    }

    #[test]
    fn test_fallback_to_default_and_key() {
        assert_eq!(tr(Some("fr"), "time_ago.just_now", None), "Baru saja");
        assert_eq!(tr(Some("en"), "no.such.key", None), "no.such.key");
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("en-US"), "en");
        assert_eq!(normalize_language("ID"), "id");
        assert!(is_supported_language(&normalize_language("id-ID")));
        assert!(!is_supported_language("fr"));
    }

    #[test]
    fn time_ago_thresholds() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let en = Some("en");
        assert_eq!(time_ago(en, now - Duration::seconds(59), now), "Just now");
        assert_eq!(time_ago(en, now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(time_ago(en, now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(time_ago(en, now - Duration::days(6), now), "6 days ago");
        assert_eq!(time_ago(en, now - Duration::days(15), now), "2 weeks ago");
        assert_eq!(time_ago(None, now - Duration::hours(2), now), "2 jam lalu");
    }

    #[test]
    fn time_ago_future_is_just_now() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(time_ago(Some("en"), now + Duration::hours(1), now), "Just now");
    }
}
