use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::db::models::{NotificationItem, ReadState};

/// Recompute the `read` flag of every item from the device read-state.
///
/// An item is read when `timestamp <= last_seen_at` or its id is in
/// `read_ids`. The previous `read` value is ignored, so the result depends
/// only on the inputs, and the input order is kept.
pub fn reconcile(
    items: &[NotificationItem],
    last_seen_at: DateTime<Utc>,
    read_ids: &HashSet<String>,
) -> Vec<NotificationItem> {
    items
        .iter()
        .map(|item| NotificationItem {
            read: item.timestamp <= last_seen_at || read_ids.contains(&item.id),
            ..item.clone()
        })
        .collect()
}

/// [`reconcile`] against a [`ReadState`].
pub fn reconcile_with(items: &[NotificationItem], state: &ReadState) -> Vec<NotificationItem> {
    reconcile(items, state.last_seen_at, &state.read_ids)
}

pub fn unread_count(items: &[NotificationItem]) -> usize {
    items.iter().filter(|item| !item.read).count()
}
