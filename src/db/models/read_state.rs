use std::collections::HashSet;

use chrono::{DateTime, Utc};

/// Per-device read tracking.
///
/// An item counts as read when it was delivered at or before `last_seen_at`,
/// or when its id was acknowledged explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadState {
    /// Watermark below which everything is read. Only ever moves forward.
    pub last_seen_at: DateTime<Utc>,
    pub read_ids: HashSet<String>,
}

impl ReadState {
    pub fn new(last_seen_at: DateTime<Utc>) -> Self {
        Self {
            last_seen_at,
            read_ids: HashSet::new(),
        }
    }

    /// Move the watermark forward, ignoring values that would move it back.
    /// Returns the effective watermark.
    pub fn advance_last_seen(&mut self, at: DateTime<Utc>) -> DateTime<Utc> {
        if at > self.last_seen_at {
            self.last_seen_at = at;
        }
        self.last_seen_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn advance_never_moves_back() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut state = ReadState::new(t0);

        assert_eq!(state.advance_last_seen(t0 - Duration::seconds(10)), t0);
        assert_eq!(state.last_seen_at, t0);

        let later = t0 + Duration::seconds(10);
        assert_eq!(state.advance_last_seen(later), later);
    }
}
