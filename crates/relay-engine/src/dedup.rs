use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use relay_core::types::MessageId;

/// Drop every record whose age has reached `window`. Returns how many were removed.
///
/// Records timestamped after `now` (clock stepped backwards) are kept.
pub fn evict(
    entries: &mut HashMap<MessageId, DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> usize {
    let before = entries.len();
    entries.retain(|_, seen_at| now - *seen_at < window);
    before - entries.len()
}

/// Time-windowed memory of processed message ids.
///
/// Gateways may deliver the same message event more than once (reconnect
/// replays, multiple shards). Memory stays bounded by the number of distinct
/// messages seen within the trailing window; there is no background sweeper,
/// eviction happens at the top of every check.
#[derive(Debug)]
pub struct DedupCache {
    window: Duration,
    entries: HashMap<MessageId, DateTime<Utc>>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    pub fn with_window_secs(secs: u64) -> Self {
        // TimeDelta panics above i64::MAX milliseconds.
        let secs = secs.min(i64::MAX as u64 / 1_000) as i64;
        Self::new(Duration::seconds(secs))
    }

    /// `true` the first time `id` is seen within the window, `false` for repeats.
    pub fn should_process(&mut self, id: MessageId, now: DateTime<Utc>) -> bool {
        evict(&mut self.entries, now, self.window);
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, now);
        true
    }

    /// When `id` was first processed, if it is still remembered.
    pub fn seen_at(&self, id: MessageId) -> Option<DateTime<Utc>> {
        self.entries.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn first_sighting_is_processed() {
        let mut cache = DedupCache::with_window_secs(300);
        assert!(cache.should_process(MessageId(1), t(0)));
        assert_eq!(cache.seen_at(MessageId(1)), Some(t(0)));
    }

    #[test]
    fn repeat_within_window_is_skipped() {
        let mut cache = DedupCache::with_window_secs(300);
        assert!(cache.should_process(MessageId(1), t(0)));
        assert!(!cache.should_process(MessageId(1), t(1)));
        assert!(!cache.should_process(MessageId(1), t(299)));
    }

    #[test]
    fn repeat_at_window_edge_is_processed_again() {
        let mut cache = DedupCache::with_window_secs(300);
        assert!(cache.should_process(MessageId(1), t(0)));
        assert!(cache.should_process(MessageId(1), t(300)));
        // Re-recorded at t(300), so the next window starts there.
        assert!(!cache.should_process(MessageId(1), t(599)));
    }

    #[test]
    fn repeats_never_refresh_the_timestamp() {
        let mut cache = DedupCache::with_window_secs(300);
        cache.should_process(MessageId(1), t(0));
        cache.should_process(MessageId(1), t(200));
        assert_eq!(cache.seen_at(MessageId(1)), Some(t(0)));
        assert!(cache.should_process(MessageId(1), t(300)));
    }

    #[test]
    fn expired_entries_are_purged_on_any_check() {
        let mut cache = DedupCache::with_window_secs(300);
        for id in 0..100 {
            cache.should_process(MessageId(id), t(0));
        }
        assert_eq!(cache.len(), 100);

        cache.should_process(MessageId(1_000), t(301));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evict_keeps_fresh_and_future_records() {
        let mut entries = HashMap::new();
        entries.insert(MessageId(1), t(0));
        entries.insert(MessageId(2), t(250));
        entries.insert(MessageId(3), t(1_000));

        let removed = evict(&mut entries, t(300), Duration::seconds(300));
        assert_eq!(removed, 1);
        assert!(entries.contains_key(&MessageId(2)));
        assert!(entries.contains_key(&MessageId(3)));
    }

    #[test]
    fn distinct_ids_do_not_interfere() {
        let mut cache = DedupCache::with_window_secs(300);
        assert!(cache.should_process(MessageId(1), t(0)));
        assert!(cache.should_process(MessageId(2), t(0)));
        assert!(!cache.should_process(MessageId(2), t(5)));
    }
}
