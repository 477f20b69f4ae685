use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;

pub const DEFAULT_WINDOW_SECS: i64 = 60 * 60;

/// Recently seen client keys, swept on every lookup.
///
/// Expired entries are dropped lazily by [`DedupCache::is_new`]; there is no
/// background task. Sweep, check and insert happen under one lock, so two
/// concurrent requests with the same fresh key cannot both be counted.
pub struct DedupCache {
    window: Duration,
    clock: Arc<dyn Clock>,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl DedupCache {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` when `key` has not been seen inside the window and
    /// records it. Absent or blank keys are never new and never recorded.
    pub async fn is_new(&self, key: Option<&str>) -> bool {
        let now = self.clock.now();
        let mut seen = self.seen.lock().await;

        seen.retain(|_, first_seen_at| now - *first_seen_at <= self.window);

        let key = match key.map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => return false,
        };
        if seen.contains_key(key) {
            return false;
        }

        seen.insert(key.to_string(), now);
        true
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.seen.lock().await.len()
    }
}
