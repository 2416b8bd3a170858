//! Request cache with per-entry TTL
//!
//! Maps an opaque resolver-specific key to previously resolved tracks so a
//! resolver can skip its I/O on a hit. A zero TTL disables storing.

use crate::track::Track;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheEntry {
    tracks: Vec<Track>,
    expires_at: Instant,
}

/// TTL cache for resolver results
#[derive(Default)]
pub struct RequestCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch unexpired tracks for a key; expired entries are dropped
    pub async fn try_get(&self, key: &str) -> Option<Vec<Track>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                debug!("cache hit for {key}");
                Some(entry.tracks.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store tracks under a key for `ttl`. A zero TTL is a no-op.
    pub async fn set(&self, key: impl Into<String>, tracks: Vec<Track>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.into(),
            CacheEntry {
                tracks,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_within_ttl_and_miss_after() {
        let cache = RequestCache::new();
        let tracks = vec![Track::remote("https://x/y", "y")];

        cache.set("k", tracks.clone(), Duration::from_millis(50)).await;
        assert_eq!(cache.try_get("k").await, Some(tracks));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.try_get("k").await.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_stores_nothing() {
        let cache = RequestCache::new();
        cache
            .set("k", vec![Track::remote("https://x/y", "y")], Duration::ZERO)
            .await;
        assert!(cache.try_get("k").await.is_none());
    }

    #[tokio::test]
    async fn unknown_key_misses() {
        let cache = RequestCache::new();
        assert!(cache.try_get("nothing").await.is_none());
    }
}
