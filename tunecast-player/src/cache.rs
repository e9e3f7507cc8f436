//! Resolution cache
//!
//! Maps a normalized "title artist" key to the track reference it resolved
//! to, or to a tombstone when the pair was confirmed unresolvable. Shared by
//! every context; entries expire after a fixed TTL and the least recently
//! used entry is evicted once the capacity is reached.

use crate::clock::{Clock, SystemClock};
use crate::media::TrackRef;
use crate::normalize::normalize_key;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Previously resolved to this track
    Found(TrackRef),
    /// Previously confirmed unresolvable (within TTL)
    NotFound,
    /// No live entry
    Absent,
}

struct CacheSlot {
    /// `None` is the negative marker
    value: Option<TrackRef>,
    expires_at: Instant,
}

pub struct ResolutionCache {
    entries: Mutex<LruCache<String, CacheSlot>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResolutionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
        }
    }

    pub fn get(&self, key: &str) -> CacheLookup {
        let key = normalize_key(key);
        let now = self.clock.now();
        let mut entries = self.lock();

        let expired = match entries.get(&key) {
            None => return CacheLookup::Absent,
            Some(slot) if slot.expires_at <= now => true,
            Some(slot) => {
                debug!(key = %key, negative = slot.value.is_none(), "Resolution cache hit");
                return match &slot.value {
                    Some(track) => CacheLookup::Found(track.clone()),
                    None => CacheLookup::NotFound,
                };
            }
        };

        if expired {
            entries.pop(&key);
        }
        CacheLookup::Absent
    }

    /// Store a positive (`Some`) or negative (`None`) result with the default TTL
    pub fn put(&self, key: &str, value: Option<TrackRef>) {
        self.put_with_ttl(key, value, self.ttl);
    }

    pub fn put_with_ttl(&self, key: &str, value: Option<TrackRef>, ttl: Duration) {
        let key = normalize_key(key);
        let expires_at = self.clock.now() + ttl;
        self.lock().put(key, CacheSlot { value, expires_at });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheSlot>> {
        // A panic while holding the lock cannot leave a slot half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn track(title: &str) -> TrackRef {
        TrackRef {
            title: title.to_string(),
            url: format!("https://www.youtube.com/watch?v={}", title),
            thumbnail: None,
            duration_secs: None,
        }
    }

    fn cache_with_clock(capacity: usize) -> (ResolutionCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = ResolutionCache::with_clock(capacity, Duration::from_secs(7200), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_get_after_put_within_ttl() {
        let (cache, clock) = cache_with_clock(10);
        cache.put("song artist", Some(track("a")));

        clock.advance(Duration::from_secs(7199));
        assert_eq!(cache.get("song artist"), CacheLookup::Found(track("a")));
    }

    #[test]
    fn test_entry_absent_after_ttl() {
        let (cache, clock) = cache_with_clock(10);
        cache.put("song artist", Some(track("a")));

        clock.advance(Duration::from_secs(7200));
        assert_eq!(cache.get("song artist"), CacheLookup::Absent);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_negative_result_cached() {
        let (cache, clock) = cache_with_clock(10);
        cache.put("missing track", None);
        assert_eq!(cache.get("missing track"), CacheLookup::NotFound);

        clock.advance(Duration::from_secs(7201));
        assert_eq!(cache.get("missing track"), CacheLookup::Absent);
    }

    #[test]
    fn test_keys_are_normalized() {
        let (cache, _clock) = cache_with_clock(10);
        cache.put("Song  ARTIST", Some(track("a")));
        assert_eq!(cache.get("song artist"), CacheLookup::Found(track("a")));
    }

    #[test]
    fn test_least_recently_used_evicted() {
        let (cache, _clock) = cache_with_clock(2);
        cache.put("one", Some(track("1")));
        cache.put("two", Some(track("2")));

        // Touch "one" so "two" becomes least recently used
        assert!(matches!(cache.get("one"), CacheLookup::Found(_)));
        cache.put("three", Some(track("3")));

        assert_eq!(cache.get("two"), CacheLookup::Absent);
        assert!(matches!(cache.get("one"), CacheLookup::Found(_)));
        assert!(matches!(cache.get("three"), CacheLookup::Found(_)));
    }

    #[test]
    fn test_concurrent_puts_do_not_corrupt_entries() {
        let cache = Arc::new(ResolutionCache::new(1000, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("t{} i{}", t, i);
                        cache.put(&key, Some(track(&key)));
                        assert!(matches!(cache.get(&key), CacheLookup::Found(_)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
