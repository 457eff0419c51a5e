//! LRU + TTL cache keyed by rounded endpoints, matching the teacher's `lru`-backed
//! spatial caches but with an explicit expiry stamped per entry.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use super::client::RouteResult;

/// Rounds lat/lng to ~11m precision (4 decimal places) so nearby-identical requests
/// within the same tick share a cache entry.
fn cache_key(from: (f64, f64), to: (f64, f64)) -> (i64, i64, i64, i64) {
    let round = |v: f64| (v * 10_000.0).round() as i64;
    (round(from.0), round(from.1), round(to.0), round(to.1))
}

struct Entry {
    value: RouteResult,
    inserted_at: Instant,
}

pub struct RouteCache {
    ttl: Duration,
    inner: Mutex<LruCache<(i64, i64, i64, i64), Entry>>,
}

impl RouteCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1)).expect("capacity > 0");
        Self {
            ttl,
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, from: (f64, f64), to: (f64, f64)) -> Option<RouteResult> {
        let key = cache_key(from, to);
        let mut cache = self.inner.lock().expect("route cache mutex poisoned");
        match cache.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                cache.pop(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, from: (f64, f64), to: (f64, f64), value: RouteResult) {
        let key = cache_key(from, to);
        let mut cache = self.inner.lock().expect("route cache mutex poisoned");
        cache.put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RouteResult {
        RouteResult {
            distance_km: 4.2,
            duration_sec: 600.0,
            polyline: vec![(0.0, 0.0), (0.1, 0.1)],
        }
    }

    #[test]
    fn hit_within_ttl_returns_cached_value() {
        let cache = RouteCache::new(10, Duration::from_secs(30));
        cache.put((1.0, 1.0), (2.0, 2.0), sample());
        assert!(cache.get((1.0, 1.0), (2.0, 2.0)).is_some());
    }

    #[test]
    fn expired_entry_is_evicted_on_access() {
        let cache = RouteCache::new(10, Duration::from_millis(1));
        cache.put((1.0, 1.0), (2.0, 2.0), sample());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get((1.0, 1.0), (2.0, 2.0)).is_none());
    }

    #[test]
    fn miss_for_unrelated_endpoints() {
        let cache = RouteCache::new(10, Duration::from_secs(30));
        cache.put((1.0, 1.0), (2.0, 2.0), sample());
        assert!(cache.get((5.0, 5.0), (6.0, 6.0)).is_none());
    }
}
