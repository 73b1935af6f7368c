//! Intensity cache keyed by location with per-entry TTL.
//!
//! Each entry lives exactly as long as its reading is valid: the TTL is
//! `reading.valid_to - now` at insertion time. Hits never extend an entry.
//! Readings whose validity has already passed are not stored at all, which
//! also keeps invalid (no-data) readings out of the cache.
//!
//! The cache is internally synchronized so the fetcher can share it across
//! concurrent reconcile cycles. Statistics (hits, misses, expirations) are
//! emitted as `tracing::debug` fields.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use carbon_state::IntensityReading;

struct CacheEntry {
    reading: IntensityReading,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

/// Location → reading cache with lazy expiry.
#[derive(Default)]
pub struct IntensityCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    stats: CacheStats,
}

impl IntensityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached reading for `location` unless it expired before `now`.
    ///
    /// Expired entries are removed on the way out.
    pub fn get(&self, location: &str, now: DateTime<Utc>) -> Option<IntensityReading> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(location) {
                Some(entry) if !entry.is_expired(now) => {
                    let hits = self.stats.hits.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(location, cache_hits = hits, "intensity cache hit");
                    return Some(entry.reading.clone());
                }
                Some(_) => {}
                None => {
                    let misses = self.stats.misses.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(location, cache_misses = misses, "intensity cache miss");
                    return None;
                }
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(location).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(location);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }
        let misses = self.stats.misses.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(location, cache_misses = misses, "intensity cache miss (expired)");
        None
    }

    /// Store a reading for `ttl`. A non-positive TTL stores nothing and drops
    /// any stale entry for the location. Returns whether the reading was stored.
    pub fn put(
        &self,
        location: &str,
        reading: IntensityReading,
        ttl: TimeDelta,
        now: DateTime<Utc>,
    ) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if ttl <= TimeDelta::zero() {
            entries.remove(location);
            debug!(location, ttl_secs = ttl.num_seconds(), "reading not cacheable");
            return false;
        }

        entries.insert(
            location.to_string(),
            CacheEntry {
                reading,
                expires_at: now + ttl,
            },
        );
        true
    }

    /// Number of entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accumulated statistics as (hits, misses, expirations).
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.hits.load(Ordering::Relaxed),
            self.stats.misses.load(Ordering::Relaxed),
            self.stats.expirations.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn reading(location: &str, value: f64) -> IntensityReading {
        IntensityReading {
            is_valid: true,
            location: location.to_string(),
            units: "gCO2e/kWh".to_string(),
            valid_from: t0(),
            valid_to: t0() + TimeDelta::hours(1),
            value,
        }
    }

    #[test]
    fn hit_within_ttl() {
        let cache = IntensityCache::new();
        assert!(cache.put("DE", reading("DE", 300.0), TimeDelta::hours(1), t0()));

        let got = cache.get("DE", t0() + TimeDelta::minutes(30)).unwrap();
        assert_eq!(got.value, 300.0);
        assert_eq!(cache.stats(), (1, 0, 0));
    }

    #[test]
    fn miss_for_unknown_location() {
        let cache = IntensityCache::new();
        assert!(cache.get("FR", t0()).is_none());
        assert_eq!(cache.stats(), (0, 1, 0));
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let cache = IntensityCache::new();
        cache.put("DE", reading("DE", 300.0), TimeDelta::hours(1), t0());

        // The boundary instant is still valid.
        assert!(cache.get("DE", t0() + TimeDelta::hours(1)).is_some());
        assert!(cache
            .get("DE", t0() + TimeDelta::hours(1) + TimeDelta::seconds(1))
            .is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), (1, 1, 1));
    }

    #[test]
    fn hits_do_not_extend_lifetime() {
        let cache = IntensityCache::new();
        cache.put("DE", reading("DE", 300.0), TimeDelta::minutes(10), t0());

        for minute in [2, 4, 6, 8, 10] {
            assert!(cache.get("DE", t0() + TimeDelta::minutes(minute)).is_some());
        }
        assert!(cache.get("DE", t0() + TimeDelta::minutes(11)).is_none());
    }

    #[test]
    fn non_positive_ttl_is_not_stored() {
        let cache = IntensityCache::new();
        cache.put("DE", reading("DE", 300.0), TimeDelta::hours(1), t0());

        assert!(!cache.put("DE", reading("DE", 100.0), TimeDelta::zero(), t0()));
        assert!(!cache.put("FR", reading("FR", 50.0), TimeDelta::seconds(-5), t0()));

        assert!(cache.get("DE", t0()).is_none());
        assert!(cache.get("FR", t0()).is_none());
    }
}
