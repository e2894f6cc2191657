/// Time-to-live memoization in front of a `HistoryProvider`.
///
/// Repeated forecast requests for the same facility and window within the
/// TTL reuse the last successful fetch instead of calling the remote API
/// again. Failed fetches are never stored.
///
/// # Clock injection
/// `get_history_at` takes `now` explicitly; the `HistoryProvider` impl
/// passes `Utc::now()`. Tests drive expiry with fixed instants.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::facilities::Facility;
use crate::ingest::HistoryProvider;
use crate::logging::{self, DataSource};
use crate::model::{HistoryError, Observation};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    facility: String,
    pollutants: Vec<String>, // sorted
    lookback_hours: u32,
}

impl CacheKey {
    fn new(facility: &Facility, pollutants: &[&str], lookback_hours: u32) -> Self {
        let mut pollutants: Vec<String> = pollutants.iter().map(|p| p.to_string()).collect();
        pollutants.sort();
        pollutants.dedup();
        Self {
            facility: facility.name.to_string(),
            pollutants,
            lookback_hours,
        }
    }
}

struct CacheEntry {
    fetched_at: DateTime<Utc>,
    observations: Vec<Observation>,
}

pub struct CachedHistory<P> {
    inner: P,
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl<P: HistoryProvider> CachedHistory<P> {
    pub fn new(inner: P, ttl_secs: u64) -> Self {
        Self {
            inner,
            ttl: i64::try_from(ttl_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Serve from the cache unless the entry is older than the TTL.
    ///
    /// Expiry is strictly greater than: an entry exactly `ttl` old is
    /// still served.
    pub fn get_history_at(
        &self,
        facility: &Facility,
        pollutants: &[&str],
        lookback_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Observation>, HistoryError> {
        let key = CacheKey::new(facility, pollutants, lookback_hours);

        if let Ok(entries) = self.entries.lock() {
            if let Some(entry) = entries.get(&key) {
                if now - entry.fetched_at <= self.ttl {
                    logging::debug(DataSource::Cache, Some(facility.name), "history cache hit");
                    return Ok(entry.observations.clone());
                }
            }
        }

        let observations = self.inner.get_history(facility, pollutants, lookback_hours)?;

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    fetched_at: now,
                    observations: observations.clone(),
                },
            );
        }
        Ok(observations)
    }

    /// Drop every cached fetch.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl<P: HistoryProvider> HistoryProvider for CachedHistory<P> {
    fn get_history(
        &self,
        facility: &Facility,
        pollutants: &[&str],
        lookback_hours: u32,
    ) -> Result<Vec<Observation>, HistoryError> {
        self.get_history_at(facility, pollutants, lookback_hours, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facilities::find_facility;
    use chrono::TimeZone;
    use std::cell::Cell;

    /// Counts fetches; fails while `fail` is set.
    struct CountingProvider {
        calls: Cell<usize>,
        fail: Cell<bool>,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
                fail: Cell::new(false),
            }
        }
    }

    impl HistoryProvider for CountingProvider {
        fn get_history(
            &self,
            _facility: &Facility,
            pollutants: &[&str],
            _lookback_hours: u32,
        ) -> Result<Vec<Observation>, HistoryError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail.get() {
                return Err(HistoryError::HttpError(503));
            }
            let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
            Ok(vec![Observation::new(ts, pollutants[0], self.calls.get() as f64)])
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    #[test]
    fn test_second_request_within_ttl_is_served_from_cache() {
        let cache = CachedHistory::new(CountingProvider::new(), 600);
        let facility = find_facility("Refinery A").unwrap();

        let first = cache.get_history_at(facility, &["co"], 168, fixed_now()).unwrap();
        let second = cache
            .get_history_at(facility, &["co"], 168, fixed_now() + Duration::seconds(600))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.inner.calls.get(), 1, "entry exactly ttl old is still fresh");
    }

    #[test]
    fn test_expired_entry_is_refetched() {
        let cache = CachedHistory::new(CountingProvider::new(), 600);
        let facility = find_facility("Refinery A").unwrap();

        cache.get_history_at(facility, &["co"], 168, fixed_now()).unwrap();
        let later = cache
            .get_history_at(facility, &["co"], 168, fixed_now() + Duration::seconds(601))
            .unwrap();

        assert_eq!(cache.inner.calls.get(), 2);
        assert_eq!(later[0].value, 2.0);
    }

    #[test]
    fn test_key_distinguishes_facility_pollutant_and_window() {
        let cache = CachedHistory::new(CountingProvider::new(), 600);
        let refinery = find_facility("Refinery A").unwrap();
        let terminal = find_facility("Gas Terminal C").unwrap();

        cache.get_history_at(refinery, &["co"], 168, fixed_now()).unwrap();
        cache.get_history_at(refinery, &["o3"], 168, fixed_now()).unwrap();
        cache.get_history_at(refinery, &["co"], 48, fixed_now()).unwrap();
        cache.get_history_at(terminal, &["co"], 168, fixed_now()).unwrap();

        assert_eq!(cache.inner.calls.get(), 4);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = CachedHistory::new(CountingProvider::new(), 600);
        let facility = find_facility("Refinery A").unwrap();

        cache.inner.fail.set(true);
        assert!(cache.get_history_at(facility, &["co"], 168, fixed_now()).is_err());

        cache.inner.fail.set(false);
        assert!(cache.get_history_at(facility, &["co"], 168, fixed_now()).is_ok());
        assert_eq!(cache.inner.calls.get(), 2);
    }

    #[test]
    fn test_clear_forces_refetch() {
        let cache = CachedHistory::new(CountingProvider::new(), 600);
        let facility = find_facility("Refinery A").unwrap();

        cache.get_history_at(facility, &["co"], 168, fixed_now()).unwrap();
        cache.clear();
        cache.get_history_at(facility, &["co"], 168, fixed_now()).unwrap();
        assert_eq!(cache.inner.calls.get(), 2);
    }
}
