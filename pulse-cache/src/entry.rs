//! Cache entry state.
//!
//! An entry is the unit subscribers observe. It carries the last-known-good
//! payload, its age, and the outcome of the most recent fetch cycle.

use chrono::{DateTime, Utc};
use pulse_core::FetchError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::key::CacheKey;

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    /// Known key, nothing requested yet.
    Idle,
    /// First fetch in flight, no data.
    Loading,
    /// Data present and inside its freshness window.
    Fresh,
    /// Data present but the freshness window has elapsed.
    Stale,
    /// The latest fetch cycle failed. Earlier data, if any, is retained.
    Error,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one cache entry.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub(crate) key: CacheKey,
    pub(crate) status: CacheStatus,
    pub(crate) data: Option<Arc<V>>,
    pub(crate) fetched_at: Option<DateTime<Utc>>,
    pub(crate) fetched_instant: Option<Instant>,
    pub(crate) failed_instant: Option<Instant>,
    pub(crate) stale_after: Duration,
    pub(crate) last_error: Option<FetchError>,
    pub(crate) retry_count: u32,
    pub(crate) is_fetching: bool,
}

impl<V> CacheEntry<V> {
    pub(crate) fn idle(key: CacheKey, stale_after: Duration) -> Self {
        Self {
            key,
            status: CacheStatus::Idle,
            data: None,
            fetched_at: None,
            fetched_instant: None,
            failed_instant: None,
            stale_after,
            last_error: None,
            retry_count: 0,
            is_fetching: false,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Current status. A stored `Fresh` whose window has elapsed reads as
    /// `Stale` even before the next sweep records the transition.
    pub fn status(&self) -> CacheStatus {
        if self.status == CacheStatus::Fresh && self.is_expired_at(Instant::now()) {
            CacheStatus::Stale
        } else {
            self.status
        }
    }

    pub fn data(&self) -> Option<&V> {
        self.data.as_deref()
    }

    /// Shared handle to the payload, for callers that outlive the snapshot.
    pub fn data_arc(&self) -> Option<Arc<V>> {
        self.data.clone()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Wall-clock time of the last successful fetch.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    /// Retries spent in the current (or most recent) fetch cycle.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// True while a fetch for this key is in flight, including background
    /// refreshes of entries that already have data.
    pub fn is_fetching(&self) -> bool {
        self.is_fetching
    }

    /// Time since the last successful fetch.
    pub fn age(&self) -> Option<Duration> {
        self.fetched_instant
            .map(|at| Instant::now().saturating_duration_since(at))
    }

    /// Time since the last failed cycle, while the entry is in `Error`.
    pub fn since_failure(&self) -> Option<Duration> {
        self.failed_instant
            .filter(|_| self.status == CacheStatus::Error)
            .map(|at| Instant::now().saturating_duration_since(at))
    }

    /// No fetch in flight and at least one cycle has finished.
    pub fn is_settled(&self) -> bool {
        !self.is_fetching && !matches!(self.status, CacheStatus::Idle | CacheStatus::Loading)
    }

    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        match self.fetched_instant {
            Some(at) => now >= at + self.stale_after,
            None => false,
        }
    }

    /// A failed entry is due for another cycle once `backoff` has passed since
    /// a transient failure. Schema and rejection failures wait for a caller.
    pub(crate) fn retry_due(&self, now: Instant, backoff: Duration) -> bool {
        self.status == CacheStatus::Error
            && self.last_error.as_ref().is_some_and(FetchError::is_retryable)
            && self.failed_instant.is_some_and(|at| now >= at + backoff)
    }

    /// Record the `Fresh -> Stale` transition if the window has elapsed.
    /// Returns whether anything changed.
    pub(crate) fn expire(&mut self, now: Instant) -> bool {
        if self.status == CacheStatus::Fresh && self.is_expired_at(now) {
            self.status = CacheStatus::Stale;
            true
        } else {
            false
        }
    }

    /// Force `Fresh -> Stale` regardless of age.
    pub(crate) fn invalidate(&mut self) -> bool {
        if self.status == CacheStatus::Fresh {
            self.status = CacheStatus::Stale;
            true
        } else {
            false
        }
    }

    pub(crate) fn begin_fetch(&mut self) {
        self.is_fetching = true;
        self.retry_count = 0;
        if self.data.is_none() {
            self.status = CacheStatus::Loading;
        }
    }

    pub(crate) fn succeed(&mut self, value: V) {
        self.data = Some(Arc::new(value));
        self.fetched_at = Some(Utc::now());
        self.fetched_instant = Some(Instant::now());
        self.status = CacheStatus::Fresh;
        self.last_error = None;
        self.failed_instant = None;
        self.retry_count = 0;
        self.is_fetching = false;
    }

    pub(crate) fn fail(&mut self, error: FetchError) {
        self.status = CacheStatus::Error;
        self.last_error = Some(error);
        self.failed_instant = Some(Instant::now());
        self.is_fetching = false;
    }
}

// Manual impl: cloning a snapshot only clones the `Arc`, so `V: Clone` is not needed.
impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            status: self.status,
            data: self.data.clone(),
            fetched_at: self.fetched_at,
            fetched_instant: self.fetched_instant,
            failed_instant: self.failed_instant,
            stale_after: self.stale_after,
            last_error: self.last_error.clone(),
            retry_count: self.retry_count,
            is_fetching: self.is_fetching,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CacheEntry<u32> {
        CacheEntry::idle(CacheKey::new("statistics/total-events"), Duration::from_secs(30))
    }

    #[test]
    fn test_idle_entry() {
        let e = entry();
        assert_eq!(e.status(), CacheStatus::Idle);
        assert!(!e.has_data());
        assert!(!e.is_settled());
        assert!(e.age().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_then_expiry() {
        let mut e = entry();
        e.begin_fetch();
        assert_eq!(e.status(), CacheStatus::Loading);
        e.succeed(7);
        assert_eq!(e.status(), CacheStatus::Fresh);
        assert_eq!(e.data(), Some(&7));
        assert!(e.is_settled());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(e.status(), CacheStatus::Fresh);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(e.status(), CacheStatus::Stale);
        assert!(e.expire(Instant::now()));
        assert!(!e.expire(Instant::now()));
    }

    #[test]
    fn test_failure_keeps_last_known_good() {
        let mut e = entry();
        e.begin_fetch();
        e.succeed(3);
        e.begin_fetch();
        assert_eq!(e.status(), CacheStatus::Fresh);
        assert!(e.is_fetching());
        e.fail(FetchError::network("reset"));
        assert_eq!(e.status(), CacheStatus::Error);
        assert_eq!(e.data(), Some(&3));
        assert!(e.last_error().is_some());
    }

    #[test]
    fn test_invalidate_only_touches_fresh() {
        let mut e = entry();
        assert!(!e.invalidate());
        e.succeed(1);
        assert!(e.invalidate());
        assert_eq!(e.status(), CacheStatus::Stale);
        assert!(e.has_data());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_due_after_transient_failure() {
        let backoff = Duration::from_secs(5);
        let mut e = entry();
        e.begin_fetch();
        e.fail(FetchError::network("offline"));
        assert!(!e.retry_due(Instant::now(), backoff));

        tokio::time::advance(backoff).await;
        assert!(e.retry_due(Instant::now(), backoff));
        assert_eq!(e.since_failure(), Some(backoff));

        e.begin_fetch();
        e.succeed(4);
        assert!(!e.retry_due(Instant::now(), backoff));
        assert!(e.since_failure().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_failure_is_never_due() {
        let mut e = entry();
        e.fail(FetchError::schema("statistics/total-events", "missing count"));
        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(!e.retry_due(Instant::now(), Duration::from_secs(5)));
    }
}
