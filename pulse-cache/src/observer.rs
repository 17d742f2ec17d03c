//! Subscriber-side views over cache entries.

use std::time::Duration;
use tokio::sync::watch;

use crate::entry::CacheEntry;
use crate::fetcher::SharedFetcher;
use crate::key::CacheKey;
use crate::manager::QueryCache;

/// Live interest in one cache key.
///
/// While a subscription is alive the entry counts as watched: staleness sweeps
/// and invalidations refetch it. Dropping the subscription withdraws interest.
pub struct Subscription<V> {
    key: CacheKey,
    rx: watch::Receiver<CacheEntry<V>>,
}

impl<V> Subscription<V> {
    pub(crate) fn new(key: CacheKey, rx: watch::Receiver<CacheEntry<V>>) -> Self {
        Self { key, rx }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Latest snapshot, marking it as seen.
    pub fn current(&mut self) -> CacheEntry<V> {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next transition. `None` once the entry has been removed.
    pub async fn changed(&mut self) -> Option<CacheEntry<V>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until no fetch is in flight and the entry has left `Idle`/`Loading`.
    /// Returns immediately if that already holds.
    pub async fn settled(&mut self) -> Option<CacheEntry<V>> {
        let entry = self.rx.wait_for(|entry| entry.is_settled()).await.ok()?;
        Some(entry.clone())
    }
}

/// A re-keyable subscription.
///
/// Holds exactly one key at a time. Moving to a new key subscribes to it before
/// letting go of the old one, so a slow response for a previous key lands in
/// that key's entry and can never surface through this observer.
pub struct QueryObserver<V> {
    cache: QueryCache<V>,
    subscription: Subscription<V>,
    fetcher: SharedFetcher<V>,
    stale_after: Duration,
}

impl<V> QueryObserver<V>
where
    V: Send + Sync + 'static,
{
    pub(crate) fn new(
        cache: QueryCache<V>,
        key: &CacheKey,
        fetcher: SharedFetcher<V>,
        stale_after: Duration,
    ) -> Self {
        let subscription = cache.subscribe(key);
        cache.get(key, fetcher.clone(), stale_after);
        Self {
            cache,
            subscription,
            fetcher,
            stale_after,
        }
    }

    pub fn key(&self) -> &CacheKey {
        self.subscription.key()
    }

    /// Point the observer at `key`. Returns the entry as seen right after the
    /// read, which is `Loading` for a key that has never been fetched.
    pub fn set_key(&mut self, key: &CacheKey, fetcher: SharedFetcher<V>) -> CacheEntry<V> {
        if key != self.subscription.key() {
            self.subscription = self.cache.subscribe(key);
        }
        self.fetcher = fetcher;
        self.cache.get(key, self.fetcher.clone(), self.stale_after);
        self.subscription.current()
    }

    /// Re-run the read for the current key, fetching only if it is not fresh.
    pub fn refresh(&mut self) -> CacheEntry<V> {
        let key = self.subscription.key().clone();
        self.cache.get(&key, self.fetcher.clone(), self.stale_after);
        self.subscription.current()
    }

    pub fn current(&mut self) -> CacheEntry<V> {
        self.subscription.current()
    }

    pub async fn changed(&mut self) -> Option<CacheEntry<V>> {
        self.subscription.changed().await
    }

    pub async fn settled(&mut self) -> Option<CacheEntry<V>> {
        self.subscription.settled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CacheStatus;
    use crate::fetcher::fetcher_fn;
    use crate::policy::CachePolicy;
    use pulse_core::FetchError;

    fn delayed(value: u32, millis: u64) -> SharedFetcher<u32> {
        fetcher_fn(move || async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok::<_, FetchError>(value)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_starts_loading() {
        let cache = QueryCache::new(CachePolicy::default());
        let key = CacheKey::new("events");
        let mut observer = cache.observe(&key, delayed(1, 10), Duration::from_secs(30));

        assert_eq!(observer.current().status(), CacheStatus::Loading);
        let settled = observer.settled().await.unwrap();
        assert_eq!(settled.data(), Some(&1));
        assert_eq!(cache.subscriber_count(&key), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_for_previous_key_is_not_observed() {
        let cache = QueryCache::new(CachePolicy::default());
        let k1 = CacheKey::with_params("events", &serde_json::json!({"page": 1})).unwrap();
        let k2 = CacheKey::with_params("events", &serde_json::json!({"page": 2})).unwrap();

        let mut observer = cache.observe(&k1, delayed(1, 500), Duration::from_secs(30));
        let entry = observer.set_key(&k2, delayed(2, 10));
        assert_eq!(entry.key(), &k2);
        assert_eq!(entry.status(), CacheStatus::Loading);

        let settled = observer.settled().await.unwrap();
        assert_eq!(settled.key(), &k2);
        assert_eq!(settled.data(), Some(&2));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(observer.current().data(), Some(&2));
        assert_eq!(cache.peek(&k1).unwrap().data(), Some(&1));
        assert_eq!(cache.subscriber_count(&k1), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_same_key_does_not_refetch_fresh_entry() {
        let cache = QueryCache::new(CachePolicy::default());
        let key = CacheKey::new("statistics/total-users");
        let mut observer = cache.observe(&key, delayed(5, 10), Duration::from_secs(30));
        observer.settled().await.unwrap();

        let entry = observer.set_key(&key, delayed(6, 10));
        assert_eq!(entry.status(), CacheStatus::Fresh);
        assert!(!entry.is_fetching());
        assert_eq!(cache.stats().fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_reports_transitions() {
        let cache = QueryCache::new(CachePolicy::default());
        let key = CacheKey::new("statistics/average-session-duration");
        let mut observer = cache.observe(&key, delayed(42, 10), Duration::from_secs(30));
        observer.current();

        let next = observer.changed().await.unwrap();
        assert_eq!(next.status(), CacheStatus::Fresh);
        assert_eq!(next.data(), Some(&42));
    }

    #[tokio::test]
    async fn test_subscription_closes_when_entry_removed() {
        let cache: QueryCache<u32> = QueryCache::new(CachePolicy::default());
        let key = CacheKey::new("gone");
        let mut sub = cache.subscribe(&key);
        cache.remove(&key);
        assert!(sub.changed().await.is_none());
    }
}
