use proptest::prelude::*;
use pulse_cache::{CacheEvent, CacheKey, CacheStatus, QueryCache, SharedFetcher};
use pulse_core::{FetchError, FetchErrorKind, FilterState};
use pulse_test_utils::assertions::{assert_error_kind, assert_fresh_with, assert_status};
use pulse_test_utils::fixtures::fast_policy;
use pulse_test_utils::generators::{arb_criteria_update, arb_filter_state};
use pulse_test_utils::{CountingFetcher, ScriptedFetcher};
use std::time::Duration;

const STALE_AFTER: Duration = Duration::from_secs(30);

fn events_key(state: &FilterState) -> CacheKey {
    CacheKey::with_params("events", &state.to_query()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn concurrent_subscribers_share_one_fetch() {
    let cache: QueryCache<u64> = QueryCache::new(fast_policy());
    let key = CacheKey::new("statistics/total-events");
    let fetcher = CountingFetcher::with_delay(1247u64, Duration::from_millis(200));

    let mut subs: Vec<_> = (0..8).map(|_| cache.subscribe(&key)).collect();
    for _ in 0..8 {
        cache.get(&key, fetcher.clone(), STALE_AFTER);
    }

    for sub in subs.iter_mut() {
        let entry = sub.settled().await.unwrap();
        assert_fresh_with(&entry, &1247);
    }
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache.stats().fetches, 1);
}

#[tokio::test(start_paused = true)]
async fn superseded_key_never_reaches_observer() {
    let cache: QueryCache<String> = QueryCache::new(fast_policy());
    let first = FilterState::default();
    let second = first.clone().with(pulse_core::FilterUpdate::Page(2));
    let k1 = events_key(&first);
    let k2 = events_key(&second);

    let slow: SharedFetcher<String> =
        CountingFetcher::with_delay("page-1".to_string(), Duration::from_secs(3));
    let fast: SharedFetcher<String> =
        CountingFetcher::with_delay("page-2".to_string(), Duration::from_millis(50));

    let mut observer = cache.observe(&k1, slow, STALE_AFTER);
    observer.set_key(&k2, fast);

    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while let Ok(Some(entry)) = tokio::time::timeout_at(deadline, observer.changed()).await {
        seen.push(entry);
    }

    assert!(seen.iter().all(|e| e.key() == &k2));
    assert!(seen
        .iter()
        .all(|e| e.data().map(String::as_str) != Some("page-1")));
    assert_eq!(observer.current().data().map(String::as_str), Some("page-2"));
    assert_eq!(
        cache.peek(&k1).unwrap().data().map(String::as_str),
        Some("page-1")
    );
}

#[tokio::test(start_paused = true)]
async fn error_entry_converges_to_fresh() {
    let cache: QueryCache<u32> = QueryCache::new(fast_policy());
    let key = CacheKey::new("statistics/user-retention-rate");
    let fetcher = ScriptedFetcher::new(vec![
        Err(FetchError::network("connection refused")),
        Err(FetchError::network("connection refused")),
        Err(FetchError::network("connection refused")),
        Ok(78),
    ]);

    let mut sub = cache.subscribe(&key);
    cache.get(&key, fetcher.clone(), STALE_AFTER);
    let failed = sub.settled().await.unwrap();
    assert_error_kind(&failed, FetchErrorKind::Transient);
    assert_eq!(failed.retry_count(), 2);
    assert!(failed.data().is_none());

    cache.get(&key, fetcher.clone(), STALE_AFTER);
    let recovered = sub.settled().await.unwrap();
    assert_fresh_with(&recovered, &78);
    assert!(recovered.last_error().is_none());
    assert_eq!(fetcher.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn schema_failure_surfaces_without_retry() {
    let cache: QueryCache<u32> = QueryCache::new(fast_policy());
    let key = CacheKey::new("statistics/top-users");
    let fetcher = ScriptedFetcher::new(vec![Err(FetchError::schema(
        "top-users",
        "expected an array",
    ))]);

    let mut sub = cache.subscribe(&key);
    cache.get(&key, fetcher.clone(), STALE_AFTER);
    let entry = sub.settled().await.unwrap();
    assert_error_kind(&entry, FetchErrorKind::Schema);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn sweeper_refreshes_watched_entries_in_background() {
    let cache: QueryCache<u32> =
        QueryCache::new(fast_policy().with_sweep_interval(Duration::from_secs(5)));
    let key = CacheKey::new("statistics/total-users");
    let fetcher = CountingFetcher::new(89u32);
    let sweeper = cache.spawn_sweeper();

    let mut sub = cache.subscribe(&key);
    cache.get(&key, fetcher.clone(), STALE_AFTER);
    sub.settled().await.unwrap();

    tokio::time::sleep(Duration::from_secs(36)).await;
    let entry = sub.current();
    assert_eq!(entry.status(), CacheStatus::Fresh);
    assert_eq!(fetcher.calls(), 2);

    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn sweeper_recovers_failed_entry_without_caller() {
    let cache: QueryCache<u32> = QueryCache::new(fast_policy().with_max_retries(0));
    let key = CacheKey::new("statistics/total-events");
    let fetcher = ScriptedFetcher::new(vec![Err(FetchError::network("offline")), Ok(1247)]);
    let sweeper = cache.spawn_sweeper();

    let mut sub = cache.subscribe(&key);
    cache.get(&key, fetcher.clone(), STALE_AFTER);
    let failed = sub.settled().await.unwrap();
    assert_status(&failed, CacheStatus::Error);

    tokio::time::sleep(Duration::from_secs(20)).await;
    let entry = sub.current();
    assert_fresh_with(&entry, &1247);
    assert_eq!(fetcher.calls(), 2);

    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn invalidation_broadcasts_matching_keys() {
    let cache: QueryCache<u32> = QueryCache::new(fast_policy());
    let fetcher = CountingFetcher::new(1u32);
    let keys = [
        CacheKey::new("statistics/total-events"),
        CacheKey::new("statistics/total-users"),
        CacheKey::new("events"),
    ];
    for key in &keys {
        cache.get(key, fetcher.clone(), STALE_AFTER);
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut events = cache.events();
    assert_eq!(cache.invalidate(|k| k.has_prefix("statistics")), 2);
    match events.recv().await.unwrap() {
        CacheEvent::Invalidated { keys } => {
            let mut keys = keys;
            keys.sort();
            assert_eq!(
                keys,
                vec![
                    CacheKey::new("statistics/total-events"),
                    CacheKey::new("statistics/total-users"),
                ]
            );
        }
        other => panic!("unexpected event {other:?}"),
    }
    // Nobody is subscribed, so nothing was refetched.
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(
        cache.peek(&keys[0]).unwrap().status(),
        CacheStatus::Stale
    );
}

proptest! {
    #[test]
    fn canonical_key_ignores_edit_order(
        base in arb_filter_state(),
        a in arb_criteria_update(),
        b in arb_criteria_update(),
    ) {
        // Edits to different fields commute, so the resulting keys must match.
        prop_assume!(std::mem::discriminant(&a) != std::mem::discriminant(&b));
        let ab = base.clone().with(a.clone()).with(b.clone());
        let ba = base.with(b).with(a);
        prop_assert_eq!(events_key(&ab), events_key(&ba));
    }

    #[test]
    fn distinct_filters_give_distinct_keys(
        a in arb_filter_state(),
        b in arb_filter_state(),
    ) {
        prop_assert_eq!(a.to_query() == b.to_query(), events_key(&a) == events_key(&b));
    }

    #[test]
    fn key_params_are_stable(state in arb_filter_state()) {
        let once = events_key(&state);
        let twice = events_key(&state.clone());
        prop_assert_eq!(once.params(), twice.params());
        prop_assert!(!once.params().contains(":null"));
    }
}
