//! The query cache manager.
//!
//! Owns the entry table and every state transition on it. Callers read with
//! [`QueryCache::get`] (which schedules fetches as a side effect), register
//! interest with [`QueryCache::subscribe`], and force refreshes with
//! [`QueryCache::invalidate`]. Nothing outside this module writes entry state.

use pulse_core::FetchError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::entry::{CacheEntry, CacheStatus};
use crate::fetcher::SharedFetcher;
use crate::key::CacheKey;
use crate::observer::{QueryObserver, Subscription};
use crate::policy::CachePolicy;

/// Notifications published on every entry transition of interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A fetch cycle finished for `key`.
    Updated { key: CacheKey, status: CacheStatus },
    /// A fetch attempt failed and will be retried.
    Retrying { key: CacheKey, attempt: u32 },
    /// Entries were forced stale by [`QueryCache::invalidate`].
    Invalidated { keys: Vec<CacheKey> },
    /// A completion arrived for an entry that no longer exists in that form.
    Discarded { key: CacheKey },
}

/// Counters describing cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// `get` calls answered by a fresh entry.
    pub hits: u64,
    /// `get` calls that found no entry, or one that was not fresh.
    pub misses: u64,
    /// Fetch cycles started.
    pub fetches: u64,
    /// Attempts beyond the first in a cycle.
    pub retries: u64,
    /// Completions dropped because their entry was superseded.
    pub discarded: u64,
}

impl CacheStats {
    /// Hit rate between 0.0 and 1.0.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    retries: AtomicU64,
    discarded: AtomicU64,
}

struct Slot<V> {
    tx: watch::Sender<CacheEntry<V>>,
    fetcher: Option<SharedFetcher<V>>,
    generation: u64,
    refetch_requested: bool,
}

impl<V> Slot<V> {
    fn entry(&self) -> watch::Ref<'_, CacheEntry<V>> {
        self.tx.borrow()
    }

    fn is_fetching(&self) -> bool {
        self.tx.borrow().is_fetching
    }

    fn has_subscribers(&self) -> bool {
        self.tx.receiver_count() > 0
    }
}

struct Inner<V> {
    slots: RwLock<HashMap<CacheKey, Slot<V>>>,
    policy: CachePolicy,
    events: broadcast::Sender<CacheEvent>,
    counters: Counters,
    next_generation: AtomicU64,
}

/// Keyed cache of remote reads.
///
/// Cloning is cheap and every clone shares the same entry table, so one
/// instance can be handed to every controller that needs it.
pub struct QueryCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> QueryCache<V>
where
    V: Send + Sync + 'static,
{
    pub fn new(policy: CachePolicy) -> Self {
        let (events, _) = broadcast::channel(policy.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                slots: RwLock::new(HashMap::new()),
                policy,
                events,
                counters: Counters::default(),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CachePolicy::default())
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    /// Read the current state of `key`, scheduling a fetch when the entry is
    /// missing, idle, stale or failed and no fetch is already in flight.
    ///
    /// The fetcher replaces any previously registered one for this key and is
    /// reused for background refreshes.
    pub fn get(
        &self,
        key: &CacheKey,
        fetcher: SharedFetcher<V>,
        stale_after: Duration,
    ) -> CacheEntry<V> {
        let mut slots = self.write_slots();
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| self.new_slot(key, stale_after));
        slot.fetcher = Some(fetcher);
        slot.tx.send_if_modified(|entry| {
            let mut changed = entry.stale_after != stale_after;
            entry.stale_after = stale_after;
            changed |= entry.expire(Instant::now());
            changed
        });

        let (status, fetching) = {
            let entry = slot.entry();
            (entry.status, entry.is_fetching)
        };
        if status == CacheStatus::Fresh {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache hit");
        } else {
            self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
            if fetching {
                debug!(key = %key, "attaching to in-flight fetch");
            } else {
                self.start_fetch(key, slot);
            }
        }

        let snapshot = slot.entry().clone();
        snapshot
    }

    /// Current state of `key` without side effects.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.read_slots().get(key).map(|slot| slot.entry().clone())
    }

    /// Register interest in `key`. Creates an idle entry if none exists.
    pub fn subscribe(&self, key: &CacheKey) -> Subscription<V> {
        let mut slots = self.write_slots();
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| self.new_slot(key, self.inner.policy.stale_after));
        Subscription::new(key.clone(), slot.tx.subscribe())
    }

    /// Keyed view that can later be re-pointed with [`QueryObserver::set_key`].
    pub fn observe(
        &self,
        key: &CacheKey,
        fetcher: SharedFetcher<V>,
        stale_after: Duration,
    ) -> QueryObserver<V> {
        QueryObserver::new(self.clone(), key, fetcher, stale_after)
    }

    /// Number of live subscriptions on `key`.
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.read_slots()
            .get(key)
            .map(|slot| slot.tx.receiver_count())
            .unwrap_or(0)
    }

    /// Force every matching entry stale and schedule a refetch for those with
    /// at least one live subscription. Data is never cleared. Returns the
    /// number of matching entries.
    pub fn invalidate<P>(&self, predicate: P) -> usize
    where
        P: Fn(&CacheKey) -> bool,
    {
        let mut matched = Vec::new();
        {
            let mut slots = self.write_slots();
            for (key, slot) in slots.iter_mut() {
                if !predicate(key) {
                    continue;
                }
                matched.push(key.clone());
                slot.tx.send_if_modified(|entry| entry.invalidate());
                if slot.is_fetching() {
                    slot.refetch_requested = true;
                } else if slot.has_subscribers() {
                    self.start_fetch(key, slot);
                }
            }
        }

        if !matched.is_empty() {
            info!(count = matched.len(), "invalidated cache entries");
            self.emit(CacheEvent::Invalidated {
                keys: matched.clone(),
            });
        }
        matched.len()
    }

    /// Invalidate everything.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate(|_| true)
    }

    /// Record `Fresh -> Stale` for expired entries and refresh the watched
    /// ones that are stale, or failed transiently at least one
    /// `policy.sweep_interval` ago. Returns the number of refreshes started.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let backoff = self.inner.policy.sweep_interval;
        let mut started = 0;
        let mut slots = self.write_slots();
        for (key, slot) in slots.iter_mut() {
            slot.tx.send_if_modified(|entry| entry.expire(now));
            let due = {
                let entry = slot.entry();
                entry.status == CacheStatus::Stale || entry.retry_due(now, backoff)
            };
            if due && slot.has_subscribers() && !slot.is_fetching() {
                self.start_fetch(key, slot);
                started += 1;
            }
        }
        if started > 0 {
            debug!(started, "staleness sweep refreshed entries");
        }
        started
    }

    /// Run [`QueryCache::sweep`] every `policy.sweep_interval` until the cache
    /// is dropped.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let weak: Weak<Inner<V>> = Arc::downgrade(&self.inner);
        let period = self.inner.policy.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                QueryCache { inner }.sweep();
            }
        })
    }

    /// Drop the entry for `key`. An in-flight fetch for it will be discarded
    /// when it completes; subscriptions observe the channel closing.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.write_slots().remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<_> = self.read_slots().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_slots().is_empty()
    }

    /// Subscribe to the cache event broadcast.
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------------------
    // Fetch lifecycle
    // ------------------------------------------------------------------------

    fn new_slot(&self, key: &CacheKey, stale_after: Duration) -> Slot<V> {
        let (tx, _rx) = watch::channel(CacheEntry::idle(key.clone(), stale_after));
        Slot {
            tx,
            fetcher: None,
            generation: self.inner.next_generation.fetch_add(1, Ordering::Relaxed),
            refetch_requested: false,
        }
    }

    /// Caller holds the table lock and has checked that nothing is in flight.
    fn start_fetch(&self, key: &CacheKey, slot: &mut Slot<V>) {
        let Some(fetcher) = slot.fetcher.clone() else {
            debug!(key = %key, "no fetcher registered; leaving entry as is");
            return;
        };

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                error!(key = %key, "fetch requested outside an async runtime");
                slot.tx.send_modify(|entry| entry.fail(FetchError::Runtime));
                return;
            }
        };

        slot.refetch_requested = false;
        slot.tx.send_modify(|entry| entry.begin_fetch());
        self.inner.counters.fetches.fetch_add(1, Ordering::Relaxed);

        let cache = self.clone();
        let key = key.clone();
        let generation = slot.generation;
        handle.spawn(async move {
            cache.run_fetch(key, generation, fetcher).await;
        });
    }

    async fn run_fetch(self, key: CacheKey, generation: u64, fetcher: SharedFetcher<V>) {
        let policy = self.inner.policy.clone();
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(policy.request_timeout, fetcher.fetch()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout {
                    timeout_ms: u64::try_from(policy.request_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                }),
            };

            match result {
                Ok(value) => {
                    self.complete(&key, generation, Ok(value));
                    return;
                }
                Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                    attempt += 1;
                    warn!(key = %key, attempt, error = %err, "fetch failed; retrying");
                    if !self.record_retry(&key, generation, attempt) {
                        return;
                    }
                    tokio::time::sleep(policy.retry_delay).await;
                }
                Err(err) => {
                    self.complete(&key, generation, Err(err));
                    return;
                }
            }
        }
    }

    /// Returns false when the entry has been superseded and the cycle should stop.
    fn record_retry(&self, key: &CacheKey, generation: u64, attempt: u32) -> bool {
        let recorded = {
            let slots = self.read_slots();
            match slots.get(key) {
                Some(slot) if slot.generation == generation => {
                    slot.tx.send_modify(|entry| entry.retry_count = attempt);
                    true
                }
                _ => false,
            }
        };

        if recorded {
            self.inner.counters.retries.fetch_add(1, Ordering::Relaxed);
            self.emit(CacheEvent::Retrying {
                key: key.clone(),
                attempt,
            });
        } else {
            self.discard(key);
        }
        recorded
    }

    fn complete(&self, key: &CacheKey, generation: u64, result: Result<V, FetchError>) {
        let mut slots = self.write_slots();
        let current = slots.get(key).map(|slot| slot.generation) == Some(generation);
        let Some(slot) = slots.get_mut(key).filter(|_| current) else {
            drop(slots);
            self.discard(key);
            return;
        };

        match result {
            Ok(value) => {
                slot.tx.send_modify(|entry| entry.succeed(value));
                info!(key = %key, "fetch succeeded");
            }
            Err(err) => {
                error!(key = %key, error = %err, "fetch failed");
                slot.tx.send_modify(|entry| entry.fail(err));
            }
        }
        let status = slot.entry().status;

        if slot.refetch_requested {
            slot.refetch_requested = false;
            slot.tx.send_if_modified(|entry| entry.invalidate());
            if slot.has_subscribers() {
                debug!(key = %key, "running refetch requested during flight");
                self.start_fetch(key, slot);
            }
        }
        drop(slots);

        self.emit(CacheEvent::Updated {
            key: key.clone(),
            status,
        });
    }

    fn discard(&self, key: &CacheKey) {
        self.inner.counters.discarded.fetch_add(1, Ordering::Relaxed);
        warn!(key = %key, "discarding completion for superseded entry");
        self.emit(CacheEvent::Discarded { key: key.clone() });
    }

    fn emit(&self, event: CacheEvent) {
        // No receivers is fine; presentation may not be listening yet.
        let _ = self.inner.events.send(event);
    }

    fn read_slots(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, Slot<V>>> {
        self.inner
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slots(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, Slot<V>>> {
        self.inner
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
