//! Query cache with explicit freshness and retry contracts.
//!
//! Every remote read in the dashboard goes through a [`QueryCache`]. Entries
//! are keyed by a canonical [`CacheKey`] and carry their own lifecycle state
//! ([`CacheStatus`]), so staleness and failure are visible to the caller
//! rather than hidden behind a "best effort" lookup.
//!
//! # Guarantees
//!
//! - At most one fetch per key is in flight; concurrent reads attach to it.
//! - Stale entries keep serving their last-known-good data while a background
//!   refresh runs.
//! - Transient failures are retried a bounded number of times with a fixed
//!   delay; schema failures are surfaced immediately.
//! - A completion for a superseded entry is discarded, never applied.
//! - [`QueryCache::get`] never fails. All failure is encoded in the entry.
//!
//! # Example
//!
//! ```ignore
//! let cache: QueryCache<u64> = QueryCache::new(CachePolicy::default());
//! let key = CacheKey::new("statistics/total-events");
//! let entry = cache.get(&key, fetcher_fn(|| async { Ok(1247) }), cache.policy().stale_after);
//! assert_eq!(entry.status(), CacheStatus::Loading);
//!
//! let mut sub = cache.subscribe(&key);
//! let settled = sub.settled().await.expect("entry removed");
//! ```

pub mod entry;
pub mod fetcher;
pub mod key;
pub mod manager;
pub mod observer;
pub mod policy;

pub use entry::{CacheEntry, CacheStatus};
pub use fetcher::{fetcher_fn, FnFetcher, QueryFetcher, SharedFetcher};
pub use key::CacheKey;
pub use manager::{CacheEvent, CacheStats, QueryCache};
pub use observer::{QueryObserver, Subscription};
pub use policy::CachePolicy;
