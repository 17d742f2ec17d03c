//! Fetcher abstraction used by the cache to reach the network.

use async_trait::async_trait;
use pulse_core::FetchError;
use std::future::Future;
use std::sync::Arc;

/// Produces the payload for one cache key.
///
/// The cache stores the fetcher alongside the entry so that background
/// refreshes and invalidation can re-run it without the original caller.
#[async_trait]
pub trait QueryFetcher<V>: Send + Sync {
    async fn fetch(&self) -> Result<V, FetchError>;
}

/// Fetcher handle as stored by the cache.
pub type SharedFetcher<V> = Arc<dyn QueryFetcher<V>>;

/// Adapts an async closure into a [`QueryFetcher`].
pub struct FnFetcher<F> {
    f: F,
}

#[async_trait]
impl<V, F, Fut> QueryFetcher<V> for FnFetcher<F>
where
    V: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
{
    async fn fetch(&self) -> Result<V, FetchError> {
        (self.f)().await
    }
}

/// Wrap an async closure as a shared fetcher.
pub fn fetcher_fn<V, F, Fut>(f: F) -> SharedFetcher<V>
where
    V: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
{
    Arc::new(FnFetcher { f })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_fetcher() {
        let fetcher = fetcher_fn(|| async { Ok::<_, FetchError>(42u32) });
        assert_eq!(fetcher.fetch().await, Ok(42));
    }
}
