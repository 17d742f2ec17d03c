//! Events Filter Controller.
//!
//! Owns the event log's [`FilterState`] and keeps a [`QueryObserver`] pointed
//! at the cache key for the current request parameters. Every mutation
//! re-keys the observer, so a combination seen before is served from the cache
//! and a response for an abandoned combination never reaches this view.

use pulse_cache::{CacheEntry, QueryCache, QueryObserver};
use pulse_core::{
    total_pages, EventQuery, EventsPage, ExportFormat, ExportRequest, FilterState, FilterUpdate,
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::gateway::{fetcher, ResourceRequest, SharedGateway};
use crate::payload::Payload;
use crate::settings::SettingsState;

/// Committed page size a controller follows.
struct PageSizeSource {
    settings: watch::Receiver<SettingsState>,
    last_committed: u32,
}

impl PageSizeSource {
    /// The committed page size, if a save moved it since the last call.
    fn take_change(&mut self) -> Option<u32> {
        let committed = self.settings.borrow_and_update().committed.events_per_page;
        if committed == self.last_committed {
            return None;
        }
        self.last_committed = committed;
        Some(committed)
    }
}

pub struct EventFilterController {
    cache: QueryCache<Payload>,
    gateway: SharedGateway,
    state: FilterState,
    known_total: Option<u64>,
    observer: QueryObserver<Payload>,
    page_size: Option<PageSizeSource>,
}

impl EventFilterController {
    /// Start on page 1 with no criteria and request that page right away.
    pub fn new(
        cache: &QueryCache<Payload>,
        gateway: SharedGateway,
        limit: u32,
        stale_after: Duration,
    ) -> Self {
        let state = FilterState::new(limit);
        let request = ResourceRequest::Events(state.to_query());
        let observer = cache.observe(
            &request.cache_key(),
            fetcher(&gateway, request),
            stale_after,
        );
        let mut controller = Self {
            cache: cache.clone(),
            gateway,
            state,
            known_total: None,
            observer,
            page_size: None,
        };
        let entry = controller.observer.current();
        if controller.absorb(&entry) {
            controller.rekey();
        }
        controller
    }

    /// Follow the committed `events_per_page` of a settings reconciler. Each
    /// save that changes it is applied as a `Limit` edit, which returns to
    /// page 1. Draft edits and explicit `Limit` edits are left alone.
    pub fn follow_page_size(mut self, settings: watch::Receiver<SettingsState>) -> Self {
        let last_committed = settings.borrow().committed.events_per_page;
        self.page_size = Some(PageSizeSource {
            settings,
            last_committed,
        });
        self
    }

    /// Apply one field edit. Anything but a page change returns to page 1.
    pub fn set_filter(&mut self, update: FilterUpdate) -> CacheEntry<Payload> {
        self.sync_page_size();
        if let FilterUpdate::Page(page) = update {
            return self.set_page(page);
        }
        self.state.apply(update);
        self.known_total = None;
        self.rekey()
    }

    /// Move to `page`, clamped to the known page count when there is one.
    pub fn set_page(&mut self, page: u32) -> CacheEntry<Payload> {
        self.sync_page_size();
        let page = match self.total_pages() {
            Some(last) => page.clamp(1, last),
            None => page.max(1),
        };
        self.state.apply(FilterUpdate::Page(page));
        self.rekey()
    }

    /// Drop every criterion, keeping the page size.
    pub fn clear(&mut self) -> CacheEntry<Payload> {
        self.sync_page_size();
        self.state.clear();
        self.known_total = None;
        self.rekey()
    }

    pub fn current_request_params(&self) -> EventQuery {
        self.state.to_query()
    }

    pub fn filter_state(&self) -> &FilterState {
        &self.state
    }

    /// Server-reported total for the current criteria, once a page has loaded.
    pub fn known_total(&self) -> Option<u64> {
        self.known_total
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.known_total
            .map(|total| total_pages(total, self.state.limit()))
    }

    pub fn entry(&mut self) -> CacheEntry<Payload> {
        if self.sync_page_size() {
            return self.rekey();
        }
        self.observer.current()
    }

    /// The loaded page for the current parameters, if any.
    pub fn events_page(&mut self) -> Option<EventsPage> {
        if self.sync_page_size() {
            self.rekey();
        }
        self.observer
            .current()
            .data()
            .and_then(Payload::as_events)
            .cloned()
    }

    /// Wait for the next transition of the current entry, or for a committed
    /// page size change that re-keys it. `None` if the entry was removed from
    /// the cache.
    pub async fn next_update(&mut self) -> Option<CacheEntry<Payload>> {
        loop {
            if self.sync_page_size() {
                return Some(self.rekey());
            }
            let entry = match self.page_size.as_mut() {
                Some(source) => tokio::select! {
                    entry = self.observer.changed() => entry,
                    Ok(()) = source.settings.changed() => continue,
                },
                None => self.observer.changed().await,
            }?;
            let entry = if self.absorb(&entry) {
                self.rekey()
            } else {
                entry
            };
            return Some(entry);
        }
    }

    /// Wait until the current parameters have a settled entry, following any
    /// page clamp the loaded total forces.
    pub async fn settled(&mut self) -> Option<CacheEntry<Payload>> {
        if self.sync_page_size() {
            self.rekey();
        }
        loop {
            let entry = self.observer.settled().await?;
            if !self.absorb(&entry) {
                return Some(entry);
            }
            self.rekey();
        }
    }

    /// Mark the current page stale and refetch it.
    pub fn refresh(&mut self) -> CacheEntry<Payload> {
        let key = self.observer.key().clone();
        self.cache.invalidate(|k| *k == key);
        self.observer.refresh()
    }

    /// Snapshot the criteria for an export. Pagination is not part of it.
    pub fn export_request(&self, format: ExportFormat, include_metadata: bool) -> ExportRequest {
        ExportRequest::new(&self.state, format, include_metadata)
    }

    /// Pick up a committed page size change. Returns whether the state moved;
    /// the caller re-keys.
    fn sync_page_size(&mut self) -> bool {
        let Some(limit) = self.page_size.as_mut().and_then(PageSizeSource::take_change) else {
            return false;
        };
        if limit == self.state.limit() {
            return false;
        }
        debug!(limit, "Committed page size changed");
        self.state.apply(FilterUpdate::Limit(limit));
        self.known_total = None;
        true
    }

    fn rekey(&mut self) -> CacheEntry<Payload> {
        loop {
            let request = ResourceRequest::Events(self.state.to_query());
            let key = request.cache_key();
            debug!(key = %key, page = self.state.page(), "Events query re-keyed");
            let entry = self
                .observer
                .set_key(&key, fetcher(&self.gateway, request));
            if !self.absorb(&entry) {
                return entry;
            }
        }
    }

    /// Record the total carried by `entry` and clamp the page down if it now
    /// points past the last page. Returns whether the page moved.
    fn absorb(&mut self, entry: &CacheEntry<Payload>) -> bool {
        let Some(page) = entry.data().and_then(Payload::as_events) else {
            return false;
        };
        self.known_total = Some(page.total);
        let last = total_pages(page.total, self.state.limit());
        if self.state.page() > last {
            debug!(from = self.state.page(), to = last, "Clamping page to result set");
            self.state.apply(FilterUpdate::Page(last));
            true
        } else {
            false
        }
    }
}
