//! Dashboard wiring.
//!
//! Owns the shared query cache, the gateway strategy and the settings
//! reconciler, and hands out the controllers that sit on top of them.

use pulse_cache::{CacheEntry, CachePolicy, QueryCache, QueryObserver};
use pulse_core::StatisticKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::PulseConfig;
use crate::error::ClientError;
use crate::event_filter::EventFilterController;
use crate::export::{ExportCoordinator, ExportError};
use crate::gateway::{build_gateway, fetcher, ResourceRequest, SharedGateway};
use crate::payload::Payload;
use crate::settings::SettingsReconciler;
use crate::store::{FileStore, SettingsStore};

pub struct Dashboard {
    gateway: SharedGateway,
    cache: QueryCache<Payload>,
    settings: Arc<SettingsReconciler>,
    exporter: ExportCoordinator,
    stale_after: Duration,
}

impl Dashboard {
    /// Build from configuration: gateway per `data_source`, settings from
    /// `settings_path`.
    pub async fn new(config: &PulseConfig) -> Result<Self, ClientError> {
        let gateway = build_gateway(config)?;
        let store: Arc<dyn SettingsStore> = Arc::new(FileStore::new(&config.settings_path));
        info!(
            gateway = gateway.name(),
            settings = %config.settings_path.display(),
            "Dashboard starting"
        );
        Ok(Self::with_gateway(gateway, store, config.cache_policy()).await)
    }

    pub async fn with_gateway(
        gateway: SharedGateway,
        store: Arc<dyn SettingsStore>,
        policy: CachePolicy,
    ) -> Self {
        let stale_after = policy.stale_after;
        let settings = Arc::new(SettingsReconciler::load(store).await);
        Self {
            exporter: ExportCoordinator::new(Arc::clone(&gateway)),
            cache: QueryCache::new(policy),
            gateway,
            settings,
            stale_after,
        }
    }

    /// Read one statistic, fetching it if it is missing or stale.
    pub fn statistic(&self, kind: StatisticKind) -> CacheEntry<Payload> {
        let request = ResourceRequest::Statistic(kind);
        self.cache.get(
            &request.cache_key(),
            fetcher(&self.gateway, request),
            self.stale_after,
        )
    }

    /// Keep a statistic watched so sweeps and invalidations refresh it.
    pub fn subscribe_statistic(&self, kind: StatisticKind) -> QueryObserver<Payload> {
        let request = ResourceRequest::Statistic(kind);
        self.cache.observe(
            &request.cache_key(),
            fetcher(&self.gateway, request),
            self.stale_after,
        )
    }

    pub fn total_events(&self) -> CacheEntry<Payload> {
        self.statistic(StatisticKind::TotalEvents)
    }

    pub fn total_users(&self) -> CacheEntry<Payload> {
        self.statistic(StatisticKind::TotalUsers)
    }

    pub fn average_events_per_user(&self) -> CacheEntry<Payload> {
        self.statistic(StatisticKind::AverageEventsPerUser)
    }

    pub fn user_retention_rate(&self) -> CacheEntry<Payload> {
        self.statistic(StatisticKind::UserRetentionRate)
    }

    pub fn events_by_type(&self) -> CacheEntry<Payload> {
        self.statistic(StatisticKind::EventsByType)
    }

    pub fn events_by_month(&self) -> CacheEntry<Payload> {
        self.statistic(StatisticKind::EventsByMonth)
    }

    pub fn top_users(&self) -> CacheEntry<Payload> {
        self.statistic(StatisticKind::TopUsers)
    }

    pub fn user_retention(&self) -> CacheEntry<Payload> {
        self.statistic(StatisticKind::UserRetention)
    }

    pub fn events_per_user_distribution(&self) -> CacheEntry<Payload> {
        self.statistic(StatisticKind::EventsPerUserDistribution)
    }

    pub fn daily_events_per_user(&self) -> CacheEntry<Payload> {
        self.statistic(StatisticKind::DailyEventsPerUser)
    }

    /// Mark every cached read stale. Watched entries refetch immediately.
    pub fn refresh_all(&self) -> usize {
        self.cache.invalidate_all()
    }

    /// A filter controller whose page size is the committed `events_per_page`,
    /// following later saves of that setting.
    pub fn events_controller(&self) -> EventFilterController {
        let limit = self.settings.committed().events_per_page;
        EventFilterController::new(
            &self.cache,
            Arc::clone(&self.gateway),
            limit,
            self.stale_after,
        )
        .follow_page_size(self.settings.subscribe())
    }

    pub fn settings(&self) -> &Arc<SettingsReconciler> {
        &self.settings
    }

    pub fn exporter(&self) -> &ExportCoordinator {
        &self.exporter
    }

    /// Export what `controller` currently filters on, using the committed
    /// export settings, into `dir`.
    pub async fn export_current(
        &self,
        controller: &EventFilterController,
        dir: &std::path::Path,
    ) -> Result<PathBuf, ExportError> {
        let committed = self.settings.committed();
        let request =
            controller.export_request(committed.export_format, committed.include_metadata);
        let payload = self.exporter.run(request).await?;
        self.exporter.save(dir, &payload).await
    }

    /// Periodically refresh stale entries that have subscribers.
    pub fn start_background_refresh(&self) -> JoinHandle<()> {
        self.cache.spawn_sweeper()
    }

    pub fn cache(&self) -> &QueryCache<Payload> {
        &self.cache
    }

    pub fn gateway(&self) -> &SharedGateway {
        &self.gateway
    }
}
