//! Pulse dashboard client.
//!
//! Gateway strategies (HTTP and built-in fixtures), the Events Filter
//! Controller, the Settings Reconciler and the Export Coordinator, wired
//! together by [`dashboard::Dashboard`] over a shared
//! [`pulse_cache::QueryCache`].

pub mod config;
pub mod dashboard;
pub mod error;
pub mod event_filter;
pub mod export;
pub mod fixtures;
pub mod gateway;
pub mod payload;
pub mod settings;
pub mod store;
pub mod telemetry;

pub use config::{DataSource, PulseConfig};
pub use dashboard::Dashboard;
pub use error::ClientError;
pub use event_filter::EventFilterController;
pub use export::{ExportCoordinator, ExportError, ExportPayload, ExportState};
pub use fixtures::FixtureGateway;
pub use gateway::{Gateway, ResourceRequest, RestGateway, SharedGateway};
pub use payload::Payload;
pub use settings::{SaveError, SettingsReconciler, SettingsState};
pub use store::{FileStore, MemoryStore, SettingsStore, StoreError};
