//! Pulse client entry point.
//!
//! Loads every dashboard statistic and the first events page, prints them as
//! a JSON report, and optionally writes an export of the events list.

use futures_util::future::join_all;
use pulse_cache::CacheEntry;
use pulse_client::config::PulseConfig;
use pulse_client::dashboard::Dashboard;
use pulse_client::error::ClientError;
use pulse_client::payload::Payload;
use pulse_client::telemetry::init_tracing;
use pulse_core::StatisticKind;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let config = PulseConfig::load()?;
    init_tracing(&config.log)?;

    let dashboard = Dashboard::new(&config).await?;
    let sweeper = dashboard.start_background_refresh();

    let mut observers: Vec<_> = StatisticKind::ALL
        .iter()
        .map(|kind| (*kind, dashboard.subscribe_statistic(*kind)))
        .collect();
    let settled = join_all(observers.iter_mut().map(|(kind, observer)| async move {
        (*kind, observer.settled().await)
    }))
    .await;

    let mut statistics = Map::new();
    for (kind, entry) in settled {
        match entry {
            Some(entry) => {
                statistics.insert(kind.slug().to_string(), render(&entry)?);
            }
            None => warn!(statistic = %kind, "Statistic entry removed before settling"),
        }
    }

    let mut events = dashboard.events_controller();
    let events_entry = match events.settled().await {
        Some(entry) => render(&entry)?,
        None => Value::Null,
    };

    let mut report = json!({
        "gateway": dashboard.gateway().name(),
        "statistics": statistics,
        "events": events_entry,
        "settings": dashboard.settings().committed(),
        "cache": {
            "hits": dashboard.cache().stats().hits,
            "misses": dashboard.cache().stats().misses,
            "fetches": dashboard.cache().stats().fetches,
            "retries": dashboard.cache().stats().retries,
        },
    });

    if std::env::args().any(|arg| arg == "--export") {
        let path = dashboard.export_current(&events, &config.export_dir).await?;
        info!(path = %path.display(), "Export written");
        report["export"] = json!(path.display().to_string());
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    sweeper.abort();
    Ok(())
}

fn render(entry: &CacheEntry<Payload>) -> Result<Value, ClientError> {
    Ok(json!({
        "status": entry.status().as_str(),
        "fetchedAt": entry.fetched_at(),
        "data": entry.data().map(serde_json::to_value).transpose()?,
        "error": entry.last_error().map(|err| err.to_string()),
        "retries": entry.retry_count(),
    }))
}
