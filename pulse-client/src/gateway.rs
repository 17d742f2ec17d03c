//! Remote access gateway.
//!
//! Typed request/response functions for each statistic and the events list
//! and export endpoints. Two strategies implement [`Gateway`]: [`RestGateway`]
//! talks to the HTTP service, [`FixtureGateway`](crate::fixtures::FixtureGateway)
//! serves built-in sample data. The strategy is chosen once, at construction.

use async_trait::async_trait;
use pulse_cache::{CacheKey, QueryFetcher, SharedFetcher};
use pulse_core::{EventQuery, ExportRequest, FetchError, Resource, StatisticKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{DataSource, PulseConfig};
use crate::error::ClientError;
use crate::fixtures::FixtureGateway;
use crate::payload::Payload;

/// One cacheable read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    Statistic(StatisticKind),
    Events(EventQuery),
}

impl ResourceRequest {
    pub fn resource(&self) -> Resource {
        match self {
            Self::Statistic(kind) => Resource::Statistic(*kind),
            Self::Events(_) => Resource::Events,
        }
    }

    /// Query-string pairs sent with the request.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Statistic(_) => Vec::new(),
            Self::Events(query) => query.to_pairs(),
        }
    }

    /// Cache key: resource name plus the canonical query pairs.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_pairs(self.resource().cache_name(), self.query_pairs())
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Short name for logs (`"live"`, `"fixture"`).
    fn name(&self) -> &'static str;

    async fn fetch(&self, request: &ResourceRequest) -> Result<Payload, FetchError>;

    /// Retrieve an export file body.
    async fn export(&self, request: &ExportRequest) -> Result<Vec<u8>, FetchError>;
}

pub type SharedGateway = Arc<dyn Gateway>;

/// Build the strategy named by `config.data_source`.
pub fn build_gateway(config: &PulseConfig) -> Result<SharedGateway, ClientError> {
    let gateway: SharedGateway = match config.data_source {
        DataSource::Live => Arc::new(RestGateway::new(
            &config.api_base_url,
            config.request_timeout(),
        )?),
        DataSource::Fixture => Arc::new(FixtureGateway::new()),
    };
    Ok(gateway)
}

/// Cache fetcher bound to one gateway request.
pub struct GatewayFetcher {
    gateway: SharedGateway,
    request: ResourceRequest,
}

#[async_trait]
impl QueryFetcher<Payload> for GatewayFetcher {
    async fn fetch(&self) -> Result<Payload, FetchError> {
        self.gateway.fetch(&self.request).await
    }
}

pub fn fetcher(gateway: &SharedGateway, request: ResourceRequest) -> SharedFetcher<Payload> {
    Arc::new(GatewayFetcher {
        gateway: Arc::clone(gateway),
        request,
    })
}

/// HTTP strategy.
#[derive(Clone)]
pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RestGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_bytes(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, params = query.len(), "GET");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;
        Ok(bytes.to_vec())
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            FetchError::network(err.to_string())
        }
    }
}

#[async_trait]
impl Gateway for RestGateway {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn fetch(&self, request: &ResourceRequest) -> Result<Payload, FetchError> {
        let resource = request.resource();
        let bytes = self
            .get_bytes(&resource.path(), &request.query_pairs())
            .await?;
        let body = String::from_utf8(bytes)
            .map_err(|err| FetchError::schema(resource.cache_name(), err.to_string()))?;
        Payload::decode(resource, &body)
    }

    async fn export(&self, request: &ExportRequest) -> Result<Vec<u8>, FetchError> {
        self.get_bytes("/api/events/export", &request.to_pairs())
            .await
    }
}
