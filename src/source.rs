// Clients for the dataset registration and aggregation endpoints

use crate::aggregate::RawAggregateResult;
use crate::config::DashboardConfig;
use crate::error::{DashResult, DashboardError};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Opaque identifier the service hands out for a registered dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn new(id: impl Into<String>) -> Self {
        DatasetId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The remote side of the dashboard: turns a dataset URL into an id, and an
/// id plus optional grouping column into an aggregate result.
pub trait AggregateSource {
    fn register_dataset(&self, url: &str) -> DashResult<DatasetId>;

    fn fetch_aggregate(
        &self,
        id: &DatasetId,
        grouping: Option<&str>,
    ) -> DashResult<RawAggregateResult>;
}

impl<S: AggregateSource + ?Sized> AggregateSource for &S {
    fn register_dataset(&self, url: &str) -> DashResult<DatasetId> {
        (**self).register_dataset(url)
    }

    fn fetch_aggregate(
        &self,
        id: &DatasetId,
        grouping: Option<&str>,
    ) -> DashResult<RawAggregateResult> {
        (**self).fetch_aggregate(id, grouping)
    }
}

#[derive(Debug, Deserialize)]
struct Registration {
    id: DatasetId,
}

/// HTTP client for `POST datasets` and `GET calculate`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> DashResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("histoboard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| DashboardError::network("building HTTP client", e))?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &DashboardConfig) -> DashResult<Self> {
        Self::new(config.base_url.clone(), Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl AggregateSource for HttpSource {
    fn register_dataset(&self, url: &str) -> DashResult<DatasetId> {
        let endpoint = self.endpoint("datasets");
        info!(dataset = %url, "registering dataset");

        let response = self
            .client
            .post(&endpoint)
            .form(&[("url", url)])
            .send()
            .map_err(|e| DashboardError::network("dataset registration", e))?;

        if !response.status().is_success() {
            return Err(DashboardError::Status {
                context: "dataset registration".to_string(),
                status: response.status(),
            });
        }

        let registration: Registration = response
            .json()
            .map_err(|e| DashboardError::network("decoding dataset registration", e))?;
        debug!(id = %registration.id, "dataset registered");
        Ok(registration.id)
    }

    fn fetch_aggregate(
        &self,
        id: &DatasetId,
        grouping: Option<&str>,
    ) -> DashResult<RawAggregateResult> {
        let mut query = vec![("id", id.as_str())];
        if let Some(group) = grouping.filter(|g| !g.is_empty()) {
            query.push(("group", group));
        }
        info!(id = %id, grouping = ?grouping, "fetching aggregate");

        let response = self
            .client
            .get(self.endpoint("calculate"))
            .query(&query)
            .send()
            .map_err(|e| DashboardError::network("aggregate retrieval", e))?;

        if !response.status().is_success() {
            return Err(DashboardError::Status {
                context: "aggregate retrieval".to_string(),
                status: response.status(),
            });
        }

        let body = response
            .text()
            .map_err(|e| DashboardError::network("reading aggregate body", e))?;
        RawAggregateResult::from_json_str(&body)
    }
}
