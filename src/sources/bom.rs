//! Bureau of Meteorology station observations.
//!
//! Polls the station's observation JSON and reads the latest sample,
//! `observations.data[0]`.
//!
//! Failure policy: a request that cannot reach the server stops the agent
//! with a connection error, a request that times out stops it with a timeout
//! error, and anything wrong with the response itself (error status,
//! undecodable body, no samples) only degrades the tick.

use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{classify_request_error, json_number};
use crate::collector::{MetricDescriptor, MetricTable, Reading, Source};
use crate::error::{AgentError, Result};

const DEFAULT_BASE_URL: &str = "http://www.bom.gov.au";

/// Default metric table: air and apparent temperature
pub fn metric_table() -> Result<MetricTable> {
    MetricTable::new(vec![
        MetricDescriptor::new("{host}/station/temperature-air", "air_temp"),
        MetricDescriptor::new("{host}/station/temperature-apparent", "apparent_t"),
    ])
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("putval-agents/{}", crate::VERSION)
}

/// Settings for the BoM source
#[derive(Debug, Deserialize, Clone)]
pub struct BomSettings {
    /// Product id of the area, e.g. `IDN60901`
    pub area_id: String,
    /// WMO station number, e.g. `94768`
    pub station_id: String,
    /// Server root
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl BomSettings {
    pub fn new(area_id: impl Into<String>, station_id: impl Into<String>) -> Self {
        Self {
            area_id: area_id.into(),
            station_id: station_id.into(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// URL of a station's observation JSON
pub fn observation_url(base_url: &str, area_id: &str, station_id: &str) -> String {
    format!(
        "{}/fwo/{}/{}.{}.json",
        base_url.trim_end_matches('/'),
        area_id,
        area_id,
        station_id
    )
}

/// Read `keys` from the latest sample in an observation document
pub fn extract_observation(body: &str, keys: &[String]) -> Result<Reading> {
    let document: Value = serde_json::from_str(body)
        .map_err(|e| AgentError::Malformed(format!("observation is not JSON: {}", e)))?;

    let sample = document
        .pointer("/observations/data/0")
        .and_then(Value::as_object)
        .ok_or_else(|| AgentError::Malformed("observation has no samples".to_string()))?;

    Ok(keys
        .iter()
        .map(|key| {
            let value = sample.get(key).and_then(json_number);
            if value.is_none() {
                debug!("Observation has no numeric {}", key);
            }
            value
        })
        .collect())
}

/// Polls one BoM observation station over HTTP
pub struct BomSource {
    client: Client,
    url: String,
    name: String,
}

impl BomSource {
    /// Create a new source
    pub fn new(settings: &BomSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| AgentError::Setup(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: observation_url(&settings.base_url, &settings.area_id, &settings.station_id),
            name: format!("bom {}.{}", settings.area_id, settings.station_id),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Source for BomSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&mut self, keys: &[String]) -> Result<Reading> {
        debug!("GET {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| classify_request_error(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Malformed(format!("{} returned {}", self.url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error(&self.name, e))?;

        extract_observation(&body, keys)
    }
}
