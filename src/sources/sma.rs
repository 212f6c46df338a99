//! SMA WebConnect inverters.
//!
//! The inverter's JSON API needs a session: [`Source::open`] logs in and
//! keeps the session id, every fetch reuses it, and [`Source::close`] logs
//! out. A failed login stops the agent before anything is reported.
//!
//! During polling, transport failures and timeouts stop the agent; an error
//! code from the device or a body that cannot be read only degrades the tick.
//! An error code also drops the session, and the next fetch logs in again.

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;

use super::{classify_request_error, json_number};
use crate::collector::{MetricDescriptor, MetricTable, Reading, Source};
use crate::error::{AgentError, Result};

/// Instantaneous AC power fed in, W
pub const KEY_CURRENT_POWER_W: &str = "6100_40263F00";
/// Instantaneous consumption, W
pub const KEY_CURRENT_CONSUMPTION_W: &str = "6100_00543100";
/// Lifetime yield, reported in Wh
pub const KEY_TOTAL_YIELD_KWH: &str = "6400_00260100";
/// Lifetime consumption, reported in Wh
pub const KEY_TOTAL_CONSUMPTION_KWH: &str = "6400_00543A00";

/// Divisors applied to raw register values
const SCALE: &[(&str, f64)] = &[
    (KEY_CURRENT_POWER_W, 1.0),
    (KEY_CURRENT_CONSUMPTION_W, 1.0),
    (KEY_TOTAL_YIELD_KWH, 1000.0),
    (KEY_TOTAL_CONSUMPTION_KWH, 1000.0),
];

fn scale_of(key: &str) -> f64 {
    SCALE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, factor)| *factor)
        .unwrap_or(1.0)
}

/// Default metric table: power, consumption and lifetime totals
pub fn metric_table() -> Result<MetricTable> {
    MetricTable::new(vec![
        MetricDescriptor::new("{host}/sma/current_power_w", KEY_CURRENT_POWER_W),
        MetricDescriptor::new("{host}/sma/current_consumption_w", KEY_CURRENT_CONSUMPTION_W),
        MetricDescriptor::new("{host}/sma/total_yield_kwh", KEY_TOTAL_YIELD_KWH),
        MetricDescriptor::new("{host}/sma/total_consumption_kwh", KEY_TOTAL_CONSUMPTION_KWH),
    ])
}

/// Account the agent logs in as
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmaGroup {
    #[default]
    User,
    Installer,
}

impl SmaGroup {
    /// Value of the `right` field in the login request
    pub fn right(&self) -> &'static str {
        match self {
            SmaGroup::User => "usr",
            SmaGroup::Installer => "istl",
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}

fn default_verify_tls() -> bool {
    true
}

/// Settings for the SMA source
#[derive(Deserialize, Clone)]
pub struct SmaSettings {
    /// Host name, IP address or URL of the WebConnect interface
    pub address: String,
    pub password: String,
    #[serde(default)]
    pub group: SmaGroup,
    /// Verify the inverter's TLS certificate
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl SmaSettings {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            group: SmaGroup::default(),
            verify_tls: default_verify_tls(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl fmt::Debug for SmaSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmaSettings")
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .field("group", &self.group)
            .field("verify_tls", &self.verify_tls)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Base URL for an address; bare hosts get `http://`
pub fn base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Session id from a login response
pub fn parse_login(body: &str) -> Result<String> {
    let document: Value = serde_json::from_str(body)
        .map_err(|e| AgentError::Setup(format!("login response is not JSON: {}", e)))?;

    if let Some(err) = document.get("err") {
        return Err(AgentError::Setup(format!("login rejected with error {}", err)));
    }

    document
        .pointer("/result/sid")
        .and_then(Value::as_str)
        .filter(|sid| !sid.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AgentError::Setup("login response has no session id".to_string()))
}

/// Error code in a response body, if the device sent one
pub fn device_error(body: &str) -> Option<Value> {
    serde_json::from_str::<Value>(body).ok()?.get("err").cloned()
}

/// Read `keys` from a `getValues` response.
///
/// The response is keyed by device serial, then register, then channel:
/// `{"result": {"<serial>": {"<key>": {"1": [{"val": 123}]}}}}`. The first
/// device and the first value of the first channel are used.
pub fn extract_values(body: &str, keys: &[String]) -> Result<Reading> {
    let document: Value = serde_json::from_str(body)
        .map_err(|e| AgentError::Malformed(format!("values response is not JSON: {}", e)))?;

    if let Some(err) = document.get("err") {
        return Err(AgentError::Malformed(format!("device reported error {}", err)));
    }

    let device = document
        .get("result")
        .and_then(Value::as_object)
        .and_then(|devices| devices.values().next())
        .and_then(Value::as_object)
        .ok_or_else(|| AgentError::Malformed("values response has no device".to_string()))?;

    Ok(keys
        .iter()
        .map(|key| {
            let raw = device.get(key).and_then(first_channel_value);
            if raw.is_none() {
                debug!("Device reported no value for {}", key);
            }
            raw.map(|v| v / scale_of(key))
        })
        .collect())
}

fn first_channel_value(register: &Value) -> Option<f64> {
    let channel = match register {
        Value::Object(channels) => channels.values().next()?,
        other => other,
    };
    let entry = match channel {
        Value::Array(entries) => entries.first()?,
        other => other,
    };
    entry.get("val").and_then(json_number)
}

/// Polls an SMA inverter through a WebConnect session
pub struct SmaSource {
    client: Client,
    base_url: String,
    group: SmaGroup,
    password: String,
    sid: Option<String>,
    name: String,
}

impl SmaSource {
    /// Create a new source; no request is made until [`Source::open`]
    pub fn new(settings: &SmaSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()
            .map_err(|e| AgentError::Setup(format!("failed to build HTTP client: {}", e)))?;

        let base_url = base_url(&settings.address);
        Ok(Self {
            client,
            name: format!("sma {}", base_url),
            base_url,
            group: settings.group,
            password: settings.password.clone(),
            sid: None,
        })
    }

    /// Id of the open session, if any
    pub fn session_id(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    async fn login(&mut self) -> Result<()> {
        let body = json!({"right": self.group.right(), "pass": self.password});
        let response = self.post("/dyn/login.json", &body).await?;

        self.sid = Some(parse_login(&response)?);
        info!("Logged in to {} as {:?}", self.name, self.group);
        Ok(())
    }

    async fn post(&self, path: &str, body: &Value) -> Result<String> {
        let mut request = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(sid) = &self.sid {
            request = request.query(&[("sid", sid)]);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| classify_request_error(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Malformed(format!("{}{} returned {}", self.base_url, path, status)));
        }

        response
            .text()
            .await
            .map_err(|e| classify_request_error(&self.name, e))
    }
}

#[async_trait::async_trait]
impl Source for SmaSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self) -> Result<()> {
        self.login().await.map_err(|e| match e {
            AgentError::Setup(msg) => AgentError::Setup(msg),
            other => AgentError::Setup(format!("login to {} failed: {}", self.name, other)),
        })
    }

    async fn fetch(&mut self, keys: &[String]) -> Result<Reading> {
        if self.sid.is_none() {
            // a rejected login here only costs this tick
            self.login().await.map_err(|e| match e {
                AgentError::Setup(msg) => AgentError::Malformed(msg),
                other => other,
            })?;
        }

        let body = json!({"destDev": [], "keys": keys});
        let response = self.post("/dyn/getValues.json", &body).await?;
        if let Some(code) = device_error(&response) {
            warn!("{} rejected the poll with error {}, dropping the session", self.name, code);
            self.sid = None;
            return Err(AgentError::Malformed(format!("device reported error {}", code)));
        }
        extract_values(&response, keys)
    }

    async fn close(&mut self) -> Result<()> {
        if self.sid.is_none() {
            return Ok(());
        }

        let result = self.post("/dyn/logout.json", &json!({})).await;
        self.sid = None;
        result?;
        info!("Logged out of {}", self.name);
        Ok(())
    }
}
