//! Source adapters, one per agent
//!
//! Each adapter documents which of its failures are soft (the tick reports
//! absent values) and which stop the agent.

#[cfg(feature = "bom")]
pub mod bom;
#[cfg(feature = "digitemp")]
pub mod digitemp;
#[cfg(feature = "sma")]
pub mod sma;

#[cfg(any(feature = "bom", feature = "sma"))]
use crate::error::AgentError;

/// Sort a failed HTTP exchange into the agent's error taxonomy
#[cfg(any(feature = "bom", feature = "sma"))]
pub(crate) fn classify_request_error(source: &str, err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::Timeout(format!("{}: request timed out: {}", source, err))
    } else if err.is_decode() {
        AgentError::Malformed(format!("{}: undecodable response: {}", source, err))
    } else {
        AgentError::Connection(format!("{}: {}", source, err))
    }
}

/// Read a JSON scalar as a number; numeric strings are accepted
#[cfg(any(feature = "bom", feature = "sma"))]
pub(crate) fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
