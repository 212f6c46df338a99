//! Metric tables and readings
use serde::Deserialize;
use std::fmt;

use crate::error::{AgentError, Result};

const HOST_PLACEHOLDER: &str = "{host}";
const PLUGIN_PLACEHOLDER: &str = "{plugin}";

/// Maps one field of a fetched reading to an output metric name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    name_template: String,
    source_key: String,
}

impl MetricDescriptor {
    /// Create a descriptor; `name_template` may contain `{host}` and `{plugin}`
    pub fn new(name_template: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            name_template: name_template.into(),
            source_key: source_key.into(),
        }
    }

    pub fn name_template(&self) -> &str {
        &self.name_template
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    /// Whether the template needs a plugin identifier
    pub fn uses_plugin(&self) -> bool {
        self.name_template.contains(PLUGIN_PLACEHOLDER)
    }

    /// Fill in the template
    pub fn render_name(&self, host: &str, plugin: Option<&str>) -> String {
        let name = self.name_template.replace(HOST_PLACEHOLDER, host);
        match plugin {
            Some(plugin) => name.replace(PLUGIN_PLACEHOLDER, plugin),
            None => name,
        }
    }
}

/// The ordered, fixed set of metrics an agent reports
#[derive(Debug, Clone)]
pub struct MetricTable {
    descriptors: Vec<MetricDescriptor>,
}

impl MetricTable {
    /// Create a table; order is the emission order
    pub fn new(descriptors: Vec<MetricDescriptor>) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(AgentError::Config("metric table must not be empty".to_string()));
        }
        Ok(Self { descriptors })
    }

    /// Check that every template can be rendered with the given plugin
    pub fn validate(&self, plugin: Option<&str>) -> Result<()> {
        if plugin.is_none() {
            if let Some(d) = self.descriptors.iter().find(|d| d.uses_plugin()) {
                return Err(AgentError::Config(format!(
                    "metric {} needs a plugin identifier but none is configured",
                    d.name_template
                )));
            }
        }
        Ok(())
    }

    /// Source keys in declaration order
    pub fn keys(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.source_key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.descriptors.iter()
    }
}

/// Values produced by a single fetch, one slot per descriptor
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reading {
    values: Vec<Option<f64>>,
}

impl Reading {
    /// Create a reading; non-finite values count as absent
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|v| v.filter(|v| v.is_finite()))
                .collect(),
        }
    }

    /// A reading with every slot absent
    pub fn absent(len: usize) -> Self {
        Self { values: vec![None; len] }
    }

    /// Value at `index`; slots past the end are absent
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_all_absent(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

impl FromIterator<Option<f64>> for Reading {
    fn from_iter<I: IntoIterator<Item = Option<f64>>>(iter: I) -> Self {
        Reading::new(iter.into_iter().collect())
    }
}

/// How an absent value is written out
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AbsentValue {
    /// Write `0`
    #[default]
    Zero,
    /// Write collectd's unknown marker `U`
    Unknown,
}

/// A value as it appears in a `PUTVAL` line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PutvalValue {
    Number(f64),
    Unknown,
}

impl PutvalValue {
    pub fn from_reading(value: Option<f64>, absent: AbsentValue) -> Self {
        match (value, absent) {
            (Some(v), _) => PutvalValue::Number(v),
            (None, AbsentValue::Zero) => PutvalValue::Number(0.0),
            (None, AbsentValue::Unknown) => PutvalValue::Unknown,
        }
    }
}

impl fmt::Display for PutvalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutvalValue::Number(v) => write!(f, "{}", v),
            PutvalValue::Unknown => f.write_str("U"),
        }
    }
}
