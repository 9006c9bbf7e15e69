//! Core types for the aggregation engine.
//!
//! - [`Observation`]: one input event, either a declaration or an observation
//! - [`MetricKind`]: the closed set of supported metric types
//! - [`GaugeOp`]: how a gauge applies a value
//! - [`TimeseriesKey`]: canonical identity of one labeled series

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exposition::write_labels;

/// Label name to label value. Ordered so serialization is canonical.
pub type Labels = BTreeMap<String, String>;

/// A single input event received from a writer.
///
/// An observation without a `value` is a *declaration*: it establishes (or
/// confirms) the family metadata and never touches an accumulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Metric family name, e.g. `http_requests_total`.
    #[serde(default)]
    pub name: String,
    /// Metric type; only read on the first mention of a family.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Help text; only read on the first mention of a family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Histogram upper bounds; only read on the first mention of a family.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<f64>,
    /// Series labels. `keys` is accepted for clients that use that name.
    #[serde(default, alias = "keys", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Gauge modifier, `add` or `set`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// The observed value. Absent for declarations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Observation {
    /// Creates an observation of `value` for the named family.
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            ..Self::default()
        }
    }

    /// Creates a declaration of a family.
    #[must_use]
    pub fn declare(name: impl Into<String>, kind: MetricKind, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind.as_str().to_string()),
            help: Some(help.into()),
            ..Self::default()
        }
    }

    /// Sets the histogram bucket bounds and returns self for chaining.
    #[must_use]
    pub fn with_buckets(mut self, buckets: impl Into<Vec<f64>>) -> Self {
        self.buckets = buckets.into();
        self
    }

    /// Sets the gauge operation and returns self for chaining.
    #[must_use]
    pub fn with_op(mut self, op: GaugeOp) -> Self {
        self.op = Some(op.as_str().to_string());
        self
    }

    /// Sets the observed value and returns self for chaining.
    #[must_use]
    pub const fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Adds a label and returns self for chaining.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Returns true if this is a declaration (no value).
    #[must_use]
    pub const fn is_declaration(&self) -> bool {
        self.value.is_none()
    }

    /// Returns the key of the series this observation targets.
    #[must_use]
    pub fn timeseries_key(&self) -> TimeseriesKey {
        TimeseriesKey::new(&self.name, &self.labels)
    }
}

/// The supported metric types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Additive accumulator.
    Counter,
    /// Accumulator that can be set or adjusted.
    Gauge,
    /// Cumulative bucketed distribution with sum and count.
    Histogram,
}

impl MetricKind {
    /// Parses a wire type name. Returns `None` for anything unsupported.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            "histogram" => Some(Self::Histogram),
            _ => None,
        }
    }

    /// Returns the wire/exposition name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a gauge applies an observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GaugeOp {
    /// Replace the current value.
    #[default]
    Set,
    /// Add to the current value.
    Add,
}

impl GaugeOp {
    /// Interprets the wire `op` field. Anything but `add` means set.
    #[must_use]
    pub fn from_op(op: Option<&str>) -> Self {
        match op {
            Some("add") => Self::Add,
            _ => Self::Set,
        }
    }

    /// Returns the wire name of this operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Add => "add",
        }
    }
}

/// Canonical identity of one series, e.g. `http_requests_total{code="200",method="GET"}`.
///
/// Label names are sorted, so the key does not depend on the order in which
/// a writer listed the labels.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeseriesKey(String);

impl TimeseriesKey {
    /// Builds the key for a metric name and label set.
    #[must_use]
    pub fn new(name: &str, labels: &Labels) -> Self {
        let mut key = String::with_capacity(name.len() + 2 + labels.len() * 16);
        key.push_str(name);
        write_labels(&mut key, labels, None);
        Self(key)
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimeseriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
