//! Accumulated state of a single labeled series.
//!
//! [`TimeseriesValue`] is a closed enum over the three supported metric
//! kinds; [`Timeseries`] pairs it with the series labels. None of these
//! types synchronise on their own: the [`Universe`](crate::Universe) lock
//! guards every access.

use crate::exposition::{format_bound, format_value, write_labels};
use crate::types::{GaugeOp, Labels, MetricKind, Observation};

/// Additive accumulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counter {
    value: f64,
    touched: bool,
}

impl Counter {
    /// Returns the accumulated total.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    fn observe(&mut self, value: f64) {
        self.value += value;
        self.touched = true;
    }
}

/// Accumulator supporting set and add.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gauge {
    value: f64,
    touched: bool,
}

impl Gauge {
    /// Returns the current value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    fn observe(&mut self, op: GaugeOp, value: f64) {
        match op {
            GaugeOp::Add => self.value += value,
            GaugeOp::Set => self.value = value,
        }
        self.touched = true;
    }
}

/// One histogram bucket: observations less than or equal to `upper_bound`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// Inclusive upper bound.
    pub upper_bound: f64,
    /// Cumulative number of observations that fit in this bucket.
    pub count: u64,
}

/// Cumulative bucketed distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    sum: f64,
    count: u64,
    buckets: Vec<Bucket>,
}

impl Histogram {
    /// Creates an empty histogram over the given ascending bounds.
    #[must_use]
    pub fn new(bounds: &[f64]) -> Self {
        Self {
            sum: 0.0,
            count: 0,
            buckets: bounds
                .iter()
                .map(|&upper_bound| Bucket {
                    upper_bound,
                    count: 0,
                })
                .collect(),
        }
    }

    /// Returns the sum of all observed values.
    #[must_use]
    pub const fn sum(&self) -> f64 {
        self.sum
    }

    /// Returns the number of observations, which is also the `+Inf` bucket.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Returns the declared buckets in ascending order.
    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        // Cumulative: a value lands in every bucket it fits in.
        for bucket in &mut self.buckets {
            if value <= bucket.upper_bound {
                bucket.count += 1;
            }
        }
    }
}

/// Accumulated state of one series, one variant per metric kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeseriesValue {
    /// Counter state.
    Counter(Counter),
    /// Gauge state.
    Gauge(Gauge),
    /// Histogram state.
    Histogram(Histogram),
}

impl TimeseriesValue {
    /// Creates empty state for a series of the given kind.
    ///
    /// `bounds` is only used by histograms.
    #[must_use]
    pub fn new(kind: MetricKind, bounds: &[f64]) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Counter::default()),
            MetricKind::Gauge => Self::Gauge(Gauge::default()),
            MetricKind::Histogram => Self::Histogram(Histogram::new(bounds)),
        }
    }

    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Histogram(_) => MetricKind::Histogram,
        }
    }

    /// Applies an observation. Declarations (no value) are a no-op.
    pub fn observe(&mut self, obs: &Observation) {
        let Some(value) = obs.value else {
            return;
        };
        match self {
            Self::Counter(counter) => counter.observe(value),
            Self::Gauge(gauge) => gauge.observe(GaugeOp::from_op(obs.op.as_deref()), value),
            Self::Histogram(histogram) => histogram.observe(value),
        }
    }

    /// Returns true once an observation carrying a value has been applied.
    #[must_use]
    pub const fn touched(&self) -> bool {
        match self {
            Self::Counter(counter) => counter.touched,
            Self::Gauge(gauge) => gauge.touched,
            Self::Histogram(histogram) => histogram.count > 0,
        }
    }

    /// Appends the exposition lines of this value to `out`.
    pub fn render_text(&self, name: &str, labels: &Labels, out: &mut String) {
        match self {
            Self::Counter(Counter { value, .. }) | Self::Gauge(Gauge { value, .. }) => {
                write_sample(out, name, "", labels, None, &format_value(*value));
            }
            Self::Histogram(histogram) => {
                for bucket in &histogram.buckets {
                    let le = format_bound(bucket.upper_bound);
                    write_sample(out, name, "_bucket", labels, Some(&le), &bucket.count.to_string());
                }
                let count = histogram.count.to_string();
                write_sample(out, name, "_bucket", labels, Some("+Inf"), &count);
                write_sample(out, name, "_sum", labels, None, &format_value(histogram.sum));
                write_sample(out, name, "_count", labels, None, &count);
            }
        }
    }
}

fn write_sample(
    out: &mut String,
    name: &str,
    suffix: &str,
    labels: &Labels,
    le: Option<&str>,
    value: &str,
) {
    out.push_str(name);
    out.push_str(suffix);
    write_labels(out, labels, le);
    out.push(' ');
    out.push_str(value);
    out.push('\n');
}

/// A series: its labels and accumulated value.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeseries {
    labels: Labels,
    value: TimeseriesValue,
}

impl Timeseries {
    /// Creates an untouched series.
    #[must_use]
    pub const fn new(labels: Labels, value: TimeseriesValue) -> Self {
        Self { labels, value }
    }

    /// Returns the series labels.
    #[must_use]
    pub const fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Returns the accumulated value.
    #[must_use]
    pub const fn value(&self) -> &TimeseriesValue {
        &self.value
    }

    /// Applies an observation to the value.
    pub fn observe(&mut self, obs: &Observation) {
        self.value.observe(obs);
    }

    /// Returns true once the series has received a value.
    #[must_use]
    pub const fn touched(&self) -> bool {
        self.value.touched()
    }

    /// Appends the exposition lines of this series to `out`.
    pub fn render_text(&self, name: &str, out: &mut String) {
        self.value.render_text(name, &self.labels, out);
    }
}
