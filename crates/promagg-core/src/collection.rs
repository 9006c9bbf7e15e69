//! A metric family: immutable metadata plus every labeled series under it.

use std::collections::BTreeMap;

use crate::error::{AggregateError, Result};
use crate::exposition::write_header;
use crate::timeseries::{Timeseries, TimeseriesValue};
use crate::types::{MetricKind, Observation, TimeseriesKey};

/// All series of one metric family.
///
/// Kind, help and buckets are fixed by the observation that created the
/// collection. Later observations may carry different metadata; it is
/// ignored so every series in the family stays homogeneous.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesCollection {
    name: String,
    kind: MetricKind,
    help: String,
    buckets: Vec<f64>,
    series: BTreeMap<TimeseriesKey, Timeseries>,
}

impl TimeseriesCollection {
    /// Creates a collection from the first observation of a family.
    ///
    /// Histogram bounds are sorted, de-duplicated and stripped of
    /// non-finite entries; the `+Inf` bucket is always implicit.
    ///
    /// # Errors
    ///
    /// - [`AggregateError::MissingName`] if the name is empty
    /// - [`AggregateError::UnknownFamily`] if the observation carries no
    ///   metadata at all (e.g. a textual line for an undeclared family)
    /// - [`AggregateError::InvalidKind`] for a missing or unsupported type
    /// - [`AggregateError::MissingHelp`] for a missing or empty help string
    pub fn new(obs: &Observation) -> Result<Self> {
        if obs.name.is_empty() {
            return Err(AggregateError::MissingName);
        }

        let kind = match (obs.kind.as_deref(), obs.help.as_deref()) {
            (None, None) => {
                return Err(AggregateError::UnknownFamily {
                    name: obs.name.clone(),
                });
            }
            (kind, _) => {
                let kind = kind.unwrap_or_default();
                MetricKind::from_name(kind).ok_or_else(|| AggregateError::InvalidKind {
                    name: obs.name.clone(),
                    kind: kind.to_string(),
                })?
            }
        };

        let help = match obs.help.as_deref() {
            Some(help) if !help.is_empty() => help.to_string(),
            _ => {
                return Err(AggregateError::MissingHelp {
                    name: obs.name.clone(),
                });
            }
        };

        let buckets = if kind == MetricKind::Histogram {
            normalize_bounds(&obs.buckets)
        } else {
            Vec::new()
        };

        Ok(Self {
            name: obs.name.clone(),
            kind,
            help,
            buckets,
            series: BTreeMap::new(),
        })
    }

    /// Returns the family name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the family kind.
    #[must_use]
    pub const fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Returns the help text.
    #[must_use]
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Returns the histogram bounds (empty for other kinds).
    #[must_use]
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    /// Returns the number of series in the family.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Returns true if the family has no series yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Returns the series for the observation's labels, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::MissingName`] if the name is empty.
    pub fn ensure(&mut self, obs: &Observation) -> Result<&mut Timeseries> {
        if obs.name.is_empty() {
            return Err(AggregateError::MissingName);
        }
        let series = self
            .series
            .entry(obs.timeseries_key())
            .or_insert_with(|| {
                Timeseries::new(
                    obs.labels.clone(),
                    TimeseriesValue::new(self.kind, &self.buckets),
                )
            });
        Ok(series)
    }

    /// Applies an observation to the matching series.
    ///
    /// The observation's type, help and buckets are never consulted (first
    /// writer wins). Declarations only create the series.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::MissingName`] for an empty name.
    pub fn observe(&mut self, obs: &Observation) -> Result<()> {
        self.ensure(obs)?.observe(obs);
        Ok(())
    }

    /// Returns true if any series has received a value.
    #[must_use]
    pub fn touched(&self) -> bool {
        self.series.values().any(Timeseries::touched)
    }

    /// Returns the family metadata as a declaration.
    #[must_use]
    pub fn declaration(&self) -> Observation {
        Observation::declare(self.name.clone(), self.kind, self.help.clone())
            .with_buckets(self.buckets.clone())
    }

    /// Appends the family to a scrape document.
    ///
    /// Nothing is written unless a series is touched; untouched series are
    /// skipped. A rendered family ends with one blank line.
    pub fn render_text(&self, out: &mut String) {
        if !self.touched() {
            return;
        }
        write_header(out, &self.name, &self.help, self.kind.as_str());
        for series in self.series.values().filter(|s| s.touched()) {
            series.render_text(&self.name, out);
        }
        out.push('\n');
    }
}

fn normalize_bounds(bounds: &[f64]) -> Vec<f64> {
    let mut bounds: Vec<f64> = bounds.iter().copied().filter(|b| b.is_finite()).collect();
    bounds.sort_by(f64::total_cmp);
    bounds.dedup();
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GaugeOp;

    fn counter_family() -> TimeseriesCollection {
        TimeseriesCollection::new(&Observation::declare(
            "foo_total",
            MetricKind::Counter,
            "Total foos.",
        ))
        .expect("valid declaration")
    }

    fn render(collection: &TimeseriesCollection) -> String {
        let mut out = String::new();
        collection.render_text(&mut out);
        out
    }

    // ==================== Creation Tests ====================

    #[test]
    fn new_stores_metadata() {
        let family = counter_family();
        assert_eq!(family.name(), "foo_total");
        assert_eq!(family.kind(), MetricKind::Counter);
        assert_eq!(family.help(), "Total foos.");
        assert!(family.is_empty());
    }

    #[test]
    fn new_rejects_invalid_kind() {
        let mut obs = Observation::declare("foo", MetricKind::Counter, "Foo.");
        obs.kind = Some("summary".to_string());
        let err = TimeseriesCollection::new(&obs).unwrap_err();
        assert_eq!(
            err,
            AggregateError::InvalidKind {
                name: "foo".to_string(),
                kind: "summary".to_string(),
            }
        );
    }

    #[test]
    fn new_rejects_missing_kind_with_help() {
        let mut obs = Observation::declare("foo", MetricKind::Counter, "Foo.");
        obs.kind = None;
        assert!(matches!(
            TimeseriesCollection::new(&obs),
            Err(AggregateError::InvalidKind { .. })
        ));
    }

    #[test]
    fn new_rejects_missing_help() {
        let mut obs = Observation::declare("foo", MetricKind::Gauge, "");
        assert!(matches!(
            TimeseriesCollection::new(&obs),
            Err(AggregateError::MissingHelp { .. })
        ));
        obs.help = None;
        assert!(matches!(
            TimeseriesCollection::new(&obs),
            Err(AggregateError::MissingHelp { .. })
        ));
    }

    #[test]
    fn new_rejects_bare_observation() {
        let err = TimeseriesCollection::new(&Observation::new("foo", 1.0)).unwrap_err();
        assert_eq!(
            err,
            AggregateError::UnknownFamily {
                name: "foo".to_string()
            }
        );
    }

    #[test]
    fn new_rejects_missing_name() {
        let obs = Observation::declare("", MetricKind::Counter, "Foo.");
        assert_eq!(
            TimeseriesCollection::new(&obs).unwrap_err(),
            AggregateError::MissingName
        );
    }

    #[test]
    fn new_normalizes_histogram_bounds() {
        let obs = Observation::declare("h", MetricKind::Histogram, "H.")
            .with_buckets([2.0, 0.5, 1.0, 0.5, f64::INFINITY, f64::NAN]);
        let family = TimeseriesCollection::new(&obs).expect("valid declaration");
        assert_eq!(family.buckets(), &[0.5, 1.0, 2.0]);
    }

    #[test]
    fn new_drops_buckets_for_non_histograms() {
        let obs = Observation::declare("g", MetricKind::Gauge, "G.").with_buckets([1.0]);
        let family = TimeseriesCollection::new(&obs).expect("valid declaration");
        assert!(family.buckets().is_empty());
    }

    // ==================== Observe Tests ====================

    #[test]
    fn declaration_creates_untouched_series() {
        let mut family = counter_family();
        family
            .observe(&Observation::declare("foo_total", MetricKind::Counter, "Total foos.").label("code", "200"))
            .expect("declaration applies");

        assert_eq!(family.len(), 1);
        assert!(!family.touched());
        assert_eq!(render(&family), "");
    }

    #[test]
    fn first_writer_wins() {
        let mut family = counter_family();
        let redeclared = Observation::declare("foo_total", MetricKind::Gauge, "Something else.")
            .with_op(GaugeOp::Set)
            .with_value(2.0);
        family.observe(&redeclared).expect("observe");
        family
            .observe(&Observation::new("foo_total", 3.0).with_op(GaugeOp::Set))
            .expect("observe");

        assert_eq!(family.kind(), MetricKind::Counter);
        assert_eq!(family.help(), "Total foos.");
        assert_eq!(
            render(&family),
            "# HELP foo_total Total foos.\n# TYPE foo_total counter\nfoo_total{} 5.000000\n\n"
        );
    }

    #[test]
    fn label_order_resolves_same_series() {
        let mut family = counter_family();
        family
            .observe(&Observation::new("foo_total", 1.0).label("code", "200").label("region", "us"))
            .expect("observe");
        family
            .observe(&Observation::new("foo_total", 1.0).label("region", "us").label("code", "200"))
            .expect("observe");

        assert_eq!(family.len(), 1);
    }

    #[test]
    fn ensure_returns_existing_series() {
        let mut family = counter_family();
        family
            .observe(&Observation::new("foo_total", 2.0).label("a", "1"))
            .expect("observe");

        let series = family
            .ensure(&Observation::new("foo_total", 9.0).label("a", "1"))
            .expect("ensure");
        assert!(series.touched());
        assert_eq!(family.len(), 1);
    }

    #[test]
    fn negative_counter_value_is_added() {
        let mut family = counter_family();
        family
            .observe(&Observation::new("foo_total", 5.0).label("a", "1"))
            .expect("observe");
        family
            .observe(&Observation::new("foo_total", -2.0).label("a", "1"))
            .expect("observe");

        assert!(render(&family).contains("foo_total{a=\"1\"} 3.000000\n"));
    }

    // ==================== Render Tests ====================

    #[test]
    fn render_skips_untouched_series() {
        let mut family = counter_family();
        family
            .observe(&Observation::declare("foo_total", MetricKind::Counter, "x").label("code", "500"))
            .expect("declaration applies");
        family
            .observe(&Observation::new("foo_total", 1.0).label("code", "200"))
            .expect("observe");

        assert_eq!(
            render(&family),
            concat!(
                "# HELP foo_total Total foos.\n",
                "# TYPE foo_total counter\n",
                "foo_total{code=\"200\"} 1.000000\n",
                "\n",
            )
        );
    }

    #[test]
    fn declaration_round_trips_metadata() {
        let obs = Observation::declare("h", MetricKind::Histogram, "H.").with_buckets([1.0, 5.0]);
        let family = TimeseriesCollection::new(&obs).expect("valid declaration");
        assert_eq!(family.declaration(), obs);
    }
}
