//! The registry of every metric family.
//!
//! [`Universe`] is the only shared mutable state of the aggregator. One
//! coarse lock guards the whole family map: writers hold it while locating
//! and mutating a series, scrapes hold it only while rendering into a
//! buffer. No caller ever holds it across I/O.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::collection::TimeseriesCollection;
use crate::error::{LineError, Result};
use crate::parse::parse_line;
use crate::types::Observation;

/// Thread-safe registry of metric families keyed by name.
#[derive(Debug, Default)]
pub struct Universe {
    families: Mutex<BTreeMap<String, TimeseriesCollection>>,
}

impl Universe {
    /// Creates an empty universe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a universe pre-populated with declarations, applied in order.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`Universe::observe`].
    pub fn with_declarations<I>(initial: I) -> Result<Self>
    where
        I: IntoIterator<Item = Observation>,
    {
        let universe = Self::new();
        for obs in initial {
            universe.observe(&obs)?;
        }
        Ok(universe)
    }

    /// Applies an observation, creating its family and series as needed.
    ///
    /// A rejected observation leaves the universe exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns any validation error of [`TimeseriesCollection::new`] or
    /// [`TimeseriesCollection::observe`].
    #[allow(clippy::significant_drop_tightening)] // Lock spans locate, create and mutate
    pub fn observe(&self, obs: &Observation) -> Result<()> {
        let mut families = self.families.lock();

        if let Some(family) = families.get_mut(&obs.name) {
            return family.observe(obs);
        }

        let mut family = TimeseriesCollection::new(obs)?;
        family.observe(obs)?;
        debug!(metric = %obs.name, kind = %family.kind(), "declared metric family");
        families.insert(obs.name.clone(), family);
        Ok(())
    }

    /// Parses one raw line and applies it. Returns the metric name on success.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::Parse`] or [`LineError::Observe`] depending on
    /// which stage rejected the line.
    pub fn ingest(&self, line: &[u8]) -> std::result::Result<String, LineError> {
        let obs = parse_line(line)?;
        self.observe(&obs)?;
        Ok(obs.name)
    }

    /// Renders every touched family as a Prometheus text document.
    ///
    /// Families are sorted by name and series by key, so consecutive scrapes
    /// without writes in between are byte-identical.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let families = self.families.lock();
        for family in families.values() {
            family.render_text(&mut out);
        }
        out
    }

    /// Returns the declaration of every known family, sorted by name.
    #[must_use]
    pub fn declarations(&self) -> Vec<Observation> {
        self.families
            .lock()
            .values()
            .map(TimeseriesCollection::declaration)
            .collect()
    }

    /// Returns the number of families, declared or active.
    #[must_use]
    pub fn family_count(&self) -> usize {
        self.families.lock().len()
    }

    /// Returns the number of series across all families.
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.families
            .lock()
            .values()
            .map(TimeseriesCollection::len)
            .sum()
    }
}
