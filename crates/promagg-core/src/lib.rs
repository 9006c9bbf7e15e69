//! Aggregation engine for pushed Prometheus observations.
//!
//! `promagg-core` turns a stream of short-lived writer events into a single
//! Prometheus scrape document. Writers push one line per event; the engine
//! accumulates counters, gauges and histograms keyed by name and label set
//! and renders them in the text exposition format on demand.
//!
//! # Features
//!
//! - **Two line encodings**: structured JSON and a compact `name{l="v"} 1` form
//! - **First writer wins**: the first mention of a family fixes its type and help
//! - **Deterministic output**: families and series render in sorted order
//! - **All-or-nothing writes**: a rejected line never mutates the registry
//!
//! # Example
//!
//! ```rust
//! use promagg_core::{MetricKind, Observation, Universe};
//!
//! let universe = Universe::with_declarations([Observation::declare(
//!     "jobs_processed_total",
//!     MetricKind::Counter,
//!     "Total number of jobs processed.",
//! )])
//! .unwrap();
//!
//! universe.ingest(br#"jobs_processed_total{queue="default"} 3"#).unwrap();
//!
//! assert!(universe
//!     .render()
//!     .contains("jobs_processed_total{queue=\"default\"} 3.000000"));
//! ```

#![doc(html_root_url = "https://docs.rs/promagg-core/0.1.0")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod collection;
pub mod error;
pub mod exposition;
pub mod parse;
pub mod timeseries;
pub mod types;
pub mod universe;

// Re-export main types at crate root
pub use collection::TimeseriesCollection;
pub use error::{AggregateError, GrammarError, LineError, ParseError, Result};
pub use exposition::CONTENT_TYPE;
pub use parse::parse_line;
pub use timeseries::{Bucket, Counter, Gauge, Histogram, Timeseries, TimeseriesValue};
pub use types::{GaugeOp, Labels, MetricKind, Observation, TimeseriesKey};
pub use universe::Universe;
