//! Initial declaration files.
//!
//! A declfile is a JSON array of declarations, the same objects writers
//! send on the wire minus the value:
//!
//! ```json
//! [
//!     {"name": "jobs_total", "type": "counter", "help": "Jobs run."}
//! ]
//! ```

use std::path::Path;

use promagg_core::{MetricKind, Observation};

use crate::error::{ServerError, ServerResult};

/// Default Prometheus histogram buckets.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Reads a declfile.
///
/// # Errors
///
/// Returns [`ServerError::DeclfileRead`] if the file cannot be read and
/// [`ServerError::DeclfileParse`] if it is not a JSON array of declarations.
pub fn load(path: &Path) -> ServerResult<Vec<Observation>> {
    let buf = std::fs::read(path).map_err(|source| ServerError::DeclfileRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&buf).map_err(|source| ServerError::DeclfileParse {
        path: path.to_path_buf(),
        source,
    })
}

/// One declaration of each metric kind, printed by `--example`.
#[must_use]
pub fn example_declarations() -> Vec<Observation> {
    vec![
        Observation::declare(
            "myservice_jobs_processed_total",
            MetricKind::Counter,
            "Total number of jobs processed.",
        ),
        Observation::declare(
            "myservice_cache_size_bytes",
            MetricKind::Gauge,
            "Current size of cache in bytes.",
        ),
        Observation::declare(
            "myservice_http_request_duration_seconds",
            MetricKind::Histogram,
            "HTTP request duration in seconds.",
        )
        .with_buckets(DEFAULT_BUCKETS),
    ]
}

/// Renders the example declarations as an indented JSON document.
///
/// # Errors
///
/// Returns an error only if serialization fails.
pub fn example_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&example_declarations())
}
