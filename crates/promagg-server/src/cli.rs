//! Command-line argument parsing with clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::{
    AggregatorConfig, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_LINE_LENGTH, DEFAULT_SCRAPE_ADDR,
    ListenAddr, ScrapeAddr,
};

/// Aggregate metric writes from short-lived processes into one Prometheus
/// scrape target.
#[derive(Parser, Debug, Clone)]
#[command(name = "prometheus-aggregator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Listen for metric writes (tcp, tcp4, tcp6, unix, unixpacket, udp,
    /// udp4, udp6 or unixgram URI). Repeatable.
    #[arg(
        long = "in",
        value_name = "URI",
        env = "PROMAGG_IN",
        value_delimiter = ',',
        default_value = DEFAULT_LISTEN_ADDR
    )]
    pub listeners: Vec<ListenAddr>,

    /// Listen for Prometheus scrapes; the URI path is the scrape path.
    #[arg(long = "out", value_name = "URI", env = "PROMAGG_OUT", default_value = DEFAULT_SCRAPE_ADDR)]
    pub scrape: ScrapeAddr,

    /// File containing JSON metric declarations.
    #[arg(long, value_name = "PATH")]
    pub declfile: Option<PathBuf>,

    /// Print an example declfile to stdout and exit.
    #[arg(long)]
    pub example: bool,

    /// Log debug information.
    #[arg(long)]
    pub debug: bool,

    /// Disconnect clients when they send bad data.
    #[arg(long)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Longest accepted line in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,

    /// Time in-flight scrapes get to finish at shutdown.
    #[arg(long, value_name = "MILLIS", default_value_t = 1000)]
    pub shutdown_grace: u64,
}

/// Log output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl Cli {
    /// Returns the default log filter directive.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }

    /// Builds the aggregator configuration from the arguments.
    #[must_use]
    pub fn into_config(self) -> AggregatorConfig {
        let config = AggregatorConfig::new()
            .with_listeners(self.listeners)
            .with_scrape(self.scrape)
            .with_strict(self.strict)
            .with_max_line_length(self.max_line_length)
            .with_shutdown_grace(Duration::from_millis(self.shutdown_grace));
        match self.declfile {
            Some(path) => config.with_declfile(path),
            None => config,
        }
    }
}
