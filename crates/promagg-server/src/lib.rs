//! # promagg-server
//!
//! Network front end of the Prometheus aggregator.
//!
//! Short-lived processes push metric lines to one or more write listeners;
//! Prometheus scrapes the aggregated result over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  tcp / unix / udp   ┌─────────────────────┐
//! │    writer    │────────────────────►│  transport::serve   │──┐
//! └──────────────┘   one line each     └─────────────────────┘  │
//!                                                               ▼
//! ┌──────────────┐  POST <path>        ┌─────────────────────┐  ┌──────────┐
//! │    writer    │────────────────────►│                     │─►│ Universe │
//! └──────────────┘                     │    http router      │  └──────────┘
//! ┌──────────────┐  GET <path>         │                     │◄──────┘
//! │  Prometheus  │◄───────────────────►│                     │
//! └──────────────┘                     └─────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use promagg_server::{Aggregator, AggregatorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AggregatorConfig::new()
//!         .with_listeners(vec!["udp://127.0.0.1:8192".parse().unwrap()])
//!         .with_strict(true);
//!
//!     let aggregator = Aggregator::bind(config).await.unwrap();
//!     aggregator.run(CancellationToken::new()).await.unwrap();
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod declfile;
pub mod error;
pub mod http;
pub mod ingest;
pub mod server;
pub mod transport;

// Re-export main types
pub use config::{
    AggregatorConfig, DECLARATIONS_PATH, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_LINE_LENGTH,
    DEFAULT_SCRAPE_ADDR, DEFAULT_SCRAPE_PATH, DEFAULT_SHUTDOWN_GRACE, Endpoint, ListenAddr,
    ScrapeAddr, Scheme,
};
pub use error::{ServerError, ServerResult};
pub use http::create_router;
pub use ingest::{LineHandler, LineOutcome};
pub use server::Aggregator;
pub use transport::{BoundListener, SocketFile};
