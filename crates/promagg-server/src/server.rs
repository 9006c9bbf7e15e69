//! The aggregator: a universe plus every listener that feeds or scrapes it.

use std::sync::Arc;

use promagg_core::Universe;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{AggregatorConfig, ListenAddr};
use crate::declfile;
use crate::error::{ServerError, ServerResult};
use crate::http;
use crate::ingest::LineHandler;
use crate::transport::{self, BoundListener};

/// A configured aggregator with all sockets bound.
///
/// Binding happens in [`Aggregator::bind`] so startup errors surface before
/// anything is served.
#[derive(Debug)]
pub struct Aggregator {
    config: AggregatorConfig,
    universe: Arc<Universe>,
    listeners: Vec<(ListenAddr, BoundListener)>,
    scrape: BoundListener,
}

impl Aggregator {
    /// Validates the configuration, loads initial declarations and binds
    /// every socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the declfile cannot
    /// be loaded, a declaration is rejected, or a socket cannot be bound.
    pub async fn bind(config: AggregatorConfig) -> ServerResult<Self> {
        config.validate()?;

        let initial = match &config.declfile {
            Some(path) => declfile::load(path)?,
            None => Vec::new(),
        };
        let declared = initial.len();
        let universe = Arc::new(Universe::with_declarations(initial)?);
        if declared > 0 {
            info!(declarations = declared, families = universe.family_count(), "loaded declarations");
        }

        Self::bind_with_universe(config, universe).await
    }

    /// Binds every socket around an existing universe, skipping the declfile.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a socket cannot
    /// be bound.
    pub async fn bind_with_universe(
        config: AggregatorConfig,
        universe: Arc<Universe>,
    ) -> ServerResult<Self> {
        config.validate()?;

        let mut listeners = Vec::with_capacity(config.listeners.len());
        for addr in &config.listeners {
            let bound = transport::bind(addr).await?;
            listeners.push((addr.clone(), bound));
        }
        let scrape = transport::bind(config.scrape.listen()).await?;

        Ok(Self {
            config,
            universe,
            listeners,
            scrape,
        })
    }

    /// Returns the shared universe.
    #[must_use]
    pub const fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    /// Returns the printable local address of each write listener, in
    /// configuration order.
    #[must_use]
    pub fn listener_addrs(&self) -> Vec<String> {
        self.listeners.iter().map(|(_, l)| l.local_addr()).collect()
    }

    /// Returns the bound write listeners.
    #[must_use]
    pub fn listeners(&self) -> impl Iterator<Item = &BoundListener> {
        self.listeners.iter().map(|(_, l)| l)
    }

    /// Returns the bound scrape listener.
    #[must_use]
    pub const fn scrape_listener(&self) -> &BoundListener {
        &self.scrape
    }

    /// Serves until `shutdown` is cancelled or a listener fails.
    ///
    /// On shutdown the write listeners stop accepting at once; the HTTP
    /// server gets the configured grace period to finish in-flight requests
    /// and is then dropped.
    ///
    /// # Errors
    ///
    /// Returns the first listener or HTTP server failure.
    pub async fn run(self, shutdown: CancellationToken) -> ServerResult<()> {
        let handler = LineHandler::new(Arc::clone(&self.universe))
            .with_strict(self.config.strict)
            .with_max_line_length(self.config.max_line_length);

        let mut listeners = JoinSet::new();
        for (addr, bound) in self.listeners {
            listeners.spawn(transport::serve(addr, bound, handler.clone(), shutdown.clone()));
        }

        let router = http::create_router(handler, self.config.scrape.path());
        let mut http = tokio::spawn(http::serve(self.scrape, router, shutdown.clone()));
        info!(scrape = %self.config.scrape, path = self.config.scrape.path(), "aggregator running");

        let mut http_done = false;
        let result = tokio::select! {
            () = shutdown.cancelled() => {
                info!("shutdown requested");
                Ok(())
            }
            Some(joined) = listeners.join_next() => flatten(joined),
            joined = &mut http => {
                http_done = true;
                flatten(joined)
            }
        };
        if let Err(e) = &result {
            error!(error = %e, "listener failed, shutting down");
        }
        shutdown.cancel();

        while let Some(joined) = listeners.join_next().await {
            if let Err(e) = flatten(joined) {
                warn!(error = %e, "write listener ended with error");
            }
        }

        if !http_done {
            match tokio::time::timeout(self.config.shutdown_grace, &mut http).await {
                Ok(joined) => {
                    if let Err(e) = flatten(joined) {
                        warn!(error = %e, "scrape listener ended with error");
                    }
                }
                Err(_) => {
                    warn!(
                        grace_ms = self.config.shutdown_grace.as_millis(),
                        "grace period elapsed, dropping in-flight scrapes"
                    );
                    http.abort();
                }
            }
        }

        info!("aggregator stopped");
        result
    }
}

fn flatten(joined: Result<ServerResult<()>, JoinError>) -> ServerResult<()> {
    joined.map_err(|e| ServerError::Internal(format!("listener task failed: {e}")))?
}
