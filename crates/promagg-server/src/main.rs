//! prometheus-aggregator binary.
//!
//! Accepts metric writes from short-lived processes and serves the
//! aggregate to Prometheus.

use anyhow::Context;
use clap::Parser;
use promagg_server::cli::{Cli, LogFormat};
use promagg_server::{Aggregator, declfile};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.example {
        println!("{}", declfile::example_json()?);
        return Ok(());
    }

    init_tracing(&cli)?;

    let config = cli.into_config();
    let aggregator = match Aggregator::bind(config).await {
        Ok(aggregator) => aggregator,
        Err(e) => {
            error!(error = %e, "startup failed");
            return Err(e.into());
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    if let Err(e) = aggregator.run(shutdown).await {
        error!(error = %e, "aggregator failed");
        return Err(e.into());
    }
    Ok(())
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::try_from_default_env().context("invalid RUST_LOG")?,
        Err(_) => EnvFilter::new(cli.log_level()),
    };
    let registry = tracing_subscriber::registry().with(filter);

    match cli.log_format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = interrupt => info!(signal = "SIGINT", "received signal"),
        () = terminate => info!(signal = "SIGTERM", "received signal"),
    }
    shutdown.cancel();
}
