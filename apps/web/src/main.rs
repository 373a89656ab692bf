//! cqlscope-web - browser front-end for paged CQL queries.

use anyhow::Context;
use clap::Parser;
use cqlscope_core::{ClientConfig, logging};
use cqlscope_drivers::{DriverType, connector_for};
use cqlscope_web::{AppState, app};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{Level, debug, info};

#[derive(Parser, Debug)]
#[command(
    name = "cqlscope-web",
    author,
    version,
    about = "Browser front-end for paged CQL queries"
)]
struct Args {
    /// Address to listen on [default: 127.0.0.1:8383]
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Driver (scylla, fixture)
    #[arg(long)]
    driver: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ClientConfig::discover_and_load();
    if let Some(path) = &args.config {
        config.merge(&ClientConfig::load_from_file(path)?);
    }
    if let Some(driver) = &args.driver {
        config.connection.driver = Some(driver.clone());
    }
    if let Some(level) = &args.log_level {
        config.log_level = Some(level.clone());
    }

    let level = if args.debug {
        Level::DEBUG
    } else {
        logging::parse_level(config.log_level.as_deref().unwrap_or("info"))
    };
    logging::init(level)?;

    let driver: DriverType = config.driver().parse().map_err(anyhow::Error::msg)?;
    let addr = match args.bind {
        Some(addr) => addr,
        None => config.web_address()?,
    };

    let idle_timeout = config.idle_timeout();
    let state =
        AppState::new(config, connector_for(driver)).context("Failed to compile templates")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, driver = %driver, "cqlscope-web listening");

    let sweeper = tokio::spawn(sweep_idle_sessions(state.clone(), idle_timeout));

    axum::serve(listener, app(state.clone()))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("Shutting down, closing sessions");
    sweeper.abort();
    state.shutdown().await;
    Ok(())
}

/// Closes sessions left unused for `idle_timeout`, checking a few times per period.
async fn sweep_idle_sessions(state: AppState, idle_timeout: Duration) {
    let mut ticks = tokio::time::interval((idle_timeout / 4).max(Duration::from_secs(1)));
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        let swept = state.sweep_idle(idle_timeout).await;
        if swept > 0 {
            debug!(swept, "Swept idle sessions");
        }
    }
}
