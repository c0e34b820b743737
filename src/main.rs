use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use volscan::VolscanError;
use volscan::config::{DataSource, ScreenerConfig, fetch_config};
use volscan::gateway::{FixtureGateway, MarketDataGateway, YahooGateway};
use volscan::registry::WatchList;
use volscan::report::follow_snapshots;
use volscan::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<(), VolscanError> {
    // RUST_LOG overrides the default filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("volscan=info")),
        )
        .init();

    let app_config = fetch_config()?;
    let screener = app_config.screener;

    match app_config.source {
        DataSource::Yahoo { base_url } => {
            info!(%base_url, "Using Yahoo Finance market data");
            let gateway = YahooGateway::new(
                base_url,
                screener.fallback_risk_free_rate,
                screener.fetch_timeout(),
            )?
            .with_min_days_to_expiry(screener.min_days_to_expiry);
            run(gateway, &screener).await
        }
        DataSource::Fixture { path } => {
            info!(path = %path.display(), "Using fixture market data");
            let gateway = FixtureGateway::load(&path, screener.fallback_risk_free_rate)?;
            run(gateway, &screener).await
        }
    }
}

async fn run<G: MarketDataGateway + 'static>(
    gateway: G,
    config: &ScreenerConfig,
) -> Result<(), VolscanError> {
    let registry = Arc::new(WatchList::new(
        config.indicator_settings().lookback(),
        config.iv_trailing_window.unwrap_or(0).max(1),
    ));
    for symbol in config.symbols() {
        registry.add(&symbol);
    }

    let scheduler = Scheduler::new(Arc::new(gateway), registry, config);
    let shutdown = scheduler.shutdown_handle();
    let reporter = tokio::spawn(follow_snapshots(scheduler.subscribe_snapshots()));
    let runner = tokio::spawn(scheduler.run());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| VolscanError::Io(format!("failed to listen for ctrl-c: {e}")))?;
    info!("Shutdown requested, finishing in-flight symbols");
    shutdown.request();

    // The scheduler owns the snapshot sender, so the reporter finishes once
    // it has logged the final cycle.
    let cycles = runner
        .await
        .map_err(|e| VolscanError::Io(format!("scheduler task failed: {e}")))?;
    let reported = reporter
        .await
        .map_err(|e| VolscanError::Io(format!("reporter task failed: {e}")))?;
    info!(cycles, reported, "Exiting");

    Ok(())
}
