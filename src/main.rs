//! submit-queue daemon entry point

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use submit_queue::config::Config;
use submit_queue::error::Result;
use submit_queue::queue::Runner;
use submit_queue::review::{GerritService, ReviewService};
use submit_queue::trigger::Trigger;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let mut service = GerritService::new(config.gerrit())?;
    // eager refresh: authentication and configuration mistakes should fail
    // the process at startup, not once per interval
    service.refresh().await?;
    info!(url = %config.url, head = %service.head(), "connected to gerrit");

    let runner = Arc::new(Runner::new(Box::new(service)));
    let trigger = Trigger::new(Duration::from_secs(config.trigger_interval), config.fetch_only);
    let cancel = trigger.cancel_token();
    let trigger_task = tokio::spawn(trigger.run(Arc::clone(&runner)));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();
    let _ = trigger_task.await;

    Ok(())
}
