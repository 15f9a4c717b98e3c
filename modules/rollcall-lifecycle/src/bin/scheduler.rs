use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rollcall_common::{Config, NotifyBackend, SystemClock};
use rollcall_lifecycle::notify::{NoopBackend, WebhookBackend};
use rollcall_lifecycle::LifecycleScheduler;
use rollcall_store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rollcall=info".parse()?))
        .init();

    info!("Rollcall lifecycle scheduler starting...");

    // Load config
    let config = Config::from_env();
    config.log_redacted();

    // Connect to Postgres and run migrations (idempotent)
    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;

    // Build notification backend: webhook if configured, otherwise Noop
    let notifier: Arc<dyn NotifyBackend> = match config.notify_webhook_url.clone() {
        Some(url) => {
            info!("Webhook notifications enabled");
            Arc::new(WebhookBackend::new(url))
        }
        None => {
            info!("No NOTIFY_WEBHOOK_URL set, notifications disabled");
            Arc::new(NoopBackend)
        }
    };

    let scheduler = Arc::new(LifecycleScheduler::new(
        Arc::new(store),
        notifier,
        Arc::new(SystemClock),
        Duration::from_secs(config.scheduler_interval_secs),
    ));

    let handle = scheduler.start();
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    handle.stop().await;

    Ok(())
}
