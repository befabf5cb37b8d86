// pushsyncd: webhook listener entry point.

use anyhow::Context;
use pushsync_daemon::config::DaemonConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::from_env().context("invalid pushsync configuration")?;

    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    pushsync_daemon::server::serve(config).await.context("pushsync daemon terminated unexpectedly")
}
