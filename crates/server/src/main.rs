mod bootstrap;
mod health;
mod service;

use std::time::Duration;

use anyhow::Result;
use metabot_core::config::{AppConfig, LoadOptions};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use metabot_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    // A failed warm-up is not fatal: the first lookup retries the exchange.
    if let Err(error) = app.adapter.credentials().access_token().await {
        warn!(
            event_name = "system.server.credential_warmup_failed",
            correlation_id = "bootstrap",
            error = %error,
            "catalog credential warm-up failed"
        );
    }

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState::new(app.adapter.clone()),
    )
    .await?;

    let runner = app.slack_runner;
    let mut runner_task = tokio::spawn(async move { runner.start().await });

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        model = %app.config.llm.model,
        hard_round_limit = app.agent_runtime.settings().limits.hard,
        "metabot-server started"
    );
    wait_for_shutdown().await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "metabot-server stopping"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, &mut runner_task).await.is_err() {
        warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "in-flight answers did not finish in time; aborting"
        );
        runner_task.abort();
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
