use std::sync::Arc;
use std::time::Duration;

use metabot_agent::{
    AgentRuntime, AnthropicClient, GuardrailPolicy, LlmError, RuntimeSettings, ToolError,
    ToolRegistry,
};
use metabot_catalog::{
    CatalogClient, CatalogError, CredentialManager, CredentialSettings, HttpCatalogTransport,
    MetadataAdapter, TtlCache,
};
use metabot_core::config::{AppConfig, ConfigError, LoadOptions};
use metabot_core::{RetryPolicy, SystemClock};
use metabot_slack::events::question_dispatcher;
use metabot_slack::platform::NoopChatPlatform;
use metabot_slack::socket::{NoopSocketTransport, ReconnectPolicy, SocketModeRunner};
use thiserror::Error;
use tracing::info;

use crate::service::AgentQuestionService;

pub struct Application {
    pub config: AppConfig,
    pub adapter: Arc<MetadataAdapter>,
    pub agent_runtime: Arc<AgentRuntime>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("catalog client setup failed: {0}")]
    Catalog(#[source] CatalogError),
    #[error("llm client setup failed: {0}")]
    Llm(#[source] LlmError),
    #[error("tool registration failed: {0}")]
    Tools(#[source] ToolError),
    #[error("`{field}` is out of range")]
    OutOfRange { field: &'static str },
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let transport = Arc::new(
        HttpCatalogTransport::new(
            &config.catalog.base_url,
            Duration::from_secs(config.catalog.timeout_secs),
        )
        .map_err(BootstrapError::Catalog)?,
    );
    let clock = Arc::new(SystemClock);
    let credentials = Arc::new(CredentialManager::new(
        transport.clone(),
        clock.clone(),
        CredentialSettings {
            refresh_token: config.catalog.refresh_token.clone(),
            user_id: config.catalog.user_id.clone(),
            token_ttl: seconds(config.catalog.token_ttl_secs, "catalog.token_ttl_secs")?,
            refresh_margin: seconds(
                config.catalog.refresh_margin_secs,
                "catalog.refresh_margin_secs",
            )?,
        },
    ));
    let client =
        CatalogClient::new(transport, credentials, RetryPolicy::new(config.catalog.max_attempts));
    let cache =
        TtlCache::new(seconds(config.cache.ttl_secs, "cache.ttl_secs")?, config.cache.enabled, clock);
    let adapter = Arc::new(MetadataAdapter::new(client, cache));
    info!(
        event_name = "system.bootstrap.catalog_ready",
        correlation_id = "bootstrap",
        cache_enabled = config.cache.enabled,
        cache_ttl_secs = config.cache.ttl_secs,
        "catalog adapter initialized"
    );

    let tools = ToolRegistry::with_catalog_tools(
        adapter.clone(),
        Duration::from_secs(config.agent.tool_timeout_secs),
    )
    .map_err(BootstrapError::Tools)?;
    let llm = Arc::new(AnthropicClient::new(&config.llm).map_err(BootstrapError::Llm)?);
    let agent_runtime = Arc::new(AgentRuntime::new(
        llm,
        Arc::new(tools),
        GuardrailPolicy { require_tool_use: config.agent.require_tool_use },
        RuntimeSettings::from_config(&config),
    ));
    info!(
        event_name = "system.bootstrap.agent_ready",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        soft_round_limit = config.agent.soft_round_limit,
        hard_round_limit = config.agent.hard_round_limit,
        "agent runtime initialized"
    );

    let dispatcher = question_dispatcher(
        Arc::new(AgentQuestionService::new(agent_runtime.clone())),
        Arc::new(NoopChatPlatform),
        config.slack.history_limit,
    );
    let slack_runner = SocketModeRunner::new(
        Arc::new(NoopSocketTransport),
        dispatcher,
        ReconnectPolicy::default(),
    );

    Ok(Application { config, adapter, agent_runtime, slack_runner })
}

fn seconds(value: u64, field: &'static str) -> Result<chrono::Duration, BootstrapError> {
    chrono::Duration::from_std(Duration::from_secs(value))
        .map_err(|_| BootstrapError::OutOfRange { field })
}
