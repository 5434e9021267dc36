use std::env;
use std::fs;
use std::path::Path;

use metabot_core::config::{default_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use super::CommandResult;

/// One rendered config field.
struct Field {
    key: &'static str,
    env_key: Option<&'static str>,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: Option<&'static str>, value: impl ToString) -> Self {
        Self { key, env_key, value: value.to_string() }
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let file_path = default_config_path();
    let file_doc = file_path.as_deref().and_then(load_config_file_doc);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(&field, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    CommandResult::text(lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let slack = &config.slack;
    let llm = &config.llm;
    let catalog = &config.catalog;
    let agent = &config.agent;

    vec![
        Field::new(
            "slack.app_token",
            Some("METABOT_SLACK_APP_TOKEN"),
            redact_token(slack.app_token.expose_secret()),
        ),
        Field::new(
            "slack.bot_token",
            Some("METABOT_SLACK_BOT_TOKEN"),
            redact_token(slack.bot_token.expose_secret()),
        ),
        Field::new(
            "slack.max_message_chars",
            Some("METABOT_SLACK_MAX_MESSAGE_CHARS"),
            slack.max_message_chars,
        ),
        Field::new("slack.history_limit", Some("METABOT_SLACK_HISTORY_LIMIT"), slack.history_limit),
        Field::new(
            "llm.api_key",
            Some("METABOT_LLM_API_KEY"),
            if llm.api_key.is_some() { "<redacted>" } else { "<unset>" },
        ),
        Field::new("llm.base_url", Some("METABOT_LLM_BASE_URL"), &llm.base_url),
        Field::new("llm.model", Some("METABOT_LLM_MODEL"), &llm.model),
        Field::new("llm.max_tokens", Some("METABOT_LLM_MAX_TOKENS"), llm.max_tokens),
        Field::new("llm.timeout_secs", Some("METABOT_LLM_TIMEOUT_SECS"), llm.timeout_secs),
        Field::new("llm.max_retries", Some("METABOT_LLM_MAX_RETRIES"), llm.max_retries),
        Field::new("catalog.base_url", Some("METABOT_CATALOG_BASE_URL"), &catalog.base_url),
        Field::new(
            "catalog.refresh_token",
            Some("METABOT_CATALOG_REFRESH_TOKEN"),
            redact_secret(catalog.refresh_token.expose_secret()),
        ),
        Field::new(
            "catalog.user_id",
            Some("METABOT_CATALOG_USER_ID"),
            catalog.user_id.as_deref().unwrap_or("<unset>"),
        ),
        Field::new(
            "catalog.timeout_secs",
            Some("METABOT_CATALOG_TIMEOUT_SECS"),
            catalog.timeout_secs,
        ),
        Field::new(
            "catalog.max_attempts",
            Some("METABOT_CATALOG_MAX_ATTEMPTS"),
            catalog.max_attempts,
        ),
        Field::new(
            "catalog.token_ttl_secs",
            Some("METABOT_CATALOG_TOKEN_TTL_SECS"),
            catalog.token_ttl_secs,
        ),
        Field::new("catalog.refresh_margin_secs", None, catalog.refresh_margin_secs),
        Field::new("cache.enabled", Some("METABOT_CACHE_ENABLED"), config.cache.enabled),
        Field::new("cache.ttl_secs", Some("METABOT_CACHE_TTL_SECS"), config.cache.ttl_secs),
        Field::new(
            "agent.soft_round_limit",
            Some("METABOT_AGENT_SOFT_ROUND_LIMIT"),
            agent.soft_round_limit,
        ),
        Field::new(
            "agent.hard_round_limit",
            Some("METABOT_AGENT_HARD_ROUND_LIMIT"),
            agent.hard_round_limit,
        ),
        Field::new(
            "agent.tool_timeout_secs",
            Some("METABOT_AGENT_TOOL_TIMEOUT_SECS"),
            agent.tool_timeout_secs,
        ),
        Field::new(
            "agent.require_tool_use",
            Some("METABOT_AGENT_REQUIRE_TOOL_USE"),
            agent.require_tool_use,
        ),
        Field::new(
            "server.bind_address",
            Some("METABOT_SERVER_BIND_ADDRESS"),
            &config.server.bind_address,
        ),
        Field::new(
            "server.health_check_port",
            Some("METABOT_SERVER_HEALTH_CHECK_PORT"),
            config.server.health_check_port,
        ),
        Field::new(
            "server.graceful_shutdown_secs",
            Some("METABOT_SERVER_GRACEFUL_SHUTDOWN_SECS"),
            config.server.graceful_shutdown_secs,
        ),
        Field::new("logging.level", Some("METABOT_LOGGING_LEVEL"), &config.logging.level),
        Field::new(
            "logging.format",
            Some("METABOT_LOGGING_FORMAT"),
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = field.env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = file_doc {
        if contains_path(doc, field.key) {
            let file_path = file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps the Slack token prefix (`xapp`, `xoxb`) so the wrong token type is visible.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: &str) -> &'static str {
    if secret.trim().is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}
