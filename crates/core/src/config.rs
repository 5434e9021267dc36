use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub llm: LlmConfig,
    pub catalog: CatalogConfig,
    pub cache: CacheConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub max_message_chars: usize,
    pub history_limit: usize,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub base_url: String,
    pub refresh_token: SecretString,
    pub user_id: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub token_ttl_secs: u64,
    pub refresh_margin_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub soft_round_limit: u32,
    pub hard_round_limit: u32,
    pub tool_timeout_secs: u64,
    pub require_tool_use: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub catalog_base_url: Option<String>,
    pub catalog_refresh_token: Option<String>,
    pub catalog_user_id: Option<String>,
    pub cache_ttl_secs: Option<u64>,
    pub soft_round_limit: Option<u32>,
    pub hard_round_limit: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                max_message_chars: 3_800,
                history_limit: 10,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-sonnet-4-5".to_string(),
                max_tokens: 4_096,
                timeout_secs: 60,
                max_retries: 2,
            },
            catalog: CatalogConfig {
                base_url: String::new(),
                refresh_token: String::new().into(),
                user_id: None,
                timeout_secs: 15,
                max_attempts: 3,
                token_ttl_secs: 3_600,
                refresh_margin_secs: 60,
            },
            cache: CacheConfig { enabled: true, ttl_secs: 300 },
            agent: AgentConfig {
                soft_round_limit: 25,
                hard_round_limit: 50,
                tool_timeout_secs: 30,
                require_tool_use: true,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("metabot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(slack_app_token_value) = slack.app_token {
                self.slack.app_token = secret_value(slack_app_token_value);
            }
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value);
            }
            if let Some(max_message_chars) = slack.max_message_chars {
                self.slack.max_message_chars = max_message_chars;
            }
            if let Some(history_limit) = slack.history_limit {
                self.slack.history_limit = history_limit;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(base_url) = catalog.base_url {
                self.catalog.base_url = base_url;
            }
            if let Some(refresh_token_value) = catalog.refresh_token {
                self.catalog.refresh_token = secret_value(refresh_token_value);
            }
            if let Some(user_id) = catalog.user_id {
                self.catalog.user_id = Some(user_id);
            }
            if let Some(timeout_secs) = catalog.timeout_secs {
                self.catalog.timeout_secs = timeout_secs;
            }
            if let Some(max_attempts) = catalog.max_attempts {
                self.catalog.max_attempts = max_attempts;
            }
            if let Some(token_ttl_secs) = catalog.token_ttl_secs {
                self.catalog.token_ttl_secs = token_ttl_secs;
            }
            if let Some(refresh_margin_secs) = catalog.refresh_margin_secs {
                self.catalog.refresh_margin_secs = refresh_margin_secs;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(enabled) = cache.enabled {
                self.cache.enabled = enabled;
            }
            if let Some(ttl_secs) = cache.ttl_secs {
                self.cache.ttl_secs = ttl_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(soft_round_limit) = agent.soft_round_limit {
                self.agent.soft_round_limit = soft_round_limit;
            }
            if let Some(hard_round_limit) = agent.hard_round_limit {
                self.agent.hard_round_limit = hard_round_limit;
            }
            if let Some(tool_timeout_secs) = agent.tool_timeout_secs {
                self.agent.tool_timeout_secs = tool_timeout_secs;
            }
            if let Some(require_tool_use) = agent.require_tool_use {
                self.agent.require_tool_use = require_tool_use;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("METABOT_SLACK_APP_TOKEN") {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env("METABOT_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("METABOT_SLACK_MAX_MESSAGE_CHARS") {
            self.slack.max_message_chars = parse_usize("METABOT_SLACK_MAX_MESSAGE_CHARS", &value)?;
        }
        if let Some(value) = read_env("METABOT_SLACK_HISTORY_LIMIT") {
            self.slack.history_limit = parse_usize("METABOT_SLACK_HISTORY_LIMIT", &value)?;
        }

        if let Some(value) = read_env("METABOT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("METABOT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("METABOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("METABOT_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("METABOT_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("METABOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("METABOT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("METABOT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("METABOT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("METABOT_CATALOG_BASE_URL") {
            self.catalog.base_url = value;
        }
        if let Some(value) = read_env("METABOT_CATALOG_REFRESH_TOKEN") {
            self.catalog.refresh_token = secret_value(value);
        }
        if let Some(value) = read_env("METABOT_CATALOG_USER_ID") {
            self.catalog.user_id = Some(value);
        }
        if let Some(value) = read_env("METABOT_CATALOG_TIMEOUT_SECS") {
            self.catalog.timeout_secs = parse_u64("METABOT_CATALOG_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("METABOT_CATALOG_MAX_ATTEMPTS") {
            self.catalog.max_attempts = parse_u32("METABOT_CATALOG_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("METABOT_CATALOG_TOKEN_TTL_SECS") {
            self.catalog.token_ttl_secs = parse_u64("METABOT_CATALOG_TOKEN_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("METABOT_CACHE_ENABLED") {
            self.cache.enabled = parse_bool("METABOT_CACHE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("METABOT_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_u64("METABOT_CACHE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("METABOT_AGENT_SOFT_ROUND_LIMIT") {
            self.agent.soft_round_limit = parse_u32("METABOT_AGENT_SOFT_ROUND_LIMIT", &value)?;
        }
        if let Some(value) = read_env("METABOT_AGENT_HARD_ROUND_LIMIT") {
            self.agent.hard_round_limit = parse_u32("METABOT_AGENT_HARD_ROUND_LIMIT", &value)?;
        }
        if let Some(value) = read_env("METABOT_AGENT_TOOL_TIMEOUT_SECS") {
            self.agent.tool_timeout_secs = parse_u64("METABOT_AGENT_TOOL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("METABOT_AGENT_REQUIRE_TOOL_USE") {
            self.agent.require_tool_use = parse_bool("METABOT_AGENT_REQUIRE_TOOL_USE", &value)?;
        }

        if let Some(value) = read_env("METABOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("METABOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("METABOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("METABOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("METABOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("METABOT_LOGGING_LEVEL").or_else(|| read_env("METABOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("METABOT_LOGGING_FORMAT").or_else(|| read_env("METABOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(base_url) = overrides.catalog_base_url {
            self.catalog.base_url = base_url;
        }
        if let Some(refresh_token) = overrides.catalog_refresh_token {
            self.catalog.refresh_token = secret_value(refresh_token);
        }
        if let Some(user_id) = overrides.catalog_user_id {
            self.catalog.user_id = Some(user_id);
        }
        if let Some(ttl_secs) = overrides.cache_ttl_secs {
            self.cache.ttl_secs = ttl_secs;
        }
        if let Some(soft_round_limit) = overrides.soft_round_limit {
            self.agent.soft_round_limit = soft_round_limit;
        }
        if let Some(hard_round_limit) = overrides.hard_round_limit {
            self.agent.hard_round_limit = hard_round_limit;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_llm(&self.llm)?;
        validate_catalog(&self.catalog)?;
        validate_cache(&self.cache)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Config file that `AppConfig::load` would read without an explicit path.
pub fn default_config_path() -> Option<PathBuf> {
    resolve_config_path(None)
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("metabot.toml"), PathBuf::from("config/metabot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    if slack.max_message_chars < 200 {
        return Err(ConfigError::Validation(
            "slack.max_message_chars must be at least 200".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let missing =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation("llm.api_key is required".to_string()));
    }

    if !is_http_url(&llm.base_url) {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    if !is_http_url(&catalog.base_url) {
        return Err(ConfigError::Validation(
            "catalog.base_url must start with http:// or https:// (e.g. https://company.alation.com)"
                .to_string(),
        ));
    }

    if catalog.refresh_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "catalog.refresh_token is required to obtain catalog access tokens".to_string(),
        ));
    }

    if let Some(user_id) = &catalog.user_id {
        if user_id.trim().parse::<u64>().is_err() {
            return Err(ConfigError::Validation(
                "catalog.user_id must be numeric (your profile URL shows /user/<ID>/)".to_string(),
            ));
        }
    }

    if catalog.timeout_secs == 0 || catalog.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "catalog.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if catalog.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "catalog.max_attempts must be greater than zero".to_string(),
        ));
    }

    if catalog.refresh_margin_secs >= catalog.token_ttl_secs {
        return Err(ConfigError::Validation(
            "catalog.refresh_margin_secs must be smaller than catalog.token_ttl_secs".to_string(),
        ));
    }

    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.ttl_secs == 0 {
        return Err(ConfigError::Validation("cache.ttl_secs must be greater than zero".to_string()));
    }
    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.soft_round_limit == 0 || agent.soft_round_limit >= agent.hard_round_limit {
        return Err(ConfigError::Validation(
            "agent.soft_round_limit must be greater than zero and below agent.hard_round_limit"
                .to_string(),
        ));
    }

    if agent.tool_timeout_secs == 0 || agent.tool_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "agent.tool_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    llm: Option<LlmPatch>,
    catalog: Option<CatalogPatch>,
    cache: Option<CachePatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    max_message_chars: Option<usize>,
    history_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    base_url: Option<String>,
    refresh_token: Option<String>,
    user_id: Option<String>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    token_ttl_secs: Option<u64>,
    refresh_margin_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    enabled: Option<bool>,
    ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    soft_round_limit: Option<u32>,
    hard_round_limit: Option<u32>,
    tool_timeout_secs: Option<u64>,
    require_tool_use: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
