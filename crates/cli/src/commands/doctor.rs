use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metabot_catalog::{CredentialManager, CredentialSettings, HttpCatalogTransport};
use metabot_core::config::{AppConfig, LoadOptions};
use metabot_core::SystemClock;
use serde::Serialize;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            },
            DoctorCheck {
                name: "credential_presence",
                status: CheckStatus::Pass,
                details: "slack tokens, llm api key and catalog refresh token are set".to_string(),
            },
            check_catalog_exchange(&config),
        ],
        Err(error) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
            DoctorCheck::skipped("credential_presence"),
            DoctorCheck::skipped("catalog_token_exchange"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_catalog_exchange(config: &AppConfig) -> DoctorCheck {
    match exchange_catalog_token(config) {
        Ok(()) => DoctorCheck {
            name: "catalog_token_exchange",
            status: CheckStatus::Pass,
            details: format!("obtained an access token from `{}`", config.catalog.base_url),
        },
        Err(error) => DoctorCheck {
            name: "catalog_token_exchange",
            status: CheckStatus::Fail,
            details: format!("{error:#}"),
        },
    }
}

fn exchange_catalog_token(config: &AppConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;

    runtime.block_on(async {
        let transport = HttpCatalogTransport::new(
            &config.catalog.base_url,
            Duration::from_secs(config.catalog.timeout_secs),
        )
        .context("failed to build catalog http client")?;
        let token_ttl = chrono::Duration::from_std(Duration::from_secs(
            config.catalog.token_ttl_secs,
        ))
        .context("catalog.token_ttl_secs is out of range")?;
        let credentials = CredentialManager::new(
            Arc::new(transport),
            Arc::new(SystemClock),
            CredentialSettings {
                refresh_token: config.catalog.refresh_token.clone(),
                user_id: config.catalog.user_id.clone(),
                token_ttl,
                refresh_margin: chrono::Duration::zero(),
            },
        );

        credentials.access_token().await.context("catalog token exchange failed")?;
        Ok(())
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
