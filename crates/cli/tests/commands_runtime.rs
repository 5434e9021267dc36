use std::env;
use std::sync::{Mutex, OnceLock};

use metabot_cli::commands::{config, doctor};
use serde_json::Value;

const VALID_ENV: &[(&str, &str)] = &[
    ("METABOT_SLACK_APP_TOKEN", "xapp-test"),
    ("METABOT_SLACK_BOT_TOKEN", "xoxb-test"),
    ("METABOT_LLM_API_KEY", "sk-test"),
    ("METABOT_CATALOG_BASE_URL", "http://127.0.0.1:9"),
    ("METABOT_CATALOG_REFRESH_TOKEN", "refresh-secret"),
    ("METABOT_CATALOG_TIMEOUT_SECS", "1"),
];

#[test]
fn config_renders_sources_and_redacts_secrets() {
    with_env(VALID_ENV, || {
        let result = config::run();
        assert_eq!(result.exit_code, 0, "expected config to render");

        let output = &result.output;
        assert!(output.starts_with("effective config"));
        assert!(output
            .contains("- slack.app_token = xapp-*** (source: env (METABOT_SLACK_APP_TOKEN))"));
        assert!(output.contains("- catalog.refresh_token = <redacted>"));
        assert!(output.contains("- llm.api_key = <redacted>"));
        assert!(output.contains("- agent.hard_round_limit = 50 (source: default)"));
        assert!(!output.contains("refresh-secret"));
        assert!(!output.contains("sk-test"));
    });
}

#[test]
fn config_reports_validation_failure_as_json() {
    with_env(&[], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_skips_remaining_checks_when_config_is_invalid() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(payload["checks"][2]["status"], "skipped");
    });
}

#[test]
fn doctor_flags_unreachable_catalog() {
    with_env(VALID_ENV, || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["checks"][0]["status"], "pass");
        assert_eq!(payload["checks"][1]["status"], "pass");
        assert_eq!(payload["checks"][2]["name"], "catalog_token_exchange");
        assert_eq!(payload["checks"][2]["status"], "fail");
    });
}

#[test]
fn doctor_human_output_lists_each_check() {
    with_env(&[], || {
        let result = doctor::run(false);

        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines[0], "doctor: one or more readiness checks failed");
        assert!(lines[1].starts_with("- [fail] config_validation:"));
        assert!(lines[2].starts_with("- [skip] credential_presence:"));
        assert!(lines[3].starts_with("- [skip] catalog_token_exchange:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys: Vec<String> =
        env::vars().map(|(key, _)| key).filter(|key| key.starts_with("METABOT_")).collect();
    let previous_values: Vec<(String, Option<String>)> =
        keys.iter().map(|key| (key.clone(), env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, _) in vars {
        env::remove_var(key);
    }
    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        }
    }
}
