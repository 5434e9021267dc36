use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use metabot_catalog::{CredentialStatus, MetadataAdapter};
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    adapter: Arc<MetadataAdapter>,
}

impl HealthState {
    pub fn new(adapter: Arc<MetadataAdapter>) -> Self {
        Self { adapter }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub catalog_credential: HealthCheck,
    pub cache_entries: usize,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let credential = credential_check(state.adapter.credentials().status().await);
    let ready = credential.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "metabot-server runtime initialized".to_string(),
        },
        catalog_credential: credential,
        cache_entries: state.adapter.cache_len(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

// An expired token is still ready: the next lookup refreshes it.
fn credential_check(status: CredentialStatus) -> HealthCheck {
    match status {
        CredentialStatus::Valid { expires_at } => HealthCheck {
            status: "ready",
            detail: format!("access token valid until {}", expires_at.to_rfc3339()),
        },
        CredentialStatus::Expired { expired_at } => HealthCheck {
            status: "ready",
            detail: format!(
                "access token expired at {}; refreshes on next lookup",
                expired_at.to_rfc3339()
            ),
        },
        CredentialStatus::Missing => HealthCheck {
            status: "degraded",
            detail: "no catalog access token has been obtained".to_string(),
        },
    }
}
