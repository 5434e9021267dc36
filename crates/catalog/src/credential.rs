//! Short-lived catalog access token with single-flight refresh.
//!
//! The current credential sits behind one async mutex that is held across the
//! exchange call. Callers that need a token while a refresh is running queue on
//! that lock and pick up the refreshed token instead of starting another exchange.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metabot_core::Clock;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::CatalogError;
use crate::transport::CatalogTransport;

#[derive(Clone, Debug)]
pub struct Credential {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CredentialStatus {
    Missing,
    Valid { expires_at: DateTime<Utc> },
    Expired { expired_at: DateTime<Utc> },
}

#[derive(Clone, Debug)]
pub struct CredentialSettings {
    pub refresh_token: SecretString,
    pub user_id: Option<String>,
    /// Assumed lifetime of an exchanged token. The catalog does not report one.
    pub token_ttl: Duration,
    /// Tokens are refreshed this long before their estimated expiry.
    pub refresh_margin: Duration,
}

pub struct CredentialManager {
    transport: Arc<dyn CatalogTransport>,
    clock: Arc<dyn Clock>,
    settings: CredentialSettings,
    current: Mutex<Option<Credential>>,
    refreshes: AtomicU64,
}

impl CredentialManager {
    pub fn new(
        transport: Arc<dyn CatalogTransport>,
        clock: Arc<dyn Clock>,
        settings: CredentialSettings,
    ) -> Self {
        Self { transport, clock, settings, current: Mutex::new(None), refreshes: AtomicU64::new(0) }
    }

    /// Returns a token that is not near expiry, refreshing first when needed.
    pub async fn access_token(&self) -> Result<SecretString, CatalogError> {
        let mut current = self.current.lock().await;
        if let Some(credential) = current.as_ref() {
            if self.is_fresh(credential) {
                return Ok(credential.token.clone());
            }
        }

        let credential = self.refresh_locked(&mut current, "expiry").await?;
        Ok(credential.token)
    }

    /// Called after the catalog rejected `rejected`. Only exchanges again if no
    /// other caller has already replaced that token.
    pub async fn refresh_after_rejection(
        &self,
        rejected: &SecretString,
    ) -> Result<SecretString, CatalogError> {
        let mut current = self.current.lock().await;
        if let Some(credential) = current.as_ref() {
            let replaced = credential.token.expose_secret() != rejected.expose_secret();
            if replaced && self.is_fresh(credential) {
                return Ok(credential.token.clone());
            }
        }

        let credential = self.refresh_locked(&mut current, "rejected").await?;
        Ok(credential.token)
    }

    pub async fn status(&self) -> CredentialStatus {
        let current = self.current.lock().await;
        match current.as_ref() {
            None => CredentialStatus::Missing,
            Some(credential) if self.clock.now() < credential.expires_at => {
                CredentialStatus::Valid { expires_at: credential.expires_at }
            }
            Some(credential) => CredentialStatus::Expired { expired_at: credential.expires_at },
        }
    }

    /// Number of token exchanges performed so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn is_fresh(&self, credential: &Credential) -> bool {
        self.clock.now() + self.settings.refresh_margin < credential.expires_at
    }

    async fn refresh_locked(
        &self,
        current: &mut Option<Credential>,
        reason: &'static str,
    ) -> Result<Credential, CatalogError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let exchanged = self
            .transport
            .exchange_token(&self.settings.refresh_token, self.settings.user_id.as_deref())
            .await;

        match exchanged {
            Ok(token) => {
                let credential =
                    Credential { token, expires_at: self.clock.now() + self.settings.token_ttl };
                info!(
                    event_name = "catalog.credential.refreshed",
                    reason,
                    expires_at = %credential.expires_at,
                    "catalog access token refreshed"
                );
                *current = Some(credential.clone());
                Ok(credential)
            }
            Err(error) => {
                warn!(
                    event_name = "catalog.credential.refresh_failed",
                    reason,
                    error = %error,
                    "catalog access token refresh failed"
                );
                Err(error)
            }
        }
    }
}
