use std::sync::Arc;

use metabot_core::RetryPolicy;
use serde_json::Value;
use tracing::{info, warn};

use crate::credential::CredentialManager;
use crate::error::CatalogError;
use crate::transport::{ApiRequest, CatalogTransport};

/// Authenticated, retrying access to the catalog read API.
///
/// Transport failures are retried with backoff up to the policy's attempt
/// ceiling. An authorization failure triggers one coalesced credential refresh
/// and one more try; a second rejection is returned to the caller.
pub struct CatalogClient {
    transport: Arc<dyn CatalogTransport>,
    credentials: Arc<CredentialManager>,
    retry: RetryPolicy,
}

impl CatalogClient {
    pub fn new(
        transport: Arc<dyn CatalogTransport>,
        credentials: Arc<CredentialManager>,
        retry: RetryPolicy,
    ) -> Self {
        Self { transport, credentials, retry }
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    pub async fn get(&self, request: &ApiRequest) -> Result<Value, CatalogError> {
        let mut token = self.credentials.access_token().await?;
        let mut attempts = 0_u32;
        let mut reauthenticated = false;

        loop {
            attempts += 1;
            match self.transport.get(request, &token).await {
                Ok(payload) => return Ok(payload),
                Err(error) if error.is_auth() && !reauthenticated => {
                    info!(
                        event_name = "catalog.request.reauthenticate",
                        path = %request.path,
                        "catalog rejected token, refreshing once"
                    );
                    token = self.credentials.refresh_after_rejection(&token).await?;
                    reauthenticated = true;
                    attempts -= 1;
                }
                Err(error) if error.is_retryable() && self.retry.has_attempts_left(attempts) => {
                    let delay = self.retry.backoff(attempts - 1);
                    warn!(
                        event_name = "catalog.request.retry",
                        path = %request.path,
                        attempt = attempts,
                        delay = ?delay,
                        error = %error,
                        "retrying catalog request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Like `get`, but a missing resource reads as `None` so callers can fall
    /// through to the next lookup strategy.
    pub async fn get_optional(&self, request: &ApiRequest) -> Result<Option<Value>, CatalogError> {
        match self.get(request).await {
            Ok(payload) => Ok(Some(payload)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration;
    use metabot_core::{ManualClock, RetryPolicy};
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::CatalogClient;
    use crate::credential::{CredentialManager, CredentialSettings};
    use crate::error::CatalogError;
    use crate::transport::{ApiRequest, CatalogTransport};

    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value, CatalogError>>>,
        tokens_seen: Mutex<Vec<String>>,
        exchanges: Mutex<u32>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Value, CatalogError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                tokens_seen: Mutex::new(Vec::new()),
                exchanges: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl CatalogTransport for ScriptedTransport {
        async fn get(
            &self,
            _request: &ApiRequest,
            token: &SecretString,
        ) -> Result<Value, CatalogError> {
            self.tokens_seen.lock().await.push(token.expose_secret().to_string());
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(CatalogError::Transport("script exhausted".to_string())))
        }

        async fn exchange_token(
            &self,
            _refresh_token: &SecretString,
            _user_id: Option<&str>,
        ) -> Result<SecretString, CatalogError> {
            let mut exchanges = self.exchanges.lock().await;
            *exchanges += 1;
            Ok(SecretString::from(format!("token-{}", *exchanges)))
        }
    }

    fn client(transport: Arc<dyn CatalogTransport>, attempts: u32) -> CatalogClient {
        let credentials = Arc::new(CredentialManager::new(
            transport.clone(),
            Arc::new(ManualClock::default()),
            CredentialSettings {
                refresh_token: SecretString::from("refresh".to_string()),
                user_id: Some("1".to_string()),
                token_ttl: Duration::hours(1),
                refresh_margin: Duration::minutes(1),
            },
        ));
        CatalogClient::new(transport, credentials, RetryPolicy::immediate(attempts))
    }

    fn request() -> ApiRequest {
        ApiRequest::new("/integration/v2/schema/").param("ds_id", 1)
    }

    #[tokio::test]
    async fn transport_failures_are_retried_up_to_the_ceiling() {
        let transport = ScriptedTransport::new(vec![
            Err(CatalogError::Transport("reset".to_string())),
            Err(CatalogError::Transport("reset".to_string())),
            Ok(json!([{"name": "PUBLIC"}])),
        ]);
        let client = client(transport.clone(), 3);

        let payload = client.get(&request()).await.expect("third attempt succeeds");
        assert_eq!(payload, json!([{"name": "PUBLIC"}]));
        assert_eq!(transport.tokens_seen.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn attempt_ceiling_is_respected() {
        let transport = ScriptedTransport::new(vec![
            Err(CatalogError::Transport("reset".to_string())),
            Err(CatalogError::Transport("reset".to_string())),
            Ok(json!([])),
        ]);
        let client = client(transport.clone(), 2);

        let error = client.get(&request()).await.expect_err("gives up after two attempts");
        assert!(error.is_retryable());
        assert_eq!(transport.tokens_seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn auth_failure_refreshes_once_and_retries_with_new_token() {
        let transport = ScriptedTransport::new(vec![
            Err(CatalogError::Auth("HTTP 401".to_string())),
            Ok(json!([])),
        ]);
        let client = client(transport.clone(), 3);

        client.get(&request()).await.expect("retry after refresh succeeds");
        assert_eq!(*transport.tokens_seen.lock().await, vec!["token-1", "token-2"]);
        assert_eq!(*transport.exchanges.lock().await, 2);
    }

    #[tokio::test]
    async fn second_auth_failure_is_terminal() {
        let transport = ScriptedTransport::new(vec![
            Err(CatalogError::Auth("HTTP 403".to_string())),
            Err(CatalogError::Auth("HTTP 403".to_string())),
            Ok(json!([])),
        ]);
        let client = client(transport.clone(), 3);

        let error = client.get(&request()).await.expect_err("second rejection is final");
        assert!(error.is_auth());
        assert_eq!(transport.tokens_seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn not_found_is_not_retried_and_reads_as_none() {
        let transport =
            ScriptedTransport::new(vec![Err(CatalogError::NotFound("/x".to_string()))]);
        let client = client(transport.clone(), 3);

        assert_eq!(client.get_optional(&request()).await.expect("not an error"), None);
        assert_eq!(transport.tokens_seen.lock().await.len(), 1);
    }

    /// Rejects the first issued token, accepts any later one and echoes it back.
    #[derive(Default)]
    struct RevokingTransport {
        exchanges: AtomicU32,
        rejections: AtomicU32,
    }

    #[async_trait]
    impl CatalogTransport for RevokingTransport {
        async fn get(
            &self,
            _request: &ApiRequest,
            token: &SecretString,
        ) -> Result<Value, CatalogError> {
            tokio::task::yield_now().await;
            if token.expose_secret() == "token-1" {
                self.rejections.fetch_add(1, Ordering::SeqCst);
                return Err(CatalogError::Auth("HTTP 401".to_string()));
            }
            Ok(json!({"token": token.expose_secret()}))
        }

        async fn exchange_token(
            &self,
            _refresh_token: &SecretString,
            _user_id: Option<&str>,
        ) -> Result<SecretString, CatalogError> {
            let issued = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SecretString::from(format!("token-{issued}")))
        }
    }

    #[tokio::test]
    async fn concurrent_rejections_share_a_single_refresh() {
        let transport = Arc::new(RevokingTransport::default());
        let client = Arc::new(client(transport.clone(), 3));
        client.credentials().access_token().await.expect("initial token");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.get(&request()).await })
            })
            .collect();
        for handle in handles {
            let payload = handle.await.expect("join").expect("call succeeds after refresh");
            assert_eq!(payload, json!({"token": "token-2"}));
        }

        assert_eq!(transport.exchanges.load(Ordering::SeqCst), 2);
        assert!(transport.rejections.load(Ordering::SeqCst) >= 1);
        assert_eq!(client.credentials().refresh_count(), 2);
    }
}
