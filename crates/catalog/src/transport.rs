//! Raw HTTP access to the catalog's read API and token exchange endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::CatalogError;

/// Header the catalog reads the access token from.
pub const TOKEN_HEADER: &str = "TOKEN";

/// A read-only GET against the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), query: Vec::new() }
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }
}

#[async_trait]
pub trait CatalogTransport: Send + Sync {
    async fn get(&self, request: &ApiRequest, token: &SecretString)
        -> Result<Value, CatalogError>;

    /// Trades the long-lived refresh token for a short-lived access token.
    async fn exchange_token(
        &self,
        refresh_token: &SecretString,
        user_id: Option<&str>,
    ) -> Result<SecretString, CatalogError>;
}

pub struct HttpCatalogTransport {
    client: Client,
    base_url: String,
}

impl HttpCatalogTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CatalogError::Transport(error.to_string()))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_exchange(
        &self,
        path: &str,
        body: Value,
        bearer: Option<&SecretString>,
    ) -> Result<Option<SecretString>, CatalogError> {
        let mut request = self
            .client
            .post(self.url(path))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(bearer) = bearer {
            request = request.bearer_auth(bearer.expose_secret());
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        info!(
            event_name = "catalog.token_exchange.response",
            path,
            status = status.as_u16(),
            "token exchange responded"
        );

        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Ok(None);
        }

        let payload: Value =
            response.json().await.map_err(|error| CatalogError::Decode(error.to_string()))?;
        Ok(token_from_payload(&payload))
    }
}

#[async_trait]
impl CatalogTransport for HttpCatalogTransport {
    async fn get(
        &self,
        request: &ApiRequest,
        token: &SecretString,
    ) -> Result<Value, CatalogError> {
        debug!(
            event_name = "catalog.request",
            path = %request.path,
            query = ?request.query,
            "catalog GET"
        );

        let response = self
            .client
            .get(self.url(&request.path))
            .query(&request.query)
            .header(header::ACCEPT, "application/json")
            .header(TOKEN_HEADER, token.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::from_status(status.as_u16(), &request.path, &body));
        }

        response.json::<Value>().await.map_err(|error| CatalogError::Decode(error.to_string()))
    }

    async fn exchange_token(
        &self,
        refresh_token: &SecretString,
        user_id: Option<&str>,
    ) -> Result<SecretString, CatalogError> {
        let user_id = user_id
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                CatalogError::Auth(
                    "catalog.user_id is required to exchange the refresh token".to_string(),
                )
            })?;

        let v1_body = json!({
            "refresh_token": refresh_token.expose_secret(),
            "user_id": user_id,
        });
        match self.post_exchange("/integration/v1/createAPIAccessToken/", v1_body, None).await {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => {}
            Err(error) => {
                warn!(event_name = "catalog.token_exchange.v1_failed", error = %error, "v1 exchange failed")
            }
        }

        let v2_body = json!({ "user_id": user_id });
        match self
            .post_exchange("/integration/v2/createAPIAccessToken/", v2_body, Some(refresh_token))
            .await
        {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(CatalogError::Auth(
                "token exchange was rejected by both v1 and v2 endpoints".to_string(),
            )),
            Err(error) => Err(error),
        }
    }
}

fn transport_error(error: reqwest::Error) -> CatalogError {
    if error.is_timeout() {
        CatalogError::Transport(format!("request timed out: {error}"))
    } else {
        CatalogError::Transport(error.to_string())
    }
}

fn token_from_payload(payload: &Value) -> Option<SecretString> {
    ["api_access_token", "token", "access_token"]
        .iter()
        .filter_map(|field| payload.get(*field).and_then(Value::as_str))
        .find(|token| !token.trim().is_empty())
        .map(|token| SecretString::from(token.to_string()))
}
