use std::time::Duration;

use metabot_catalog::{ApiRequest, CatalogError, CatalogTransport, HttpCatalogTransport};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> HttpCatalogTransport {
    HttpCatalogTransport::new(&server.uri(), Duration::from_secs(5)).expect("client builds")
}

fn token() -> SecretString {
    SecretString::from("access-123".to_string())
}

#[tokio::test]
async fn get_sends_token_header_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/integration/v2/schema/"))
        .and(query_param("ds_id", "7"))
        .and(header("TOKEN", "access-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "PUBLIC"}])))
        .expect(1)
        .mount(&server)
        .await;

    let payload = transport(&server)
        .get(&ApiRequest::new("/integration/v2/schema/").param("ds_id", 7), &token())
        .await
        .expect("request succeeds");

    assert_eq!(payload, json!([{"name": "PUBLIC"}]));
}

#[tokio::test]
async fn statuses_map_to_error_kinds() {
    let server = MockServer::start().await;
    for (route, status) in [("/denied/", 403), ("/missing/", 404), ("/busy/", 503), ("/bad/", 400)]
    {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;
    }
    let transport = transport(&server);

    let denied = transport.get(&ApiRequest::new("/denied/"), &token()).await;
    assert!(matches!(denied, Err(CatalogError::Auth(_))));

    let missing = transport.get(&ApiRequest::new("/missing/"), &token()).await;
    assert!(matches!(missing, Err(CatalogError::NotFound(_))));

    let busy = transport.get(&ApiRequest::new("/busy/"), &token()).await;
    assert!(matches!(busy, Err(ref error) if error.is_retryable()));

    let bad = transport.get(&ApiRequest::new("/bad/"), &token()).await;
    assert!(matches!(bad, Err(CatalogError::Status { status: 400, .. })));
}

#[tokio::test]
async fn non_json_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/integration/v1/datasource/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let result = transport(&server)
        .get(&ApiRequest::new("/integration/v1/datasource/"), &token())
        .await;
    assert!(matches!(result, Err(CatalogError::Decode(_))));
}

#[tokio::test]
async fn token_exchange_uses_v1_and_accepts_created() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/integration/v1/createAPIAccessToken/"))
        .and(body_json(json!({"refresh_token": "refresh-abc", "user_id": 42})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"api_access_token": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;

    let token = transport(&server)
        .exchange_token(&SecretString::from("refresh-abc".to_string()), Some("42"))
        .await
        .expect("exchange succeeds");
    assert_eq!(token.expose_secret(), "fresh");
}

#[tokio::test]
async fn token_exchange_falls_back_to_v2_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/integration/v1/createAPIAccessToken/"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/integration/v2/createAPIAccessToken/"))
        .and(header("Authorization", "Bearer refresh-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "from-v2"})))
        .mount(&server)
        .await;

    let token = transport(&server)
        .exchange_token(&SecretString::from("refresh-abc".to_string()), Some("42"))
        .await
        .expect("v2 exchange succeeds");
    assert_eq!(token.expose_secret(), "from-v2");
}

#[tokio::test]
async fn token_exchange_without_user_id_is_an_auth_error() {
    let server = MockServer::start().await;
    let result = transport(&server)
        .exchange_token(&SecretString::from("refresh-abc".to_string()), None)
        .await;
    assert!(matches!(result, Err(CatalogError::Auth(_))));
}
