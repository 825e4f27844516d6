#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use auth_functions::{AuthFunctions, AuthFunctionsConfig, OneshotSink, StaticTenantConfig};
use auth_functions_sdk::{InvocationContext, Outcome, Payload};
use httpmock::prelude::*;
use serde_json::json;

fn functions(token_endpoint: String, domains: &[&str]) -> AuthFunctions {
    let config = AuthFunctionsConfig {
        allow_insecure_http: true,
        choreo_token_endpoint: Some(token_endpoint),
        choreo_domains: domains.iter().map(|d| (*d).to_owned()).collect(),
        ..AuthFunctionsConfig::default()
    };
    AuthFunctions::new(config, Arc::new(StaticTenantConfig::new()))
}

fn metadata(url: &str) -> BTreeMap<String, String> {
    [
        ("url", url),
        ("consumerKey", "choreo-app"),
        ("consumerSecret", "choreo-secret"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect()
}

fn payload() -> Payload {
    let mut p = Payload::new();
    p.insert("user".to_owned(), json!("alice"));
    p
}

async fn call(f: &AuthFunctions, metadata: &BTreeMap<String, String>) -> auth_functions::Delivered {
    let (sink, rx) = OneshotSink::channel();
    f.call_choreo(
        InvocationContext::new("carbon.super", "session-1"),
        metadata,
        payload(),
        sink,
    )
    .await
    .unwrap();
    rx.await.unwrap()
}

#[tokio::test]
async fn posts_with_client_credential_token() {
    let server = MockServer::start();
    let token = common::jwt("choreo");
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200).json_body(json!({ "access_token": token }));
    });
    let bearer = format!("Bearer {token}");
    let api_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/risk")
            .header("authorization", &bearer)
            .json_body(json!({ "user": "alice" }));
        then.status(200).json_body(json!({ "risk": "low" }));
    });

    let f = functions(server.url("/token"), &[]);
    let delivered = call(&f, &metadata(&server.url("/risk"))).await;

    assert_eq!(delivered.outcome, Outcome::Success);
    assert_eq!(delivered.payload["risk"], "low");
    assert_eq!(token_mock.hits(), 1);
    assert_eq!(api_mock.hits(), 1);
}

#[tokio::test]
async fn only_200_is_success() {
    let server = MockServer::start();
    let token = common::jwt("choreo");
    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200).json_body(json!({ "access_token": token }));
    });
    server.mock(|when, then| {
        when.method(POST).path("/risk");
        then.status(202).json_body(json!({ "risk": "low" }));
    });

    let f = functions(server.url("/token"), &[]);
    let delivered = call(&f, &metadata(&server.url("/risk"))).await;

    assert_eq!(delivered.outcome, Outcome::Fail);
    assert!(delivered.payload.is_empty());
}

#[tokio::test]
async fn inactive_token_is_refreshed_and_resent() {
    let server = MockServer::start();
    let stale = common::jwt("stale");
    let fresh = common::jwt("fresh");
    let (endpoint, token_hits) = common::sequenced_server(vec![
        (200, json!({ "access_token": stale }).to_string()),
        (200, json!({ "access_token": fresh }).to_string()),
    ])
    .await;

    let stale_bearer = format!("Bearer {stale}");
    let rejected = server.mock(|when, then| {
        when.method(POST).path("/risk").header("authorization", &stale_bearer);
        then.status(401).json_body(json!({ "code": "900901", "message": "Invalid Credentials" }));
    });
    let fresh_bearer = format!("Bearer {fresh}");
    let accepted = server.mock(|when, then| {
        when.method(POST).path("/risk").header("authorization", &fresh_bearer);
        then.status(200).json_body(json!({ "risk": "low" }));
    });

    let f = functions(endpoint, &[]);
    let delivered = call(&f, &metadata(&server.url("/risk"))).await;

    assert_eq!(delivered.outcome, Outcome::Success);
    assert_eq!(token_hits.load(Ordering::SeqCst), 2);
    assert_eq!(rejected.hits(), 1);
    assert_eq!(accepted.hits(), 1);
}

#[tokio::test]
async fn refreshes_are_bounded() {
    let server = MockServer::start();
    let token = common::jwt("choreo");
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200).json_body(json!({ "access_token": token }));
    });
    let api_mock = server.mock(|when, then| {
        when.method(POST).path("/risk");
        then.status(401).json_body(json!({ "code": "900901" }));
    });

    let f = functions(server.url("/token"), &[]);
    let delivered = call(&f, &metadata(&server.url("/risk"))).await;

    assert_eq!(delivered.outcome, Outcome::Fail);
    // Initial token plus two refreshes
    assert_eq!(token_mock.hits(), 3);
    assert_eq!(api_mock.hits(), 3);
}

#[tokio::test]
async fn other_401_is_not_retried() {
    let server = MockServer::start();
    let token = common::jwt("choreo");
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200).json_body(json!({ "access_token": token }));
    });
    let api_mock = server.mock(|when, then| {
        when.method(POST).path("/risk");
        then.status(401).json_body(json!({ "code": "900902" }));
    });

    let f = functions(server.url("/token"), &[]);
    let delivered = call(&f, &metadata(&server.url("/risk"))).await;

    assert_eq!(delivered.outcome, Outcome::Fail);
    assert_eq!(token_mock.hits(), 1);
    assert_eq!(api_mock.hits(), 1);
}

#[tokio::test]
async fn choreo_allow_list_is_enforced() {
    let server = MockServer::start();
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200).json_body(json!({ "access_token": "t" }));
    });

    let f = functions(server.url("/token"), &["choreo"]);
    let delivered = call(&f, &metadata(&server.url("/risk"))).await;

    assert_eq!(delivered.outcome, Outcome::Fail);
    assert_eq!(token_mock.hits(), 0);
}

#[tokio::test]
async fn missing_consumer_secret_fails() {
    let server = MockServer::start();
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200).json_body(json!({ "access_token": "t" }));
    });

    let mut m = metadata(&server.url("/risk"));
    m.remove("consumerSecret");
    let f = functions(server.url("/token"), &[]);
    let delivered = call(&f, &m).await;

    assert_eq!(delivered.outcome, Outcome::Fail);
    assert_eq!(token_mock.hits(), 0);
}

#[tokio::test]
async fn token_endpoint_falls_back_to_metadata() {
    let server = MockServer::start();
    let token = common::jwt("choreo");
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/metadata-token");
        then.status(200).json_body(json!({ "access_token": token }));
    });
    server.mock(|when, then| {
        when.method(POST).path("/risk");
        then.status(200).json_body(json!({ "risk": "low" }));
    });

    let config = AuthFunctionsConfig {
        allow_insecure_http: true,
        ..AuthFunctionsConfig::default()
    };
    let f = AuthFunctions::new(config, Arc::new(StaticTenantConfig::new()));
    let mut metadata = metadata(&server.url("/risk"));
    metadata.insert("tokenEndpoint".to_owned(), server.url("/metadata-token"));

    let delivered = call(&f, &metadata).await;

    assert_eq!(delivered.outcome, Outcome::Success);
    assert_eq!(token_mock.hits(), 1);
}
