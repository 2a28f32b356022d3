mod common;

use std::sync::Arc;

use common::*;
use restodash::prelude::*;
use restodash_auth::MemoryStorage;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn signed_in(provider: &Arc<FakeProvider>, storage: &MemoryStorage, server: &MockServer) -> Dashboard {
    let dashboard = dashboard_for(provider, storage, &server.uri());
    dashboard.store().set_user(Some(AuthUser::new("u1", "a@x.com")));
    dashboard.store().set_access_token("stale");
    dashboard
}

#[tokio::test]
async fn attaches_the_cached_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tenants/"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = FakeProvider::new();
    let dashboard = signed_in(&provider, &MemoryStorage::new(), &server);

    assert!(dashboard.tenants().list().await.unwrap().is_empty());
    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test]
async fn recovers_from_401_with_a_single_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tenants/"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tenants/"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": "t1", "name": "Acme" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = FakeProvider::with_session(session("fresh", "u1", "a@x.com"));
    let storage = MemoryStorage::new();
    let dashboard = signed_in(&provider, &storage, &server);

    let tenants = dashboard.tenants().list().await.unwrap();

    assert_eq!(tenants[0].name, "Acme");
    assert_eq!(dashboard.store().access_token(), "fresh");
    assert_eq!(provider.calls("get_session"), 1);
    assert!(!dashboard.http().is_refreshing());
}

#[tokio::test]
async fn second_401_is_returned_without_another_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/roles/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
        .expect(2)
        .mount(&server)
        .await;

    let provider = FakeProvider::with_session(session("fresh", "u1", "a@x.com"));
    let dashboard = signed_in(&provider, &MemoryStorage::new(), &server);

    let err = dashboard.roles().list().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(provider.calls("get_session"), 1);
    assert!(!dashboard.http().is_refreshing());
}

#[tokio::test]
async fn no_token_after_recovery_means_no_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/roles/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let provider = FakeProvider::new();
    let dashboard = dashboard_for(&provider, &MemoryStorage::new(), &server.uri());

    let err = dashboard.roles().list().await.unwrap_err();

    assert!(matches!(err, Error::Unauthorized(_)));
    assert_eq!(provider.calls("get_user"), 1);
}

#[tokio::test]
async fn user_endpoint_401_is_never_recovered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let provider = FakeProvider::with_session(session("fresh", "u1", "a@x.com"));
    let dashboard = signed_in(&provider, &MemoryStorage::new(), &server);

    let response = dashboard
        .http()
        .get("/auth/v1/user")
        .unwrap()
        .execute_raw()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(provider.total_calls(), 0);
    assert_eq!(dashboard.store().access_token(), "stale");
}

#[tokio::test]
async fn concurrent_401s_trigger_one_recovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tenants/"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tenants/"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = FakeProvider::with_session(session("fresh", "u1", "a@x.com"));
    provider.hold_session_lookups();
    let dashboard = Arc::new(signed_in(&provider, &MemoryStorage::new(), &server));

    let first = {
        let dashboard = dashboard.clone();
        tokio::spawn(async move { dashboard.tenants().list().await })
    };
    eventually(|| provider.calls("get_session") == 1).await;
    assert!(dashboard.http().is_refreshing());

    let (tenants_a, tenants_b) = (dashboard.tenants(), dashboard.tenants());
    let (second, third) = tokio::join!(tenants_a.list(), tenants_b.list());
    assert!(second.unwrap_err().is_unauthorized());
    assert!(third.unwrap_err().is_unauthorized());

    provider.release_session_lookups();
    assert!(first.await.unwrap().is_ok());
    assert_eq!(provider.calls("get_session"), 1);
    assert!(!dashboard.http().is_refreshing());
}

#[tokio::test]
async fn other_failures_pass_through_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/permissions/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = FakeProvider::with_session(session("fresh", "u1", "a@x.com"));
    let dashboard = signed_in(&provider, &MemoryStorage::new(), &server);

    match dashboard.permissions().list().await {
        Err(Error::Api { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected result: {:?}", other.map(|p| p.len())),
    }
    assert_eq!(provider.total_calls(), 0);
}
