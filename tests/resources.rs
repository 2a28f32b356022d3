mod common;

use common::*;
use restodash::api::{
    MenuItemFilter, RestaurantCreate, RoleUpdate, TenantInput, UserRoleAssignment,
};
use restodash_auth::MemoryStorage;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, restodash::Dashboard) {
    let server = MockServer::start().await;
    let provider = FakeProvider::new();
    let dashboard = dashboard_for(&provider, &MemoryStorage::new(), &server.uri());
    dashboard.store().set_access_token("T");
    (server, dashboard)
}

#[tokio::test]
async fn restaurants_filter_by_tenant() {
    let (server, dashboard) = setup().await;
    Mock::given(method("GET"))
        .and(path("/restaurants/"))
        .and(query_param("tenant_id", "t1"))
        .and(header("Authorization", "Bearer T"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "r1",
            "name": "Trattoria",
            "address": "Via Roma 1",
            "tenant_id": "t1"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let restaurants = dashboard.restaurants().list(Some("t1")).await.unwrap();

    assert_eq!(restaurants.len(), 1);
    assert_eq!(restaurants[0].address, "Via Roma 1");
    assert!(restaurants[0].phone.is_none());
}

#[tokio::test]
async fn create_restaurant_posts_json() {
    let (server, dashboard) = setup().await;
    Mock::given(method("POST"))
        .and(path("/restaurants/"))
        .and(body_json(json!({
            "name": "Trattoria",
            "address": "Via Roma 1",
            "tenant_id": "t1"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "r1",
            "name": "Trattoria",
            "address": "Via Roma 1",
            "tenant_id": "t1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = dashboard
        .restaurants()
        .create(&RestaurantCreate {
            name: "Trattoria".into(),
            address: "Via Roma 1".into(),
            tenant_id: "t1".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(created.id, "r1");
}

#[tokio::test]
async fn menu_items_send_only_set_filters() {
    let (server, dashboard) = setup().await;
    Mock::given(method("GET"))
        .and(path("/menu-items/"))
        .and(query_param("restaurant_id", "r1"))
        .and(query_param("category", "dessert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "m1",
            "name": "Tiramisu",
            "price": 6.5,
            "category": "dessert",
            "tenant_id": "t1",
            "restaurant_id": "r1"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let filter = MenuItemFilter::default().restaurant("r1").category("dessert");
    let items = dashboard.menu_items().list(&filter).await.unwrap();

    assert_eq!(items[0].price, Some(6.5));
    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].url.query().unwrap_or_default().contains("tenant_id"));
}

#[tokio::test]
async fn tenant_update_replaces_with_put() {
    let (server, dashboard) = setup().await;
    Mock::given(method("PUT"))
        .and(path("/tenants/t1"))
        .and(body_json(json!({ "name": "Acme", "status": "active" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t1",
            "name": "Acme",
            "status": "active"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tenant = dashboard
        .tenants()
        .update(
            "t1",
            &TenantInput {
                name: "Acme".into(),
                status: Some("active".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(tenant.status.as_deref(), Some("active"));
}

#[tokio::test]
async fn role_update_uses_patch() {
    let (server, dashboard) = setup().await;
    Mock::given(method("PATCH"))
        .and(path("/roles/role-1"))
        .and(body_json(json!({ "description": "Front of house" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "role-1",
            "name": "waiter",
            "description": "Front of house"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let role = dashboard
        .roles()
        .update(
            "role-1",
            &RoleUpdate {
                description: Some("Front of house".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(role.name, "waiter");
}

#[tokio::test]
async fn role_permissions_assign_and_remove() {
    let (server, dashboard) = setup().await;
    Mock::given(method("POST"))
        .and(path("/roles/role-1/permissions/perm-1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/roles/role-1/permissions/perm-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    dashboard
        .roles()
        .assign_permission("role-1", "perm-1")
        .await
        .unwrap();
    dashboard
        .roles()
        .remove_permission("role-1", "perm-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn user_role_grants() {
    let (server, dashboard) = setup().await;
    Mock::given(method("GET"))
        .and(path("/user-roles/role/role-1"))
        .and(query_param("restaurant_id", "r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "ur1",
            "user_id": "u1",
            "role_id": "role-1",
            "restaurant_id": "r1",
            "roles": { "name": "waiter" },
            "restaurants": { "name": "Trattoria" }
        }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user-roles/"))
        .and(body_json(json!({ "user_id": "u2", "role_id": "role-1" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "ur2",
            "user_id": "u2",
            "role_id": "role-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let holders = dashboard
        .roles()
        .users_with_role("role-1", Some("r1"))
        .await
        .unwrap();
    assert_eq!(
        holders[0].restaurants.as_ref().map(|r| r.name.as_str()),
        Some("Trattoria")
    );

    let granted = dashboard
        .roles()
        .assign_to_user(&UserRoleAssignment {
            user_id: "u2".into(),
            role_id: "role-1".into(),
            restaurant_id: None,
        })
        .await
        .unwrap();
    assert_eq!(granted.id, "ur2");
    assert!(granted.roles.is_none());
}

#[tokio::test]
async fn not_found_surfaces_as_api_error() {
    let (server, dashboard) = setup().await;
    Mock::given(method("GET"))
        .and(path("/tenants/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Tenant not found"))
        .mount(&server)
        .await;

    let err = dashboard.tenants().get("missing").await.unwrap_err();
    assert!(matches!(
        err,
        restodash::error::Error::Api { status: 404, .. }
    ));
}
