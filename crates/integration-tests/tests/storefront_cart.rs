//! Integration tests for `/api/cart`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pawpantry_core::UserId;
use pawpantry_integration_tests::{TestContext, authed_request, body_json};
use serde_json::{Value, json};
use uuid::Uuid;
use wiremock::matchers::{header as header_eq, headers, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const KIBBLE: &str = "0b6f7c1e-1111-4a4a-8b8b-000000000001";
const TREATS: &str = "0b6f7c1e-2222-4a4a-8b8b-000000000002";

async fn mount_cart_row(ctx: &TestContext, user_id: UserId, items: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/carts"))
        .and(query_param("user_id", format!("eq.{user_id}").as_str()))
        .and(header_eq("apikey", "service-role-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "user_id": user_id.to_string(),
            "items": items,
            "updated_at": "2026-01-05T10:00:00Z",
        }])))
        .mount(&ctx.server)
        .await;
}

async fn mount_empty_cart(ctx: &TestContext) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/carts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&ctx.server)
        .await;
}

async fn mount_stock(ctx: &TestContext, shortfalls: Value) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/check_stock"))
        .respond_with(ResponseTemplate::new(200).set_body_json(shortfalls))
        .mount(&ctx.server)
        .await;
}

/// Upsert mock that echoes a fixed representation.
async fn mount_upsert(ctx: &TestContext, user_id: UserId, items: Value) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/carts"))
        .and(query_param("on_conflict", "user_id"))
        .and(headers(
            "prefer",
            vec!["resolution=merge-duplicates", "return=representation"],
        ))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "user_id": user_id.to_string(),
            "items": items,
            "updated_at": "2026-01-05T10:05:00Z",
        }])))
        .mount(&ctx.server)
        .await;
}

/// Items array of the single upsert the backend received.
async fn upserted_items(ctx: &TestContext) -> Value {
    let requests = ctx.server.received_requests().await.expect("recording");
    let upsert = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path() == "/rest/v1/carts")
        .expect("upsert request");
    let body: Value = serde_json::from_slice(&upsert.body).expect("json upsert");
    body[0]["items"].clone()
}

// ============================================================================
// Authentication and role
// ============================================================================

#[tokio::test]
async fn test_cart_without_bearer_is_unauthorized() {
    let ctx = TestContext::new().await;

    let response = ctx
        .send(Request::get("/api/cart").body(Body::empty()).expect("request"))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_rejected_token_is_unauthorized() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "invalid JWT" })))
        .mount(&ctx.server)
        .await;

    let response = ctx.send(authed_request("GET", "/api/cart", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_customer_is_forbidden() {
    let ctx = TestContext::new().await;
    ctx.mount_user(UserId::new(Uuid::new_v4()), Some("admin")).await;

    let response = ctx.send(authed_request("GET", "/api/cart", None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_profile_is_forbidden() {
    let ctx = TestContext::new().await;
    ctx.mount_user(UserId::new(Uuid::new_v4()), None).await;

    let response = ctx.send(authed_request("GET", "/api/cart", None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unconfigured_backend_is_server_error() {
    let ctx = TestContext::with_config_adjusted(|config| config.backend.url = None).await;

    let response = ctx.send(authed_request("GET", "/api/cart", None)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Server misconfigured");
}

#[tokio::test]
async fn test_role_is_cached_between_requests() {
    let ctx = TestContext::new().await;
    let user_id = UserId::new(Uuid::new_v4());
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": user_id.to_string() })))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "role": "customer" }])))
        .expect(1)
        .mount(&ctx.server)
        .await;
    mount_empty_cart(&ctx).await;

    for _ in 0..3 {
        let response = ctx.send(authed_request("GET", "/api/cart", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// ============================================================================
// Reads and mutations
// ============================================================================

#[tokio::test]
async fn test_get_without_row_returns_empty_cart() {
    let ctx = TestContext::new().await;
    let user_id = ctx.mount_customer().await;
    mount_empty_cart(&ctx).await;

    let response = ctx.send(authed_request("GET", "/api/cart", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], user_id.to_string());
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["total_quantity"], 0);
}

#[tokio::test]
async fn test_add_merges_into_existing_line() {
    let ctx = TestContext::new().await;
    let user_id = ctx.mount_customer().await;
    mount_cart_row(
        &ctx,
        user_id,
        json!([
            { "product_id": KIBBLE, "quantity": 2 },
            { "product_id": TREATS, "quantity": 1 },
        ]),
    )
    .await;
    mount_stock(&ctx, json!([])).await;
    let merged = json!([
        { "product_id": KIBBLE, "quantity": 5 },
        { "product_id": TREATS, "quantity": 1 },
    ]);
    mount_upsert(&ctx, user_id, merged.clone()).await;

    let response = ctx
        .send(authed_request(
            "POST",
            "/api/cart",
            Some(&json!({ "product_id": KIBBLE, "quantity": 3 })),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(upserted_items(&ctx).await, merged);
    let body = body_json(response).await;
    assert_eq!(body["total_quantity"], 6);
}

#[tokio::test]
async fn test_add_defaults_quantity_to_one() {
    let ctx = TestContext::new().await;
    let user_id = ctx.mount_customer().await;
    mount_empty_cart(&ctx).await;
    mount_stock(&ctx, json!([])).await;
    mount_upsert(&ctx, user_id, json!([{ "product_id": TREATS, "quantity": 1 }])).await;

    let response = ctx
        .send(authed_request(
            "POST",
            "/api/cart",
            Some(&json!({ "product_id": TREATS })),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        upserted_items(&ctx).await,
        json!([{ "product_id": TREATS, "quantity": 1 }])
    );
}

#[tokio::test]
async fn test_add_with_stock_shortfall_is_rejected() {
    let ctx = TestContext::new().await;
    ctx.mount_customer().await;
    mount_empty_cart(&ctx).await;
    mount_stock(&ctx, json!([{ "product_id": KIBBLE, "available": 2 }])).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/carts"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&ctx.server)
        .await;

    let response = ctx
        .send(authed_request(
            "POST",
            "/api/cart",
            Some(&json!({ "product_id": KIBBLE, "quantity": 5 })),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().is_some_and(|e| e.contains(KIBBLE)));
}

#[tokio::test]
async fn test_add_rejects_out_of_range_quantity() {
    let ctx = TestContext::new().await;
    ctx.mount_customer().await;
    mount_empty_cart(&ctx).await;

    let response = ctx
        .send(authed_request(
            "POST",
            "/api/cart",
            Some(&json!({ "product_id": KIBBLE, "quantity": 0 })),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_zero_removes_line() {
    let ctx = TestContext::new().await;
    let user_id = ctx.mount_customer().await;
    mount_cart_row(
        &ctx,
        user_id,
        json!([
            { "product_id": KIBBLE, "quantity": 2 },
            { "product_id": TREATS, "quantity": 1 },
        ]),
    )
    .await;
    mount_upsert(&ctx, user_id, json!([{ "product_id": TREATS, "quantity": 1 }])).await;

    let response = ctx
        .send(authed_request(
            "PATCH",
            "/api/cart",
            Some(&json!({ "product_id": KIBBLE, "quantity": 0 })),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        upserted_items(&ctx).await,
        json!([{ "product_id": TREATS, "quantity": 1 }])
    );
}

#[tokio::test]
async fn test_patch_unknown_line_is_not_found() {
    let ctx = TestContext::new().await;
    ctx.mount_customer().await;
    mount_empty_cart(&ctx).await;

    let response = ctx
        .send(authed_request(
            "PATCH",
            "/api/cart",
            Some(&json!({ "product_id": KIBBLE, "quantity": 2 })),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_line_and_unknown_line() {
    let ctx = TestContext::new().await;
    let user_id = ctx.mount_customer().await;
    mount_cart_row(&ctx, user_id, json!([{ "product_id": KIBBLE, "quantity": 2 }])).await;
    mount_upsert(&ctx, user_id, json!([])).await;

    let response = ctx
        .send(authed_request(
            "DELETE",
            &format!("/api/cart?product_id={KIBBLE}"),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(upserted_items(&ctx).await, json!([]));

    let response = ctx
        .send(authed_request(
            "DELETE",
            &format!("/api/cart?product_id={TREATS}"),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_without_product_clears_cart() {
    let ctx = TestContext::new().await;
    let user_id = ctx.mount_customer().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/carts"))
        .and(query_param("user_id", format!("eq.{user_id}").as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let response = ctx.send(authed_request("DELETE", "/api/cart", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["total_quantity"], 0);
}

#[tokio::test]
async fn test_reads_are_not_rate_limited() {
    let ctx = TestContext::with_config_adjusted(|config| {
        config.rate_limits.cart.limit = 1;
    })
    .await;
    ctx.mount_customer().await;
    mount_empty_cart(&ctx).await;

    for _ in 0..3 {
        let response = ctx.send(authed_request("GET", "/api/cart", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = ctx.send(authed_request("DELETE", "/api/cart?product_id=x", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = ctx.send(authed_request("DELETE", "/api/cart?product_id=x", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
