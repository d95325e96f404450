mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{response_json, TestApp};

fn number(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().expect("numeric string"),
        Value::Number(n) => n.as_f64().expect("finite number"),
        other => panic!("expected a number, got {other}"),
    }
}

async fn create_code(app: &TestApp, body: Value) -> Value {
    let response = app
        .request_admin(Method::POST, "/api/v1/admin/discount-codes", Some(body))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await
}

#[tokio::test]
async fn admin_routes_require_api_key() {
    let app = TestApp::new().await;

    let response = app
        .request_json(Method::GET, "/api/v1/admin/discount-codes", None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::GET,
            "/api/v1/admin/discount-codes",
            None,
            &[("x-api-key", "wrong-key-wrong-key")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request_admin(Method::GET, "/api/v1/admin/discount-codes", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_canonicalizes_code_and_rejects_duplicates() {
    let app = TestApp::new().await;

    let created = create_code(
        &app,
        json!({
            "code": "  save20 ",
            "discount_type": "percentage",
            "discount_value": 20
        }),
    )
    .await;
    assert_eq!(created["code"], "SAVE20");
    assert_eq!(created["usage_count"], 0);
    assert_eq!(created["active"], true);

    // Same code in another case collides.
    let response = app
        .request_admin(
            Method::POST,
            "/api/v1/admin/discount-codes",
            Some(json!({
                "code": "Save20",
                "discount_type": "fixed_amount",
                "discount_value": 5
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn validate_endpoint_reports_discount_amount() {
    let app = TestApp::new().await;
    create_code(
        &app,
        json!({
            "code": "SAVE20",
            "discount_type": "percentage",
            "discount_value": 20
        }),
    )
    .await;

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/discounts/validate",
            Some(json!({"code": "save20", "order_amount": 50.0})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["discount_code"]["code"], "SAVE20");
    assert_eq!(number(&body["discount_amount"]), 10.0);
}

#[tokio::test]
async fn validate_endpoint_rejections_are_not_errors() {
    let app = TestApp::new().await;
    create_code(
        &app,
        json!({
            "code": "BIGSPENDER",
            "discount_type": "fixed_amount",
            "discount_value": 15,
            "minimum_order_amount": 100
        }),
    )
    .await;

    // Unknown code.
    let response = app
        .request_json(
            Method::POST,
            "/api/v1/discounts/validate",
            Some(json!({"code": "NOPE", "order_amount": 50.0})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "Invalid discount code");

    // Below the minimum order amount.
    let response = app
        .request_json(
            Method::POST,
            "/api/v1/discounts/validate",
            Some(json!({"code": "BIGSPENDER", "order_amount": 50.0})),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["valid"], false);
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("requires a minimum order of $100.00"),
        "unexpected message: {}",
        body["message"]
    );
}

#[tokio::test]
async fn validation_never_consumes_usage() {
    let app = TestApp::new().await;
    let created = create_code(
        &app,
        json!({
            "code": "ONCE",
            "discount_type": "fixed_amount",
            "discount_value": 5,
            "usage_limit": 1
        }),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    for _ in 0..3 {
        let response = app
            .request_json(
                Method::POST,
                "/api/v1/discounts/validate",
                Some(json!({"code": "ONCE", "order_amount": 50.0})),
            )
            .await;
        let body = response_json(response).await;
        assert_eq!(body["valid"], true);
    }

    let response = app
        .request_admin(
            Method::GET,
            &format!("/api/v1/admin/discount-codes/{id}/stats"),
            None,
        )
        .await;
    let stats = response_json(response).await;
    assert_eq!(stats["usage_count"], 0);
    assert_eq!(stats["remaining_uses"], 1);
}

#[tokio::test]
async fn usage_increment_stops_exactly_at_the_limit() {
    let app = TestApp::new().await;
    let created = create_code(
        &app,
        json!({
            "code": "LASTONE",
            "discount_type": "fixed_amount",
            "discount_value": 5,
            "usage_limit": 1
        }),
    )
    .await;
    let id: uuid::Uuid = created["id"].as_str().unwrap().parse().unwrap();

    let service = &app.state.services.discount_codes;
    service.increment_usage(id).await.expect("first redemption");

    // A second redemption races against a spent code; the conditional
    // update touches zero rows and reports exhaustion.
    let err = service.increment_usage(id).await.unwrap_err();
    assert!(err.to_string().contains("usage limit"));

    let response = app
        .request_admin(
            Method::GET,
            &format!("/api/v1/admin/discount-codes/{id}/stats"),
            None,
        )
        .await;
    let stats = response_json(response).await;
    assert_eq!(stats["usage_count"], 1);
    assert_eq!(stats["remaining_uses"], 0);
}

#[tokio::test]
async fn update_cannot_change_code_but_can_deactivate() {
    let app = TestApp::new().await;
    let created = create_code(
        &app,
        json!({
            "code": "TOGGLE",
            "discount_type": "percentage",
            "discount_value": 10
        }),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let response = app
        .request_admin(
            Method::PUT,
            &format!("/api/v1/admin/discount-codes/{id}"),
            Some(json!({"active": false, "discount_value": 15})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = response_json(response).await;
    assert_eq!(updated["code"], "TOGGLE");
    assert_eq!(updated["active"], false);
    assert_eq!(number(&updated["discount_value"]), 15.0);

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/discounts/validate",
            Some(json!({"code": "TOGGLE", "order_amount": 50.0})),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "This discount code is no longer active");
}

#[tokio::test]
async fn unused_code_deletes_outright() {
    let app = TestApp::new().await;
    let created = create_code(
        &app,
        json!({
            "code": "EPHEMERAL",
            "discount_type": "percentage",
            "discount_value": 5
        }),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let response = app
        .request_admin(
            Method::DELETE,
            &format!("/api/v1/admin/discount-codes/{id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["removed"], true);

    let response = app
        .request_admin(
            Method::GET,
            &format!("/api/v1/admin/discount-codes/{id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_paginates_newest_first() {
    let app = TestApp::new().await;
    for i in 0..3 {
        create_code(
            &app,
            json!({
                "code": format!("PAGE{i}"),
                "discount_type": "percentage",
                "discount_value": 5
            }),
        )
        .await;
    }

    let response = app
        .request_admin(
            Method::GET,
            "/api/v1/admin/discount-codes?page=1&per_page=2",
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["total_pages"], 2);
}
