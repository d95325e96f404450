mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use common::{response_json, TestApp};

fn number(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().expect("numeric string"),
        Value::Number(n) => n.as_f64().expect("finite number"),
        other => panic!("expected a number, got {other}"),
    }
}

async fn seed_percentage_code(app: &TestApp, code: &str, percent: u32) -> String {
    let response = app
        .request_admin(
            Method::POST,
            "/api/v1/admin/discount-codes",
            Some(json!({
                "code": code,
                "discount_type": "percentage",
                "discount_value": percent
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await["id"]
        .as_str()
        .unwrap()
        .to_string()
}

fn cart_body(discount: Option<&str>) -> Value {
    json!({
        "items": [{
            "product_id": "sticker-3in",
            "product_name": "3\" Die Cut Sticker",
            "quantity": 2,
            "unit_price": 25.0
        }],
        "customer_email": "buyer@example.com",
        "discount_code": discount,
        "shipping_amount": 5.0,
        "tax_amount": 4.5
    })
}

#[tokio::test]
async fn apply_and_remove_discount_on_session() {
    let app = TestApp::new().await;
    seed_percentage_code(&app, "SAVE20", 20).await;

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/apply",
            Some(json!({"code": "save20", "order_amount": 50.0})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["applied"]["code"], "SAVE20");
    assert_eq!(number(&body["applied"]["amount"]), 10.0);
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/remove",
            Some(json!({"session_id": session_id})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn store_credit_blocks_codes_before_lookup() {
    let app = TestApp::new().await;

    // No code is seeded: if the rule fires before the lookup, the unknown
    // code never surfaces.
    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/apply",
            Some(json!({
                "code": "ANYTHING",
                "order_amount": 50.0,
                "has_store_credit": true,
                "store_credit_amount": 25.0
            })),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(
        body["message"],
        "Cannot apply discount codes with store credit. Remove store credit to use discount codes."
    );
}

#[tokio::test]
async fn reorder_discount_blocks_codes_and_names_the_amount() {
    let app = TestApp::new().await;

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/apply",
            Some(json!({
                "code": "ANYTHING",
                "order_amount": 50.0,
                "has_reorder_discount": true,
                "reorder_discount_amount": 4.0
            })),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["valid"], false);
    assert!(body["message"].as_str().unwrap().contains("$4.00"));

    // Without a fixed amount the message falls back to the percentage.
    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/apply",
            Some(json!({
                "code": "ANYTHING",
                "order_amount": 50.0,
                "has_reorder_discount": true
            })),
        )
        .await;
    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("10%"));
}

#[tokio::test]
async fn second_code_is_rejected_until_the_first_is_removed() {
    let app = TestApp::new().await;
    seed_percentage_code(&app, "FIRST", 10).await;
    seed_percentage_code(&app, "SECOND", 20).await;

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/apply",
            Some(json!({"code": "FIRST", "order_amount": 50.0})),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["valid"], true);
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/apply",
            Some(json!({"session_id": session_id, "code": "SECOND", "order_amount": 50.0})),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["show_reset_option"], true);
    assert!(body["message"].as_str().unwrap().contains("\"FIRST\""));

    // Re-sending the applied code still answers success.
    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/apply",
            Some(json!({"session_id": session_id, "code": "first", "order_amount": 50.0})),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["applied"]["code"], "FIRST");

    // After removal the second code goes through.
    app.request_json(
        Method::POST,
        "/api/v1/checkout/discount/remove",
        Some(json!({"session_id": session_id})),
    )
    .await;
    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/apply",
            Some(json!({"session_id": session_id, "code": "SECOND", "order_amount": 50.0})),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["applied"]["code"], "SECOND");
}

#[tokio::test]
async fn force_reset_rotates_the_session() {
    let app = TestApp::new().await;
    seed_percentage_code(&app, "STUCK", 10).await;

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/apply",
            Some(json!({"code": "STUCK", "order_amount": 50.0})),
        )
        .await;
    let body = response_json(response).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/discount/reset",
            Some(json!({"session_id": session_id})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["old_session_id"], session_id.as_str());
    assert_ne!(body["new_session_id"], session_id.as_str());
}

#[tokio::test]
async fn checkout_session_composes_totals_and_consumes_usage_once() {
    let app = TestApp::new().await;
    let code_id = seed_percentage_code(&app, "SAVE20", 20).await;

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/session",
            Some(cart_body(Some("SAVE20"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["checkout_url"].as_str().unwrap().starts_with("https://pay.example"));

    // 50 - 10 + 5 + 4.50
    assert_eq!(number(&body["totals"]["subtotal"]), 50.0);
    assert_eq!(number(&body["totals"]["discount_amount"]), 10.0);
    assert_eq!(number(&body["totals"]["total"]), 49.5);
    assert_eq!(body["customer_order"]["discount_code"], "SAVE20");
    assert_eq!(body["customer_order"]["payment_status"], "awaiting_payment");

    assert_eq!(app.gateway.checkout_call_count(), 1);

    let response = app
        .request_admin(
            Method::GET,
            &format!("/api/v1/admin/discount-codes/{code_id}/stats"),
            None,
        )
        .await;
    let stats = response_json(response).await;
    assert_eq!(stats["usage_count"], 1);
}

#[tokio::test]
async fn checkout_rejects_combined_discount_sources() {
    let app = TestApp::new().await;
    seed_percentage_code(&app, "SAVE20", 20).await;

    let mut body = cart_body(Some("SAVE20"));
    body["has_reorder_discount"] = json!(true);
    let response = app
        .request_json(Method::POST, "/api/v1/checkout/session", Some(body))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.gateway.checkout_call_count(), 0);

    let mut body = cart_body(Some("SAVE20"));
    body["credits_to_apply"] = json!(10.0);
    let response = app
        .request_json(Method::POST, "/api/v1/checkout/session", Some(body))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.gateway.checkout_call_count(), 0);
}

#[tokio::test]
async fn gateway_failure_surfaces_message_and_consumes_no_usage() {
    let app = TestApp::new().await;
    let code_id = seed_percentage_code(&app, "SAVE20", 20).await;

    app.gateway.fail_next_call();
    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/session",
            Some(cart_body(Some("SAVE20"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("gateway rejected the session"));

    // No order was placed, so the code keeps its use.
    let response = app
        .request_admin(
            Method::GET,
            &format!("/api/v1/admin/discount-codes/{code_id}/stats"),
            None,
        )
        .await;
    let stats = response_json(response).await;
    assert_eq!(stats["usage_count"], 0);
}

#[tokio::test]
async fn checkout_rejects_invalid_code_before_gateway() {
    let app = TestApp::new().await;

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/session",
            Some(cart_body(Some("NOPE"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Invalid discount code"));
    assert_eq!(app.gateway.checkout_call_count(), 0);
}

#[tokio::test]
async fn free_shipping_code_zeroes_the_shipping_line() {
    let app = TestApp::new().await;
    let response = app
        .request_admin(
            Method::POST,
            "/api/v1/admin/discount-codes",
            Some(json!({
                "code": "SHIPFREE",
                "discount_type": "free_shipping",
                "discount_value": 0
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/session",
            Some(cart_body(Some("SHIPFREE"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(number(&body["totals"]["discount_amount"]), 0.0);
    assert_eq!(number(&body["totals"]["shipping_amount"]), 0.0);
    // 50 + 4.50 tax, shipping waived
    assert_eq!(number(&body["totals"]["total"]), 54.5);
}

#[tokio::test]
async fn reorder_discount_applies_automatically() {
    let app = TestApp::new().await;

    let mut body = cart_body(None);
    body["has_reorder_discount"] = json!(true);
    let response = app
        .request_json(Method::POST, "/api/v1/checkout/session", Some(body))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    // 10% of 50, then shipping and tax
    assert_eq!(number(&body["totals"]["discount_amount"]), 5.0);
    assert_eq!(number(&body["totals"]["total"]), 54.5);
    assert!(body["customer_order"]["discount_code"].is_null());
}

#[tokio::test]
async fn garbage_money_inputs_coerce_to_zero() {
    let app = TestApp::new().await;

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({
                "items": [{
                    "product_id": "sticker-3in",
                    "product_name": "3\" Die Cut Sticker",
                    "quantity": 2,
                    "unit_price": 25.0
                }],
                "customer_email": "buyer@example.com",
                "shipping_amount": "not-a-number",
                "tax_amount": null
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(number(&body["totals"]["shipping_amount"]), 0.0);
    assert_eq!(number(&body["totals"]["tax_amount"]), 0.0);
    assert_eq!(number(&body["totals"]["total"]), 50.0);
}

#[tokio::test]
async fn session_remove_is_idempotent_for_unknown_sessions() {
    let app = TestApp::new().await;

    let response = app
        .request_json(
            Method::POST,
            "/api/v1/discounts/session/remove",
            Some(json!({"session_id": Uuid::new_v4()})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
}
