//! HTTP-level tests over the axum router with in-memory stores.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use dermacart_backend::api::{router, AppState};
use dermacart_backend::cache::store::{MemoryRetryQueue, MemoryTransientStore};
use dermacart_backend::checkout::preparation::OrderPreparation;
use dermacart_backend::database::order_repository::MemoryOrderStore;
use dermacart_backend::health::HealthChecker;
use dermacart_backend::payments::factory::PaymentProviderFactory;
use dermacart_backend::payments::providers::{VnpayConfig, VnpayProvider};
use dermacart_backend::payments::utils::sign_hmac_sha256_hex;
use dermacart_backend::services::checkout::CheckoutService;
use dermacart_backend::services::reconciler::CallbackReconciler;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const VNPAY_SECRET: &str = "vnp_test_secret";
const RESULT_URL: &str = "http://localhost:3000/checkout/result";

fn app() -> Router {
    let transient = Arc::new(MemoryTransientStore::new());
    let orders = Arc::new(MemoryOrderStore::new());
    let retry_queue = Arc::new(MemoryRetryQueue::new());

    let factory = Arc::new(PaymentProviderFactory::empty().with_provider(Arc::new(
        VnpayProvider::new(VnpayConfig {
            tmn_code: "DERMA01".to_string(),
            hash_secret: VNPAY_SECRET.to_string(),
            pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: "http://localhost:8000/payment/callback/vnpay".to_string(),
        }),
    )));

    let checkout = Arc::new(CheckoutService::new(
        OrderPreparation::new(transient.clone(), Duration::from_secs(900)),
        factory.clone(),
        transient.clone(),
    ));
    let reconciler = Arc::new(CallbackReconciler::new(
        factory,
        transient,
        orders.clone(),
        retry_queue,
    ));

    router(Arc::new(AppState {
        checkout,
        reconciler,
        orders,
        health: HealthChecker::new(None, None),
        result_url: RESULT_URL.to_string(),
    }))
}

fn checkout_body() -> Value {
    json!({
        "user_id": "user_linh",
        "provider": "vnpay",
        "items": [
            {"product_id": "serum-01", "name": "Vitamin C Serum", "quantity": 2, "unit_price": 200000},
            {"product_id": "spf-50", "name": "Sunscreen SPF50", "quantity": 1, "unit_price": 100000}
        ],
        "shipping": {
            "recipient_name": "Linh Tran",
            "phone": "+84901234567",
            "address": "12 Hang Bac",
            "city": "Hanoi"
        }
    })
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn post_json(app: &Router, uri: &str, body: &Value) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
        .expect("response")
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response")
}

fn vnpay_query(txn: &str, amount: i64, code: &str) -> String {
    let mac = sign_hmac_sha256_hex(
        format!("{}|{}|{}", txn, amount, code).as_bytes(),
        VNPAY_SECRET,
    );
    format!(
        "/payment/callback/vnpay?vnp_TxnRef={}&vnp_Amount={}&vnp_ResponseCode={}&vnp_SecureHash={}",
        txn, amount, code, mac
    )
}

#[tokio::test]
async fn create_payment_returns_receipt() {
    let app = app();
    let response = post_json(&app, "/payment/create", &checkout_body()).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert!(body["order_reference"]
        .as_str()
        .expect("reference")
        .starts_with("ord_"));
    assert!(body["pay_url"]
        .as_str()
        .expect("pay url")
        .contains("vnp_Amount=500000"));
}

#[tokio::test]
async fn invalid_checkout_reports_field_errors() {
    let app = app();
    let mut body = checkout_body();
    body["items"] = json!([]);
    body["shipping"]["phone"] = json!("");

    let response = post_json(&app, "/payment/create", &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["details"]["errors"]
        .as_array()
        .expect("errors array")
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"items"));
    assert!(fields.contains(&"shipping.phone"));
}

#[tokio::test]
async fn unknown_provider_is_a_400() {
    let app = app();
    let mut body = checkout_body();
    body["provider"] = json!("momo");

    let response = post_json(&app, "/payment/create", &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn vnpay_callback_redirects_and_order_becomes_queryable() {
    let app = app();
    let receipt = json_body(post_json(&app, "/payment/create", &checkout_body()).await).await;
    let txn = receipt["transaction_id"].as_str().expect("txn id");
    let reference = receipt["order_reference"].as_str().expect("reference");

    let response = get(&app, &vnpay_query(txn, 500_000, "00")).await;
    assert!(response.status().is_redirection());
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header");
    assert!(location.starts_with(RESULT_URL));
    assert!(location.contains("status=success"));
    assert!(location.contains(reference));

    // Confirmed order is now served by the order API.
    let response = get(&app, &format!("/orders/{}", reference)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let order = json_body(response).await;
    assert_eq!(order["total"], 500_000);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["reference"], reference);
}

#[tokio::test]
async fn replayed_vnpay_callback_redirects_with_expired_status() {
    let app = app();
    let receipt = json_body(post_json(&app, "/payment/create", &checkout_body()).await).await;
    let txn = receipt["transaction_id"].as_str().expect("txn id");

    let first = get(&app, &vnpay_query(txn, 500_000, "00")).await;
    assert!(first.status().is_redirection());

    let replay = get(&app, &vnpay_query(txn, 500_000, "00")).await;
    let location = replay
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header");
    assert!(location.contains("status=expired"));
}

#[tokio::test]
async fn zalopay_callback_with_bad_mac_reports_mac_mismatch() {
    let app = app();
    let payload = json!({
        "app_trans_id": "260825_x",
        "amount": 500_000,
        "status": 1,
        "mac": "deadbeef",
    });

    // Zalopay is not registered in this router, so the reconciler rejects
    // the provider before looking at the mac.
    let response = post_json(&app, "/payment/callback/zalopay", &payload).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_status_transitions_through_the_api() {
    let app = app();
    let receipt = json_body(post_json(&app, "/payment/create", &checkout_body()).await).await;
    let txn = receipt["transaction_id"].as_str().expect("txn id");
    let reference = receipt["order_reference"]
        .as_str()
        .expect("reference")
        .to_string();
    get(&app, &vnpay_query(txn, 500_000, "00")).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/orders/{}/status", reference))
                .header("content-type", "application/json")
                .body(Body::from(json!({"status": "processing"}).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "processing");

    // Processing cannot jump straight to delivered.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/orders/{}/status", reference))
                .header("content-type", "application/json")
                .body(Body::from(json!({"status": "delivered"}).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_order_is_a_404() {
    let app = app();
    let response = get(&app, "/orders/ord_missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "ORDER_NOT_FOUND");
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let app = app().layer(dermacart_backend::api::cors_layer(&[
        "http://localhost:3000".to_string()
    ]));

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/payment/create")
                .header("origin", "http://localhost:3000")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );
}

#[tokio::test]
async fn health_endpoint_reports_ok_with_memory_stores() {
    let app = app();
    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
}
