//! Checkout and payment-callback HTTP handlers.
//!
//! Two callback shapes are served: VNPay returns the customer's browser via
//! a signed redirect, so its handler answers with another redirect to the
//! storefront result page; ZaloPay calls server-to-server with JSON and
//! expects a `return_code` body telling it whether to re-deliver.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::checkout::types::CheckoutRequest;
use crate::database::order_repository::OrderStore;
use crate::error::{AppError, AppErrorKind, InfrastructureError, ValidationError};
use crate::health::HealthChecker;
use crate::payments::types::{ProviderName, RequestContext};
use crate::services::checkout::{CheckoutError, CheckoutService};
use crate::services::reconciler::{CallbackReconciler, ReconcileError, ReconcileOutcome};

/// Shared state handed to every handler.
pub struct AppState {
    pub checkout: Arc<CheckoutService>,
    pub reconciler: Arc<CallbackReconciler>,
    pub orders: Arc<dyn OrderStore>,
    pub health: HealthChecker,
    /// Storefront page redirect-style callbacks send the customer back to
    pub result_url: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/payment/create", post(create_payment))
        .route("/payment/callback/vnpay", get(vnpay_callback))
        .route("/payment/callback/zalopay", post(zalopay_callback))
        .route("/orders/{reference}", get(super::orders::get_order))
        .route(
            "/orders/{reference}/status",
            patch(super::orders::update_order_status),
        )
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let status = state.health.check_health().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status)).into_response()
}

/// Best-effort client IP: first hop of `X-Forwarded-For`, falling back to
/// loopback when the service is reached directly.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/// POST /payment/create
async fn create_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, AppError> {
    let ctx = RequestContext {
        client_ip: client_ip(&headers),
    };

    match state.checkout.create_payment(request, ctx).await {
        Ok(receipt) => Ok((StatusCode::CREATED, Json(receipt)).into_response()),
        Err(CheckoutError::Validation(errors)) => {
            let details = json!({
                "errors": errors
                    .iter()
                    .map(|e| json!({"field": e.field, "message": e.message}))
                    .collect::<Vec<_>>(),
            });
            Err(AppError::new(AppErrorKind::Validation(
                ValidationError::CheckoutRejected { details },
            )))
        }
        Err(CheckoutError::Payment(e)) => Err(e.into()),
        Err(CheckoutError::Store(message)) => Err(AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Cache { message },
        ))),
    }
}

/// GET /payment/callback/vnpay
///
/// The customer's browser arrives here carrying VNPay's signed query string.
/// Whatever happened, the answer is a redirect to the storefront result page
/// with a coarse status flag; details stay in the logs.
async fn vnpay_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let payload = json!(params);

    match state
        .reconciler
        .reconcile(ProviderName::Vnpay, &payload)
        .await
    {
        Ok(ReconcileOutcome::Confirmed { reference, .. })
        | Ok(ReconcileOutcome::QueuedForRetry { reference }) => {
            Redirect::to(&format!(
                "{}?status=success&order={}",
                state.result_url, reference
            ))
            .into_response()
        }
        Ok(ReconcileOutcome::PaymentFailed { reason }) => {
            info!(
                reason = reason.as_deref().unwrap_or("unspecified"),
                "vnpay reported failed payment"
            );
            Redirect::to(&format!("{}?status=failed", state.result_url)).into_response()
        }
        Ok(ReconcileOutcome::NotFound { transaction_id }) => {
            info!(transaction_id = %transaction_id, "vnpay callback for unknown order");
            Redirect::to(&format!("{}?status=expired", state.result_url)).into_response()
        }
        Err(ReconcileError::Malformed(detail)) => {
            warn!(detail = %detail, "malformed vnpay callback");
            (StatusCode::BAD_REQUEST, "Invalid callback").into_response()
        }
        Err(e) => {
            error!(error = %e, "vnpay callback processing failed");
            Redirect::to(&format!("{}?status=error", state.result_url)).into_response()
        }
    }
}

/// POST /payment/callback/zalopay
///
/// Server-to-server. The body tells ZaloPay whether to stop re-delivering:
/// `1` acknowledges (including idempotent no-ops), `-1` flags a bad mac, and
/// `0` asks for another delivery after a transient store failure.
async fn zalopay_callback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<JsonValue>,
) -> Response {
    match state
        .reconciler
        .reconcile(ProviderName::Zalopay, &payload)
        .await
    {
        Ok(ReconcileOutcome::Confirmed { .. }) | Ok(ReconcileOutcome::QueuedForRetry { .. }) => {
            Json(json!({"return_code": 1, "return_message": "success"})).into_response()
        }
        Ok(ReconcileOutcome::PaymentFailed { reason }) => {
            info!(
                reason = reason.as_deref().unwrap_or("unspecified"),
                "zalopay reported failed payment"
            );
            Json(json!({"return_code": 1, "return_message": "success"})).into_response()
        }
        Ok(ReconcileOutcome::NotFound { transaction_id }) => {
            info!(transaction_id = %transaction_id, "zalopay callback for unknown order");
            Json(json!({"return_code": 1, "return_message": "success"})).into_response()
        }
        Err(ReconcileError::InvalidSignature) => {
            warn!("zalopay callback failed mac verification");
            Json(json!({"return_code": -1, "return_message": "mac not matched"})).into_response()
        }
        Err(ReconcileError::Malformed(detail)) => {
            warn!(detail = %detail, "malformed zalopay callback");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"return_code": -1, "return_message": "invalid payload"})),
            )
                .into_response()
        }
        Err(ReconcileError::Store(detail)) => {
            error!(detail = %detail, "zalopay callback hit store failure");
            Json(json!({"return_code": 0, "return_message": "retry later"})).into_response()
        }
    }
}
