//! Confirmed-order lookup and fulfilment handlers.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::database::order_repository::OrderStatus;
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

/// GET /orders/{reference}
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let order = state
        .orders
        .find_by_reference(&reference)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| {
            AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
                reference: reference.clone(),
            }))
        })?;

    Ok(Json(order).into_response())
}

/// PATCH /orders/{reference}/status
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Response, AppError> {
    let next: OrderStatus = body.status.parse().map_err(|_| {
        AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: "status".to_string(),
            reason: format!("unknown status '{}'", body.status),
        }))
    })?;

    let order = state
        .orders
        .find_by_reference(&reference)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| {
            AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
                reference: reference.clone(),
            }))
        })?;

    let updated = state
        .orders
        .update_status(order.id, next)
        .await
        .map_err(AppError::from)?;

    info!(
        reference = %reference,
        from = %order.status,
        to = %updated.status,
        "order status updated"
    );

    Ok(Json(updated).into_response())
}
