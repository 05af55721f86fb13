use crate::cache::keys::order::{ProviderTxnKey, StagedOrderKey};
use crate::cache::store::{RetryQueue, TransientStore};
use crate::checkout::types::StagedOrder;
use crate::database::order_repository::{NewConfirmedOrder, OrderStore};
use crate::payments::error::PaymentError;
use crate::payments::factory::PaymentProviderFactory;
use crate::payments::types::ProviderName;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Window left for the provider to re-deliver after both the durable insert
/// and the retry-queue push failed.
const RESTAGE_TTL: Duration = Duration::from_secs(900);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid callback signature")]
    InvalidSignature,
    #[error("malformed callback: {0}")]
    Malformed(String),
    #[error("transient store error: {0}")]
    Store(String),
}

/// Outcome of a provider callback. Only `Confirmed` and `QueuedForRetry`
/// consume the staged order; everything else leaves no trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Confirmed {
        order_id: Uuid,
        reference: String,
    },
    /// Payment verified but the durable write failed; the order sits on the
    /// retry queue and the provider gets a success response so it stops
    /// re-delivering.
    QueuedForRetry {
        reference: String,
    },
    PaymentFailed {
        reason: Option<String>,
    },
    /// Mapping expired or already consumed. Idempotent no-op by contract.
    NotFound {
        transaction_id: String,
    },
}

/// Entry parked on the retry queue after a persistence failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReconciliation {
    pub order: NewConfirmedOrder,
    pub attempts: u32,
}

/// Back half of the reconciliation pipeline. The check-and-consume against
/// the transient store is the single correctness-sensitive step: a missing
/// mapping is an outcome, never an error, and the consume is atomic so
/// provider retries can never mint two confirmed orders.
pub struct CallbackReconciler {
    factory: Arc<PaymentProviderFactory>,
    transient: Arc<dyn TransientStore>,
    orders: Arc<dyn OrderStore>,
    retry_queue: Arc<dyn RetryQueue>,
}

impl CallbackReconciler {
    pub fn new(
        factory: Arc<PaymentProviderFactory>,
        transient: Arc<dyn TransientStore>,
        orders: Arc<dyn OrderStore>,
        retry_queue: Arc<dyn RetryQueue>,
    ) -> Self {
        Self {
            factory,
            transient,
            orders,
            retry_queue,
        }
    }

    pub async fn reconcile(
        &self,
        provider: ProviderName,
        payload: &JsonValue,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let adapter = self
            .factory
            .get(provider)
            .map_err(|e| ReconcileError::Malformed(e.to_string()))?;

        let verification = adapter.verify_callback(payload).map_err(|e| match e {
            PaymentError::CallbackVerificationError { .. } => ReconcileError::InvalidSignature,
            other => ReconcileError::Malformed(other.to_string()),
        })?;
        let transaction_id = adapter
            .extract_transaction_id(payload)
            .map_err(|e| ReconcileError::Malformed(e.to_string()))?;

        if !verification.success {
            info!(
                provider = %provider,
                transaction_id = %transaction_id,
                reason = verification.reason.as_deref().unwrap_or("unspecified"),
                "callback reported failed payment"
            );
            return Ok(ReconcileOutcome::PaymentFailed {
                reason: verification.reason,
            });
        }

        // Atomic check-and-consume of the transaction mapping. Exactly one
        // of any set of racing callbacks for this id gets past here.
        let reference = match self
            .transient
            .get_and_delete(&ProviderTxnKey::new(provider, &transaction_id).to_string())
            .await
            .map_err(|e| ReconcileError::Store(e.to_string()))?
        {
            Some(reference) => reference,
            None => {
                info!(
                    provider = %provider,
                    transaction_id = %transaction_id,
                    "no staged mapping for callback, treating as no-op"
                );
                return Ok(ReconcileOutcome::NotFound { transaction_id });
            }
        };

        let staged = match self
            .transient
            .get_and_delete(&StagedOrderKey::new(&reference).to_string())
            .await
            .map_err(|e| ReconcileError::Store(e.to_string()))?
        {
            Some(raw) => serde_json::from_str::<StagedOrder>(&raw)
                .map_err(|e| ReconcileError::Store(format!("corrupt staged order: {}", e)))?,
            None => {
                warn!(
                    reference = %reference,
                    transaction_id = %transaction_id,
                    "mapping present but staged order missing"
                );
                return Ok(ReconcileOutcome::NotFound { transaction_id });
            }
        };

        let order = NewConfirmedOrder::from_staged(
            staged.clone(),
            reference.clone(),
            provider,
            transaction_id.clone(),
        );

        match self.orders.insert(&order).await {
            Ok(order_id) => {
                info!(
                    reference = %reference,
                    order_id = %order_id,
                    total = order.total,
                    "order confirmed"
                );
                Ok(ReconcileOutcome::Confirmed {
                    order_id,
                    reference,
                })
            }
            Err(e) => {
                // The customer has paid; this write cannot be dropped.
                error!(
                    reference = %reference,
                    error = %e,
                    "confirmed-order insert failed, queueing for retry"
                );
                let entry =
                    serde_json::to_string(&PendingReconciliation { order, attempts: 0 })
                        .map_err(|e| ReconcileError::Store(e.to_string()))?;
                if let Err(push_err) = self.retry_queue.push(&entry).await {
                    // Last line of defence: the full payload goes to the log
                    // for operator replay, and the consumed transient entries
                    // go back so the provider's redelivery retries the whole
                    // consume instead of hitting an empty mapping.
                    error!(
                        reference = %reference,
                        error = %push_err,
                        payload = %entry,
                        "retry queue unavailable, re-staging order for redelivery"
                    );
                    self.restage(&reference, provider, &transaction_id, &staged)
                        .await;
                    return Err(ReconcileError::Store(push_err.to_string()));
                }
                Ok(ReconcileOutcome::QueuedForRetry { reference })
            }
        }
    }

    /// Puts the staged order and its transaction mapping back after a failed
    /// queue push. Best effort; failures here are logged, the payload is
    /// already in the log line above.
    async fn restage(
        &self,
        reference: &str,
        provider: ProviderName,
        transaction_id: &str,
        staged: &StagedOrder,
    ) {
        let body = match serde_json::to_string(staged) {
            Ok(body) => body,
            Err(e) => {
                error!(reference = %reference, error = %e, "failed to re-encode staged order");
                return;
            }
        };
        if let Err(e) = self
            .transient
            .set(&StagedOrderKey::new(reference).to_string(), &body, RESTAGE_TTL)
            .await
        {
            error!(reference = %reference, error = %e, "failed to re-stage order body");
        }
        if let Err(e) = self
            .transient
            .set(
                &ProviderTxnKey::new(provider, transaction_id).to_string(),
                reference,
                RESTAGE_TTL,
            )
            .await
        {
            error!(reference = %reference, error = %e, "failed to re-stage transaction mapping");
        }
    }
}
