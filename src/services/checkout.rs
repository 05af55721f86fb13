use crate::cache::keys::order::ProviderTxnKey;
use crate::cache::store::TransientStore;
use crate::checkout::preparation::OrderPreparation;
use crate::checkout::types::{CheckoutRequest, FieldError};
use crate::payments::error::PaymentError;
use crate::payments::factory::PaymentProviderFactory;
use crate::payments::types::{ProviderName, RequestContext};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("checkout validation failed")]
    Validation(Vec<FieldError>),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("transient store error: {0}")]
    Store(String),
}

/// What the client gets back from `POST /payment/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order_reference: String,
    pub provider: ProviderName,
    pub transaction_id: String,
    pub pay_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<JsonValue>,
}

/// Front half of the reconciliation pipeline: validate, stage, hand off to
/// the provider adapter, and record the transaction-id mapping the callback
/// will need.
pub struct CheckoutService {
    preparation: OrderPreparation,
    factory: Arc<PaymentProviderFactory>,
    transient: Arc<dyn TransientStore>,
}

impl CheckoutService {
    pub fn new(
        preparation: OrderPreparation,
        factory: Arc<PaymentProviderFactory>,
        transient: Arc<dyn TransientStore>,
    ) -> Self {
        Self {
            preparation,
            factory,
            transient,
        }
    }

    pub async fn create_payment(
        &self,
        request: CheckoutRequest,
        ctx: RequestContext,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let provider_name = ProviderName::from_str(&request.provider)?;
        let adapter = self.factory.get(provider_name)?;
        let validated = request.validate().map_err(CheckoutError::Validation)?;

        let (reference, staged) = self
            .preparation
            .stage(validated)
            .await
            .map_err(|e| CheckoutError::Store(e.to_string()))?;

        let checkout = adapter.build_request(&staged, &reference, &ctx).await?;

        // The mapping shares the staged order's TTL: once the order can no
        // longer be reconciled, the transaction id should dangle too.
        self.transient
            .set(
                &ProviderTxnKey::new(checkout.provider, &checkout.transaction_id).to_string(),
                &reference,
                self.preparation.ttl(),
            )
            .await
            .map_err(|e| CheckoutError::Store(e.to_string()))?;

        info!(
            reference = %reference,
            provider = %checkout.provider,
            transaction_id = %checkout.transaction_id,
            total = staged.total,
            "payment created"
        );

        Ok(CheckoutReceipt {
            order_reference: reference,
            provider: checkout.provider,
            transaction_id: checkout.transaction_id,
            pay_url: checkout.pay_url,
            provider_data: checkout.provider_data,
        })
    }
}
