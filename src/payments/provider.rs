use crate::checkout::types::StagedOrder;
use crate::payments::error::PaymentResult;
use crate::payments::types::{CallbackVerification, ProviderCheckout, ProviderName, RequestContext};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Gateway adapter contract. New providers implement this trait; nothing in
/// the checkout or reconciliation path branches on a concrete provider.
///
/// `verify_callback` authenticates the payload and reads the provider's
/// success indicator; it must not touch any store. `extract_transaction_id`
/// returns the provider-side id that keys the transient mapping back to the
/// staged order.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> ProviderName;

    async fn build_request(
        &self,
        order: &StagedOrder,
        reference: &str,
        ctx: &RequestContext,
    ) -> PaymentResult<ProviderCheckout>;

    fn verify_callback(&self, payload: &JsonValue) -> PaymentResult<CallbackVerification>;

    fn extract_transaction_id(&self, payload: &JsonValue) -> PaymentResult<String>;
}
