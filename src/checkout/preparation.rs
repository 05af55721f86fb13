use crate::cache::error::CacheResult;
use crate::cache::keys::order::StagedOrderKey;
use crate::cache::store::TransientStore;
use crate::checkout::types::{generate_order_reference, StagedOrder, ValidatedCheckout, CURRENCY};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Stages validated checkouts in the transient store under a fresh order
/// reference. Nothing durable happens here; the staged order either gets
/// consumed by a verified callback or ages out with the TTL.
pub struct OrderPreparation {
    store: Arc<dyn TransientStore>,
    ttl: Duration,
}

impl OrderPreparation {
    pub fn new(store: Arc<dyn TransientStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn stage(&self, checkout: ValidatedCheckout) -> CacheResult<(String, StagedOrder)> {
        let total = StagedOrder::compute_total(&checkout.items);
        let staged = StagedOrder {
            user_id: checkout.user_id,
            items: checkout.items,
            shipping: checkout.shipping,
            total,
            currency: CURRENCY.to_string(),
            created_at: Utc::now(),
        };

        let reference = generate_order_reference();
        let body = serde_json::to_string(&staged)?;
        self.store
            .set(&StagedOrderKey::new(&reference).to_string(), &body, self.ttl)
            .await?;

        info!(
            reference = %reference,
            total = staged.total,
            items = staged.items.len(),
            "order staged"
        );
        Ok((reference, staged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryTransientStore;
    use crate::checkout::types::{LineItem, ShippingInfo};

    fn validated() -> ValidatedCheckout {
        ValidatedCheckout {
            user_id: "u1".to_string(),
            items: vec![
                LineItem {
                    product_id: "serum-01".to_string(),
                    name: "Vitamin C Serum".to_string(),
                    quantity: 2,
                    unit_price: 150_000,
                },
                LineItem {
                    product_id: "clay-mask".to_string(),
                    name: "Clay Mask".to_string(),
                    quantity: 1,
                    unit_price: 200_000,
                },
            ],
            shipping: ShippingInfo {
                recipient_name: "Linh".to_string(),
                phone: "+84901234567".to_string(),
                address: "12 Hang Bac".to_string(),
                city: "Hanoi".to_string(),
                note: None,
            },
        }
    }

    #[tokio::test]
    async fn staging_computes_total_and_writes_store() {
        let store = Arc::new(MemoryTransientStore::new());
        let preparation = OrderPreparation::new(store.clone(), Duration::from_secs(900));

        let (reference, staged) = preparation
            .stage(validated())
            .await
            .expect("staging should succeed");
        assert_eq!(staged.total, 500_000);

        let raw = store
            .get(&StagedOrderKey::new(&reference).to_string())
            .await
            .expect("get")
            .expect("staged order must be retrievable before TTL");
        let round_trip: StagedOrder = serde_json::from_str(&raw).expect("parse");
        assert_eq!(round_trip, staged);
    }

    #[tokio::test]
    async fn staged_order_expires_with_ttl() {
        let store = Arc::new(MemoryTransientStore::new());
        let preparation = OrderPreparation::new(store.clone(), Duration::from_millis(20));

        let (reference, _) = preparation
            .stage(validated())
            .await
            .expect("staging should succeed");
        tokio::time::sleep(Duration::from_millis(40)).await;

        let raw = store
            .get(&StagedOrderKey::new(&reference).to_string())
            .await
            .expect("get");
        assert!(raw.is_none());
    }
}
