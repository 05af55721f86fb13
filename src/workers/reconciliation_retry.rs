use crate::cache::store::RetryQueue;
use crate::database::order_repository::OrderStore;
use crate::services::reconciler::PendingReconciliation;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const MAX_ATTEMPTS: u32 = 10;

/// Re-drives confirmed-order inserts that failed after a verified payment.
/// Runs until the shutdown signal flips.
pub struct ReconciliationRetryWorker {
    queue: Arc<dyn RetryQueue>,
    orders: Arc<dyn OrderStore>,
    interval: Duration,
}

impl ReconciliationRetryWorker {
    pub fn new(queue: Arc<dyn RetryQueue>, orders: Arc<dyn OrderStore>, interval: Duration) -> Self {
        Self {
            queue,
            orders,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "reconciliation retry worker started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.drain().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reconciliation retry worker stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Processes queue entries until it is empty or an insert fails again.
    /// A failed entry goes back on the queue and the pass ends, so a down
    /// database is probed once per interval instead of in a tight loop.
    pub async fn drain(&self) -> usize {
        let mut persisted = 0;
        loop {
            let raw = match self.queue.pop().await {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "retry queue unavailable");
                    break;
                }
            };

            let mut pending: PendingReconciliation = match serde_json::from_str(&raw) {
                Ok(p) => p,
                Err(e) => {
                    error!(error = %e, "dropping corrupt retry entry");
                    continue;
                }
            };

            match self.orders.insert(&pending.order).await {
                Ok(order_id) => {
                    info!(
                        reference = %pending.order.reference,
                        order_id = %order_id,
                        attempts = pending.attempts + 1,
                        "queued order persisted"
                    );
                    persisted += 1;
                }
                Err(e) => {
                    pending.attempts += 1;
                    if pending.attempts >= MAX_ATTEMPTS {
                        // Kept on the queue for operators: dropping it would
                        // lose a paid order.
                        error!(
                            reference = %pending.order.reference,
                            attempts = pending.attempts,
                            error = %e,
                            "order still unpersisted after max attempts"
                        );
                    } else {
                        warn!(
                            reference = %pending.order.reference,
                            attempts = pending.attempts,
                            error = %e,
                            "order insert failed again, requeueing"
                        );
                    }
                    if let Ok(entry) = serde_json::to_string(&pending) {
                        if let Err(push_err) = self.queue.push(&entry).await {
                            error!(error = %push_err, "failed to requeue pending order");
                        }
                    }
                    break;
                }
            }
        }
        persisted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryRetryQueue;
    use crate::checkout::types::{ShippingInfo, CURRENCY};
    use crate::database::order_repository::{MemoryOrderStore, NewConfirmedOrder};
    use crate::payments::types::ProviderName;

    fn pending(reference: &str) -> PendingReconciliation {
        PendingReconciliation {
            order: NewConfirmedOrder {
                reference: reference.to_string(),
                user_id: "u1".to_string(),
                items: vec![],
                shipping: ShippingInfo {
                    recipient_name: "Linh".to_string(),
                    phone: "+84901234567".to_string(),
                    address: "12 Hang Bac".to_string(),
                    city: "Hanoi".to_string(),
                    note: None,
                },
                total: 500_000,
                currency: CURRENCY.to_string(),
                payment_provider: ProviderName::Zalopay,
                provider_transaction_id: "260824_x".to_string(),
            },
            attempts: 0,
        }
    }

    #[tokio::test]
    async fn drain_persists_queued_orders() {
        let queue = Arc::new(MemoryRetryQueue::new());
        let orders = Arc::new(MemoryOrderStore::new());
        for reference in ["ord_1", "ord_2"] {
            queue
                .push(&serde_json::to_string(&pending(reference)).expect("encode"))
                .await
                .expect("push");
        }

        let worker = ReconciliationRetryWorker::new(
            queue.clone(),
            orders.clone(),
            Duration::from_secs(30),
        );
        let persisted = worker.drain().await;

        assert_eq!(persisted, 2);
        assert!(queue.is_empty());
        assert_eq!(orders.orders().len(), 2);
    }

    #[tokio::test]
    async fn failed_insert_goes_back_on_queue() {
        let queue = Arc::new(MemoryRetryQueue::new());
        let orders = Arc::new(MemoryOrderStore::new());
        orders.set_fail_inserts(true);
        queue
            .push(&serde_json::to_string(&pending("ord_1")).expect("encode"))
            .await
            .expect("push");

        let worker = ReconciliationRetryWorker::new(
            queue.clone(),
            orders.clone(),
            Duration::from_secs(30),
        );
        let persisted = worker.drain().await;

        assert_eq!(persisted, 0);
        assert_eq!(queue.len(), 1);
        assert!(orders.orders().is_empty());

        // Attempt counter climbs on the requeued entry.
        let raw = queue.pop().await.expect("pop").expect("entry");
        let requeued: PendingReconciliation = serde_json::from_str(&raw).expect("decode");
        assert_eq!(requeued.attempts, 1);
    }

    #[tokio::test]
    async fn worker_stops_on_shutdown_signal() {
        let queue = Arc::new(MemoryRetryQueue::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let worker =
            ReconciliationRetryWorker::new(queue, orders, Duration::from_secs(3600));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(rx));
        tx.send(true).expect("signal");
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop promptly")
            .expect("join");
    }
}
