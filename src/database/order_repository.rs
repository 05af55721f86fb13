use crate::checkout::types::{LineItem, ShippingInfo, StagedOrder};
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::payments::types::ProviderName;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::sync::Mutex;
use uuid::Uuid;

/// Lifecycle of a confirmed order. Payment is already settled when the row is
/// created; these states track fulfilment only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Forward-only fulfilment, cancellation allowed until shipping.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Processing, OrderStatus::Cancelled)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }
}

impl FromStr for OrderStatus {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("unknown order status: {}", other),
            })),
        }
    }
}

/// Insert payload for a confirmed order, built from a consumed staged order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewConfirmedOrder {
    pub reference: String,
    pub user_id: String,
    pub items: Vec<LineItem>,
    pub shipping: ShippingInfo,
    pub total: i64,
    pub currency: String,
    pub payment_provider: ProviderName,
    pub provider_transaction_id: String,
}

impl NewConfirmedOrder {
    pub fn from_staged(
        staged: StagedOrder,
        reference: impl Into<String>,
        provider: ProviderName,
        provider_transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            user_id: staged.user_id,
            items: staged.items,
            shipping: staged.shipping,
            total: staged.total,
            currency: staged.currency,
            payment_provider: provider,
            provider_transaction_id: provider_transaction_id.into(),
        }
    }
}

/// Confirmed order row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ConfirmedOrder {
    pub id: Uuid,
    pub reference: String,
    pub user_id: String,
    pub items: serde_json::Value,
    pub shipping: serde_json::Value,
    pub total: i64,
    pub currency: String,
    pub payment_provider: String,
    pub provider_transaction_id: String,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Durable order store boundary consumed by the reconciler, the retry worker
/// and the order API.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &NewConfirmedOrder) -> Result<Uuid, DatabaseError>;

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<ConfirmedOrder>, DatabaseError>;

    /// Staff-facing status change, guarded by the lifecycle rules.
    async fn update_status(
        &self,
        id: Uuid,
        next: OrderStatus,
    ) -> Result<ConfirmedOrder, DatabaseError>;
}

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderRepository {
    async fn insert(&self, order: &NewConfirmedOrder) -> Result<Uuid, DatabaseError> {
        let items = serde_json::to_value(&order.items).map_err(|e| {
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("failed to encode items: {}", e),
            })
        })?;
        let shipping = serde_json::to_value(&order.shipping).map_err(|e| {
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("failed to encode shipping: {}", e),
            })
        })?;

        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO confirmed_orders
                (reference, user_id, items, shipping, total, currency,
                 payment_provider, provider_transaction_id, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
             RETURNING id",
        )
        .bind(&order.reference)
        .bind(&order.user_id)
        .bind(items)
        .bind(shipping)
        .bind(order.total)
        .bind(&order.currency)
        .bind(order.payment_provider.as_str())
        .bind(&order.provider_transaction_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(id)
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<ConfirmedOrder>, DatabaseError> {
        sqlx::query_as::<_, ConfirmedOrder>(
            "SELECT id, reference, user_id, items, shipping, total, currency,
                    payment_provider, provider_transaction_id, status, created_at, updated_at
             FROM confirmed_orders WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn update_status(
        &self,
        id: Uuid,
        next: OrderStatus,
    ) -> Result<ConfirmedOrder, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM confirmed_orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        let current = match current {
            Some((status,)) => OrderStatus::from_str(&status)?,
            None => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                    entity: "ConfirmedOrder".to_string(),
                    id: id.to_string(),
                }));
            }
        };

        if !current.can_transition_to(next) {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Err(DatabaseError::new(DatabaseErrorKind::IllegalTransition {
                from: current.as_str().to_string(),
                to: next.as_str().to_string(),
            }));
        }

        let updated = sqlx::query_as::<_, ConfirmedOrder>(
            "UPDATE confirmed_orders SET status = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING id, reference, user_id, items, shipping, total, currency,
                       payment_provider, provider_transaction_id, status, created_at, updated_at",
        )
        .bind(id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(updated)
    }
}

#[derive(Debug, Clone)]
struct MemoryOrderRecord {
    id: Uuid,
    order: NewConfirmedOrder,
    status: OrderStatus,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl MemoryOrderRecord {
    fn to_confirmed(&self) -> Result<ConfirmedOrder, DatabaseError> {
        let encode = |label: &str, e: serde_json::Error| {
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("failed to encode {}: {}", label, e),
            })
        };
        Ok(ConfirmedOrder {
            id: self.id,
            reference: self.order.reference.clone(),
            user_id: self.order.user_id.clone(),
            items: serde_json::to_value(&self.order.items).map_err(|e| encode("items", e))?,
            shipping: serde_json::to_value(&self.order.shipping)
                .map_err(|e| encode("shipping", e))?,
            total: self.order.total,
            currency: self.order.currency.clone(),
            payment_provider: self.order.payment_provider.as_str().to_string(),
            provider_transaction_id: self.order.provider_transaction_id.clone(),
            status: self.status.as_str().to_string(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// In-memory order store for tests and `SKIP_EXTERNALS` runs.
#[derive(Default)]
pub struct MemoryOrderStore {
    records: Mutex<Vec<MemoryOrderRecord>>,
    fail_inserts: Mutex<bool>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<(Uuid, NewConfirmedOrder)> {
        self.records
            .lock()
            .map(|r| r.iter().map(|rec| (rec.id, rec.order.clone())).collect())
            .unwrap_or_default()
    }

    /// Makes subsequent inserts fail, for persistence-failure paths.
    pub fn set_fail_inserts(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_inserts.lock() {
            *flag = fail;
        }
    }

    fn lock_records(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Vec<MemoryOrderRecord>>, DatabaseError> {
        self.records.lock().map_err(|e| {
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: e.to_string(),
            })
        })
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &NewConfirmedOrder) -> Result<Uuid, DatabaseError> {
        if self.fail_inserts.lock().map(|f| *f).unwrap_or(false) {
            return Err(DatabaseError::new(DatabaseErrorKind::Connection {
                message: "simulated insert failure".to_string(),
            }));
        }
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let mut records = self.lock_records()?;
        records.push(MemoryOrderRecord {
            id,
            order: order.clone(),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<ConfirmedOrder>, DatabaseError> {
        let records = self.lock_records()?;
        records
            .iter()
            .find(|rec| rec.order.reference == reference)
            .map(MemoryOrderRecord::to_confirmed)
            .transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        next: OrderStatus,
    ) -> Result<ConfirmedOrder, DatabaseError> {
        let mut records = self.lock_records()?;
        let record = records.iter_mut().find(|rec| rec.id == id).ok_or_else(|| {
            DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "ConfirmedOrder".to_string(),
                id: id.to_string(),
            })
        })?;

        if !record.status.can_transition_to(next) {
            return Err(DatabaseError::new(DatabaseErrorKind::IllegalTransition {
                from: record.status.as_str().to_string(),
                to: next.as_str().to_string(),
            }));
        }

        record.status = next;
        record.updated_at = chrono::Utc::now();
        record.to_confirmed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfilment_moves_forward_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn status_parse_round_trips() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(
                OrderStatus::from_str(status.as_str()).expect("parse"),
                status
            );
        }
        assert!(OrderStatus::from_str("refunded").is_err());
    }

    #[tokio::test]
    async fn memory_store_records_inserts() {
        use crate::checkout::types::{ShippingInfo, CURRENCY};

        let store = MemoryOrderStore::new();
        let order = NewConfirmedOrder {
            reference: "ord_1".to_string(),
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
            payment_provider: ProviderName::Vnpay,
            provider_transaction_id: "vnp_1".to_string(),
        };
        store.insert(&order).await.expect("insert should succeed");
        assert_eq!(store.orders().len(), 1);

        store.set_fail_inserts(true);
        assert!(store.insert(&order).await.is_err());
    }

    #[tokio::test]
    async fn memory_store_guards_status_transitions() {
        use crate::checkout::types::{ShippingInfo, CURRENCY};

        let store = MemoryOrderStore::new();
        let order = NewConfirmedOrder {
            reference: "ord_2".to_string(),
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
            payment_provider: ProviderName::Vnpay,
            provider_transaction_id: "vnp_2".to_string(),
        };
        let id = store.insert(&order).await.expect("insert");

        let found = store
            .find_by_reference("ord_2")
            .await
            .expect("find")
            .expect("order exists");
        assert_eq!(found.status, "pending");

        let updated = store
            .update_status(id, OrderStatus::Processing)
            .await
            .expect("valid transition");
        assert_eq!(updated.status, "processing");

        let err = store
            .update_status(id, OrderStatus::Delivered)
            .await
            .expect_err("processing cannot jump to delivered");
        assert!(matches!(
            err.kind,
            DatabaseErrorKind::IllegalTransition { .. }
        ));
    }
}
