use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Currency for all staged and confirmed orders. Totals are whole dong, no
/// minor units.
pub const CURRENCY: &str = "VND";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: i64,
}

impl LineItem {
    pub fn subtotal(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingInfo {
    pub recipient_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// Transient pre-payment snapshot of a cart, held in the transient store
/// under an order reference until the provider callback confirms payment or
/// the TTL elapses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagedOrder {
    pub user_id: String,
    pub items: Vec<LineItem>,
    pub shipping: ShippingInfo,
    pub total: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl StagedOrder {
    pub fn compute_total(items: &[LineItem]) -> i64 {
        items.iter().map(LineItem::subtotal).sum()
    }
}

/// Opaque single-use correlation token between a staged order and a provider
/// transaction.
pub fn generate_order_reference() -> String {
    format!("ord_{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Raw checkout body as posted by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub provider: String,
    pub items: Vec<LineItem>,
    pub shipping: ShippingInfo,
}

/// Checkout input that has passed field validation.
#[derive(Debug, Clone)]
pub struct ValidatedCheckout {
    pub user_id: String,
    pub items: Vec<LineItem>,
    pub shipping: ShippingInfo,
}

impl CheckoutRequest {
    /// Explicit field validation in place of declarative schema rules: every
    /// failed field is reported, not just the first.
    pub fn validate(self) -> Result<ValidatedCheckout, Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.user_id.trim().is_empty() {
            errors.push(FieldError::new("user_id", "user_id is required"));
        }
        if self.items.is_empty() {
            errors.push(FieldError::new("items", "cart must contain at least one item"));
        }
        for (idx, item) in self.items.iter().enumerate() {
            if item.product_id.trim().is_empty() {
                errors.push(FieldError::new(
                    format!("items[{}].product_id", idx),
                    "product_id is required",
                ));
            }
            if item.quantity == 0 {
                errors.push(FieldError::new(
                    format!("items[{}].quantity", idx),
                    "quantity must be greater than zero",
                ));
            }
            if item.unit_price <= 0 {
                errors.push(FieldError::new(
                    format!("items[{}].unit_price", idx),
                    "unit_price must be greater than zero",
                ));
            }
        }
        if self.shipping.recipient_name.trim().is_empty() {
            errors.push(FieldError::new(
                "shipping.recipient_name",
                "recipient name is required",
            ));
        }
        if self.shipping.phone.trim().is_empty() {
            errors.push(FieldError::new("shipping.phone", "phone is required"));
        }
        if self.shipping.address.trim().is_empty() {
            errors.push(FieldError::new("shipping.address", "address is required"));
        }
        if self.shipping.city.trim().is_empty() {
            errors.push(FieldError::new("shipping.city", "city is required"));
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidatedCheckout {
            user_id: self.user_id,
            items: self.items,
            shipping: self.shipping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shipping() -> ShippingInfo {
        ShippingInfo {
            recipient_name: "Linh Tran".to_string(),
            phone: "+84901234567".to_string(),
            address: "12 Hang Bac".to_string(),
            city: "Hanoi".to_string(),
            note: None,
        }
    }

    fn item(price: i64, quantity: u32) -> LineItem {
        LineItem {
            product_id: "serum-01".to_string(),
            name: "Vitamin C Serum".to_string(),
            quantity,
            unit_price: price,
        }
    }

    #[test]
    fn total_sums_line_subtotals() {
        let items = vec![item(150_000, 2), item(200_000, 1)];
        assert_eq!(StagedOrder::compute_total(&items), 500_000);
    }

    #[test]
    fn empty_cart_is_rejected() {
        let request = CheckoutRequest {
            user_id: "u1".to_string(),
            provider: "vnpay".to_string(),
            items: vec![],
            shipping: shipping(),
        };
        let errors = request.validate().expect_err("empty cart must fail");
        assert!(errors.iter().any(|e| e.field == "items"));
    }

    #[test]
    fn all_invalid_fields_are_reported() {
        let request = CheckoutRequest {
            user_id: "".to_string(),
            provider: "vnpay".to_string(),
            items: vec![item(0, 0)],
            shipping: ShippingInfo {
                recipient_name: "".to_string(),
                phone: "".to_string(),
                address: "12 Hang Bac".to_string(),
                city: "Hanoi".to_string(),
                note: None,
            },
        };
        let errors = request.validate().expect_err("must fail");
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"user_id"));
        assert!(fields.contains(&"items[0].quantity"));
        assert!(fields.contains(&"items[0].unit_price"));
        assert!(fields.contains(&"shipping.recipient_name"));
        assert!(fields.contains(&"shipping.phone"));
    }

    #[test]
    fn order_references_are_unique_and_opaque() {
        let a = generate_order_reference();
        let b = generate_order_reference();
        assert_ne!(a, b);
        assert!(a.starts_with("ord_"));
    }
}
