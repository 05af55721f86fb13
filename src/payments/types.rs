use crate::payments::error::PaymentError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Vnpay,
    Zalopay,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Vnpay => "vnpay",
            ProviderName::Zalopay => "zalopay",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "vnpay" => Ok(ProviderName::Vnpay),
            "zalopay" => Ok(ProviderName::Zalopay),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported provider: {}", value),
                field: Some("provider".to_string()),
            }),
        }
    }
}

/// Per-request context the adapters need but the staged order does not carry.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client_ip: String,
}

/// Result of translating a staged order into a provider payment request.
///
/// `transaction_id` is the provider-side correlation id, distinct from the
/// order reference; callbacks carry it back and the transient store maps it
/// to the staged order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCheckout {
    pub provider: ProviderName,
    pub transaction_id: String,
    pub pay_url: Option<String>,
    pub provider_data: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackVerification {
    pub success: bool,
    pub reason: Option<String>,
}
