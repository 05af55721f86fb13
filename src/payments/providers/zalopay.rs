use crate::checkout::types::StagedOrder;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{CallbackVerification, ProviderCheckout, ProviderName, RequestContext};
use crate::payments::utils::{sign_hmac_sha256_hex, verify_hmac_sha256_hex, PaymentHttpClient};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Server-to-server gateway: the order is created with an outbound signed
/// call, the provider answers with a pay URL, and confirmation arrives on a
/// webhook signed with a second key.
#[derive(Debug, Clone)]
pub struct ZalopayConfig {
    pub app_id: String,
    /// Signs outbound create-order requests.
    pub key1: String,
    /// Verifies inbound callbacks.
    pub key2: String,
    pub create_url: String,
    pub callback_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl ZalopayConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let require = |name: &str| {
            std::env::var(name).map_err(|_| PaymentError::ValidationError {
                message: format!("{} environment variable is required", name),
                field: Some(name.to_string()),
            })
        };

        Ok(Self {
            app_id: require("ZALOPAY_APP_ID")?,
            key1: require("ZALOPAY_KEY1")?,
            key2: require("ZALOPAY_KEY2")?,
            create_url: std::env::var("ZALOPAY_CREATE_URL")
                .unwrap_or_else(|_| "https://sb-openapi.zalopay.vn/v2/create".to_string()),
            callback_url: std::env::var("ZALOPAY_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:8000/payment/callback/zalopay".to_string()),
            timeout_secs: std::env::var("ZALOPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("ZALOPAY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(2),
        })
    }
}

pub struct ZalopayProvider {
    config: ZalopayConfig,
    http: PaymentHttpClient,
}

impl ZalopayProvider {
    pub fn new(config: ZalopayConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(ZalopayConfig::from_env()?)
    }

    fn str_field<'a>(payload: &'a JsonValue, name: &str) -> PaymentResult<&'a str> {
        payload
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
            .ok_or(PaymentError::ValidationError {
                message: format!("{} is required", name),
                field: Some(name.to_string()),
            })
    }

    fn int_field(payload: &JsonValue, name: &str) -> PaymentResult<i64> {
        payload
            .get(name)
            .and_then(|v| v.as_i64())
            .ok_or(PaymentError::ValidationError {
                message: format!("{} is required", name),
                field: Some(name.to_string()),
            })
    }
}

#[async_trait]
impl PaymentProvider for ZalopayProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Zalopay
    }

    async fn build_request(
        &self,
        order: &StagedOrder,
        reference: &str,
        _ctx: &RequestContext,
    ) -> PaymentResult<ProviderCheckout> {
        if order.items.is_empty() {
            return Err(PaymentError::ValidationError {
                message: "item list must not be empty".to_string(),
                field: Some("items".to_string()),
            });
        }

        // Provider convention: yymmdd prefix plus a unique suffix.
        let app_trans_id = format!("{}_{}", Utc::now().format("%y%m%d"), Uuid::new_v4().simple());
        let app_time = Utc::now().timestamp_millis();
        let embed_data = serde_json::json!({ "order_reference": reference }).to_string();
        let item = serde_json::to_string(&order.items).map_err(|e| {
            PaymentError::ValidationError {
                message: format!("failed to encode item list: {}", e),
                field: Some("items".to_string()),
            }
        })?;

        let signed = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.config.app_id, app_trans_id, order.user_id, order.total, app_time, embed_data, item
        );
        let mac = sign_hmac_sha256_hex(signed.as_bytes(), &self.config.key1);

        let payload = serde_json::json!({
            "app_id": self.config.app_id,
            "app_trans_id": app_trans_id,
            "app_user": order.user_id,
            "amount": order.total,
            "app_time": app_time,
            "embed_data": embed_data,
            "item": item,
            "callback_url": self.config.callback_url,
            "description": format!("Dermacart order {}", reference),
            "mac": mac,
        });

        let raw: ZalopayCreateResponse = self
            .http
            .post_json(&self.config.create_url, &payload)
            .await?;

        if raw.return_code != 1 {
            return Err(PaymentError::ProviderError {
                provider: "zalopay".to_string(),
                message: raw.return_message,
                provider_code: Some(raw.return_code.to_string()),
                retryable: false,
            });
        }

        info!(app_trans_id = %app_trans_id, "zalopay order created");

        Ok(ProviderCheckout {
            provider: ProviderName::Zalopay,
            transaction_id: app_trans_id,
            pay_url: raw.order_url,
            provider_data: Some(serde_json::json!({
                "return_code": raw.return_code,
                "zp_trans_token": raw.zp_trans_token,
            })),
        })
    }

    fn verify_callback(&self, payload: &JsonValue) -> PaymentResult<CallbackVerification> {
        let app_trans_id = Self::str_field(payload, "app_trans_id")?;
        let amount = Self::int_field(payload, "amount")?;
        let status = Self::int_field(payload, "status")?;
        let mac = Self::str_field(payload, "mac")?;

        let signed = format!("{}|{}|{}", app_trans_id, amount, status);
        if !verify_hmac_sha256_hex(signed.as_bytes(), &self.config.key2, mac) {
            return Err(PaymentError::CallbackVerificationError {
                message: "invalid zalopay callback mac".to_string(),
            });
        }

        let success = status == 1;
        Ok(CallbackVerification {
            success,
            reason: if success {
                None
            } else {
                Some(format!("zalopay status {}", status))
            },
        })
    }

    fn extract_transaction_id(&self, payload: &JsonValue) -> PaymentResult<String> {
        Self::str_field(payload, "app_trans_id").map(str::to_string)
    }
}

#[derive(Debug, Deserialize)]
struct ZalopayCreateResponse {
    return_code: i64,
    return_message: String,
    #[serde(default)]
    order_url: Option<String>,
    #[serde(default)]
    zp_trans_token: Option<String>,
}
