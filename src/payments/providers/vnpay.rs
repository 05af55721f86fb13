use crate::checkout::types::StagedOrder;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{CallbackVerification, ProviderCheckout, ProviderName, RequestContext};
use crate::payments::utils::{sign_hmac_sha256_hex, verify_hmac_sha256_hex};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

/// Redirect-style gateway: the payment request is a signed URL the shopper's
/// browser is sent to, and the callback is the return redirect.
#[derive(Debug, Clone)]
pub struct VnpayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub pay_url: String,
    pub return_url: String,
}

impl VnpayConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let tmn_code =
            std::env::var("VNPAY_TMN_CODE").map_err(|_| PaymentError::ValidationError {
                message: "VNPAY_TMN_CODE environment variable is required".to_string(),
                field: Some("VNPAY_TMN_CODE".to_string()),
            })?;
        let hash_secret =
            std::env::var("VNPAY_HASH_SECRET").map_err(|_| PaymentError::ValidationError {
                message: "VNPAY_HASH_SECRET environment variable is required".to_string(),
                field: Some("VNPAY_HASH_SECRET".to_string()),
            })?;

        Ok(Self {
            tmn_code,
            hash_secret,
            pay_url: std::env::var("VNPAY_PAY_URL").unwrap_or_else(|_| {
                "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string()
            }),
            return_url: std::env::var("VNPAY_RETURN_URL")
                .unwrap_or_else(|_| "http://localhost:8000/payment/callback/vnpay".to_string()),
        })
    }
}

pub struct VnpayProvider {
    config: VnpayConfig,
}

impl VnpayProvider {
    pub fn new(config: VnpayConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> PaymentResult<Self> {
        Ok(Self::new(VnpayConfig::from_env()?))
    }

    fn field<'a>(payload: &'a JsonValue, name: &str) -> PaymentResult<&'a str> {
        payload
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
            .ok_or(PaymentError::ValidationError {
                message: format!("{} is required", name),
                field: Some(name.to_string()),
            })
    }
}

#[async_trait]
impl PaymentProvider for VnpayProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Vnpay
    }

    async fn build_request(
        &self,
        order: &StagedOrder,
        reference: &str,
        ctx: &RequestContext,
    ) -> PaymentResult<ProviderCheckout> {
        let transaction_id = format!("vnp_{}", Uuid::new_v4().simple());
        let amount = order.total.to_string();

        // Integrity hash binds the requesting client, the charged amount and
        // the order reference together.
        let signed = format!("{}|{}|{}", ctx.client_ip, amount, reference);
        let secure_hash = sign_hmac_sha256_hex(signed.as_bytes(), &self.config.hash_secret);

        let url = reqwest::Url::parse_with_params(
            &self.config.pay_url,
            &[
                ("vnp_TmnCode", self.config.tmn_code.as_str()),
                ("vnp_TxnRef", transaction_id.as_str()),
                ("vnp_Amount", amount.as_str()),
                ("vnp_OrderInfo", reference),
                ("vnp_IpAddr", ctx.client_ip.as_str()),
                ("vnp_ReturnUrl", self.config.return_url.as_str()),
                ("vnp_SecureHash", secure_hash.as_str()),
            ],
        )
        .map_err(|e| PaymentError::ProviderError {
            provider: "vnpay".to_string(),
            message: format!("failed to build redirect URL: {}", e),
            provider_code: None,
            retryable: false,
        })?;

        info!(transaction_id = %transaction_id, "vnpay redirect built");

        Ok(ProviderCheckout {
            provider: ProviderName::Vnpay,
            transaction_id,
            pay_url: Some(url.to_string()),
            provider_data: None,
        })
    }

    fn verify_callback(&self, payload: &JsonValue) -> PaymentResult<CallbackVerification> {
        let txn_ref = Self::field(payload, "vnp_TxnRef")?;
        let amount = Self::field(payload, "vnp_Amount")?;
        let response_code = Self::field(payload, "vnp_ResponseCode")?;
        let secure_hash = Self::field(payload, "vnp_SecureHash")?;

        let signed = format!("{}|{}|{}", txn_ref, amount, response_code);
        if !verify_hmac_sha256_hex(signed.as_bytes(), &self.config.hash_secret, secure_hash) {
            return Err(PaymentError::CallbackVerificationError {
                message: "invalid vnpay callback signature".to_string(),
            });
        }

        let success = response_code == "00";
        Ok(CallbackVerification {
            success,
            reason: if success {
                None
            } else {
                Some(format!("vnpay response code {}", response_code))
            },
        })
    }

    fn extract_transaction_id(&self, payload: &JsonValue) -> PaymentResult<String> {
        Self::field(payload, "vnp_TxnRef").map(str::to_string)
    }
}
