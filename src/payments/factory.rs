use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::providers::{VnpayProvider, ZalopayProvider};
use crate::payments::types::ProviderName;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Adapters are constructed once at process start and handed out as shared
/// references; nothing re-reads the environment per request.
pub struct PaymentProviderFactory {
    providers: HashMap<ProviderName, Arc<dyn PaymentProvider>>,
}

impl PaymentProviderFactory {
    pub fn from_env() -> PaymentResult<Self> {
        let enabled_raw = std::env::var("ENABLED_PAYMENT_PROVIDERS")
            .unwrap_or_else(|_| "vnpay,zalopay".to_string());

        let mut providers: HashMap<ProviderName, Arc<dyn PaymentProvider>> = HashMap::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            match ProviderName::from_str(value)? {
                ProviderName::Vnpay => {
                    providers.insert(ProviderName::Vnpay, Arc::new(VnpayProvider::from_env()?));
                }
                ProviderName::Zalopay => {
                    providers.insert(ProviderName::Zalopay, Arc::new(ZalopayProvider::from_env()?));
                }
            }
        }

        if providers.is_empty() {
            return Err(PaymentError::ValidationError {
                message: "at least one payment provider must be enabled".to_string(),
                field: Some("ENABLED_PAYMENT_PROVIDERS".to_string()),
            });
        }

        Ok(Self { providers })
    }

    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.name(), provider);
        self
    }

    pub fn get(&self, name: ProviderName) -> PaymentResult<Arc<dyn PaymentProvider>> {
        self.providers
            .get(&name)
            .cloned()
            .ok_or(PaymentError::ValidationError {
                message: format!("provider {} is disabled", name),
                field: Some("provider".to_string()),
            })
    }

    pub fn list_available(&self) -> Vec<ProviderName> {
        self.providers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::providers::{VnpayConfig, VnpayProvider};

    fn vnpay() -> Arc<dyn PaymentProvider> {
        Arc::new(VnpayProvider::new(VnpayConfig {
            tmn_code: "DERMA01".to_string(),
            hash_secret: "secret".to_string(),
            pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: "http://localhost:8000/payment/callback/vnpay".to_string(),
        }))
    }

    #[test]
    fn disabled_provider_is_rejected() {
        let factory = PaymentProviderFactory::empty().with_provider(vnpay());
        assert!(factory.get(ProviderName::Vnpay).is_ok());
        assert!(factory.get(ProviderName::Zalopay).is_err());
    }

    #[test]
    fn list_available_returns_registered() {
        let factory = PaymentProviderFactory::empty().with_provider(vnpay());
        assert_eq!(factory.list_available(), vec![ProviderName::Vnpay]);
    }
}
