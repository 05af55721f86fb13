//! Type-safe transient-store key builders

use std::fmt;

pub const VERSION: &str = "v1";

pub mod order {
    use super::*;
    use crate::payments::types::ProviderName;

    pub const NAMESPACE: &str = "order";

    /// Staged order body, keyed by the order reference.
    #[derive(Debug, Clone)]
    pub struct StagedOrderKey {
        pub reference: String,
    }

    impl StagedOrderKey {
        pub fn new(reference: impl Into<String>) -> Self {
            Self {
                reference: reference.into(),
            }
        }
    }

    impl fmt::Display for StagedOrderKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}:staged:{}", VERSION, NAMESPACE, self.reference)
        }
    }

    /// Provider transaction id → order reference mapping.
    #[derive(Debug, Clone)]
    pub struct ProviderTxnKey {
        pub provider: ProviderName,
        pub transaction_id: String,
    }

    impl ProviderTxnKey {
        pub fn new(provider: ProviderName, transaction_id: impl Into<String>) -> Self {
            Self {
                provider,
                transaction_id: transaction_id.into(),
            }
        }
    }

    impl fmt::Display for ProviderTxnKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "{}:{}:txn:{}:{}",
                VERSION, NAMESPACE, self.provider, self.transaction_id
            )
        }
    }

    /// List of paid-but-unpersisted orders awaiting the retry worker.
    pub const RECONCILE_QUEUE: &str = "v1:order:reconcile_queue";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::ProviderName;

    #[test]
    fn staged_order_key_format() {
        let key = order::StagedOrderKey::new("ord_abc");
        assert_eq!(key.to_string(), "v1:order:staged:ord_abc");
    }

    #[test]
    fn provider_txn_key_format() {
        let key = order::ProviderTxnKey::new(ProviderName::Zalopay, "260824_x");
        assert_eq!(key.to_string(), "v1:order:txn:zalopay:260824_x");
    }
}
