pub mod reconciliation_retry;
