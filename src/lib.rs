//! Dermacart backend: checkout staging and payment-callback reconciliation
//! for a skincare storefront.
//!
//! A checkout stages the order in Redis with a bounded TTL and hands the
//! customer to a payment provider; the provider's callback is verified,
//! atomically matched against the staged order, and persisted as a
//! confirmed order exactly once.

pub mod api;
pub mod cache;
pub mod checkout;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod workers;
