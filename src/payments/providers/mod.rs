pub mod vnpay;
pub mod zalopay;

pub use vnpay::{VnpayConfig, VnpayProvider};
pub use zalopay::{ZalopayConfig, ZalopayProvider};
