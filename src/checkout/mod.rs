pub mod preparation;
pub mod types;
