//! Short-lived credential and credit ledger for one identity.

pub mod manager;
pub mod token;

pub use crate::services::Identity;
pub use manager::TokenManager;
pub use token::TokenInfo;
