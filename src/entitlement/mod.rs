//! Entitlement layer
//!
//! [`EntitlementClient`] owns the billing backend and the [`TierCache`] shared
//! with the paywall. Purchases are reported as [`PurchaseAttempt`] values.

pub mod attempt;
pub mod cache;
pub mod client;

pub use attempt::{PurchaseAttempt, PurchaseFailure, PurchaseOutcome};
pub use cache::{Binding, SessionView, TierCache};
pub use client::{
    ClientTimeouts, DEFAULT_PURCHASE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, EntitlementClient,
};
