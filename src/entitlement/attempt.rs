//! Purchase attempt outcomes

use serde::Serialize;

use crate::billing::{BillingError, EntitlementSnapshot};

/// Why a purchase did not grant the requested entitlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PurchaseFailure {
    #[error("Purchases are unavailable right now")]
    Unconfigured,
    #[error("Sign in to purchase a subscription")]
    NoSession,
    #[error("No subscription offering is available")]
    NoCurrentOffering,
    #[error("Product '{product_id}' is not offered")]
    ProductNotFound { product_id: String },
    #[error("Payment went through but '{entitlement}' is not active yet; try restoring purchases")]
    EntitlementInactive { entitlement: String },
    #[error("The store did not respond in time")]
    TimedOut,
    #[error("Purchase failed: {message}")]
    Backend { message: String },
}

impl From<BillingError> for PurchaseFailure {
    fn from(error: BillingError) -> Self {
        match error {
            BillingError::TimedOut { .. } => Self::TimedOut,
            BillingError::NotConfigured => Self::Unconfigured,
            other => Self::Backend {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    /// Entitlement confirmed active after the purchase
    Purchased { snapshot: EntitlementSnapshot },
    Failed { failure: PurchaseFailure },
    /// The user backed out of the store sheet
    Cancelled,
}

/// One user-initiated purchase, kept only until the UI has reacted to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseAttempt {
    pub product_id: String,
    pub outcome: PurchaseOutcome,
}

impl PurchaseAttempt {
    pub fn new(product_id: impl Into<String>, outcome: PurchaseOutcome) -> Self {
        Self {
            product_id: product_id.into(),
            outcome,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, PurchaseOutcome::Purchased { .. })
    }

    pub fn failure(&self) -> Option<&PurchaseFailure> {
        match &self.outcome {
            PurchaseOutcome::Failed { failure } => Some(failure),
            _ => None,
        }
    }
}
