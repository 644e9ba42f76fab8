//! Core trait for billing backends

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use super::types::{EntitlementSnapshot, OfferingSnapshot, Package, SessionIdentity};

// ============================================================================
// Billing Error
// ============================================================================

/// Errors surfaced by a [`BillingBackend`]
///
/// These never leave the entitlement layer: the client converts them into
/// safe defaults (free tier, failed purchase, no-op restore).
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Billing backend is not configured")]
    NotConfigured,
    #[error("Invalid billing API key: {0}")]
    InvalidApiKey(String),
    #[error("Purchase cancelled by the user")]
    Cancelled,
    #[error("{operation} timed out after {after:?}")]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
    #[error("URL error: {context}")]
    Url { context: &'static str },
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Billing backend error: {0}")]
    Backend(String),
}

// ============================================================================
// Billing Backend Trait
// ============================================================================

/// Asynchronous contract of a billing SDK/service
///
/// Every subscriber-scoped call names the subscriber explicitly so that a
/// response can always be attributed to the identity it was issued for.
pub trait BillingBackend: Debug {
    /// Install the API key. Called at most once per client.
    fn configure(&self, api_key: &str) -> impl Future<Output = Result<(), BillingError>> + Send;

    /// Bind `user` on the backend (creating the subscriber if needed)
    fn login(
        &self,
        user: &SessionIdentity,
    ) -> impl Future<Output = Result<EntitlementSnapshot, BillingError>> + Send;

    /// Offerings currently presented to `user`
    fn offerings(
        &self,
        user: &SessionIdentity,
    ) -> impl Future<Output = Result<OfferingSnapshot, BillingError>> + Send;

    /// Purchase `package` for `user`, returning the post-purchase snapshot
    fn purchase(
        &self,
        user: &SessionIdentity,
        package: &Package,
    ) -> impl Future<Output = Result<EntitlementSnapshot, BillingError>> + Send;

    /// Current entitlements of `user`
    fn customer_info(
        &self,
        user: &SessionIdentity,
    ) -> impl Future<Output = Result<EntitlementSnapshot, BillingError>> + Send;

    /// Re-sync store purchases for `user`
    fn restore_purchases(
        &self,
        user: &SessionIdentity,
    ) -> impl Future<Output = Result<EntitlementSnapshot, BillingError>> + Send;
}

impl<T: BillingBackend + Sync + Send> BillingBackend for Arc<T> {
    fn configure(&self, api_key: &str) -> impl Future<Output = Result<(), BillingError>> + Send {
        self.as_ref().configure(api_key)
    }

    fn login(
        &self,
        user: &SessionIdentity,
    ) -> impl Future<Output = Result<EntitlementSnapshot, BillingError>> + Send {
        self.as_ref().login(user)
    }

    fn offerings(
        &self,
        user: &SessionIdentity,
    ) -> impl Future<Output = Result<OfferingSnapshot, BillingError>> + Send {
        self.as_ref().offerings(user)
    }

    fn purchase(
        &self,
        user: &SessionIdentity,
        package: &Package,
    ) -> impl Future<Output = Result<EntitlementSnapshot, BillingError>> + Send {
        self.as_ref().purchase(user, package)
    }

    fn customer_info(
        &self,
        user: &SessionIdentity,
    ) -> impl Future<Output = Result<EntitlementSnapshot, BillingError>> + Send {
        self.as_ref().customer_info(user)
    }

    fn restore_purchases(
        &self,
        user: &SessionIdentity,
    ) -> impl Future<Output = Result<EntitlementSnapshot, BillingError>> + Send {
        self.as_ref().restore_purchases(user)
    }
}
