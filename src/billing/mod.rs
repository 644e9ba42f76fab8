//! Billing backend integration
//!
//! This module contains everything that talks to the billing service:
//! - The [`BillingBackend`] trait describing the SDK contract
//! - A hosted REST implementation ([`HttpBillingBackend`])
//! - An in-memory implementation for sandbox runs and tests ([`SandboxBackend`])
//! - Typed snapshots narrowed from the backend's JSON

pub mod backend;
pub mod http;
pub mod sandbox;
pub mod types;

pub use backend::{BillingBackend, BillingError};
pub use http::HttpBillingBackend;
pub use sandbox::{SandboxBackend, SandboxOp, default_offering};
pub use types::{
    ActiveEntitlement, EntitlementSnapshot, EntitlementTier, Offering, OfferingSnapshot, Package,
    Price, SessionIdentity,
};

use std::time::Duration;

use crate::config::GlobalConfig;

/// Backend selected from configuration
#[derive(Debug)]
pub enum ConfiguredBackend {
    Http(HttpBillingBackend),
    Sandbox(SandboxBackend),
}

impl ConfiguredBackend {
    /// Sandbox when `sandbox` is set, otherwise HTTP against `billing_url`
    pub async fn from_config(config: &GlobalConfig) -> anyhow::Result<Self> {
        if config.sandbox {
            let sandbox = SandboxBackend::new();
            if !config.sandbox_grants.is_empty() {
                let user = config.user.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("--sandbox-grant requires --user to know who to grant")
                })?;
                for entitlement in &config.sandbox_grants {
                    sandbox.grant(user, entitlement).await;
                }
            }
            tracing::info!(grants = ?config.sandbox_grants, "Using sandbox billing backend");
            return Ok(Self::Sandbox(sandbox));
        }

        let url = config.billing_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "No billing URL configured. Use --billing-url, EDUGATE_BILLING_URL, or --sandbox"
            )
        })?;
        let mut backend = HttpBillingBackend::try_from(url)?;
        if let Some(secs) = config.connect_timeout {
            backend = backend.with_connect_timeout(Duration::from_secs(secs))?;
        }
        tracing::debug!(url = %url, "Using HTTP billing backend");
        Ok(Self::Http(backend))
    }
}

impl BillingBackend for ConfiguredBackend {
    async fn configure(&self, api_key: &str) -> Result<(), BillingError> {
        match self {
            Self::Http(b) => b.configure(api_key).await,
            Self::Sandbox(b) => b.configure(api_key).await,
        }
    }

    async fn login(&self, user: &SessionIdentity) -> Result<EntitlementSnapshot, BillingError> {
        match self {
            Self::Http(b) => b.login(user).await,
            Self::Sandbox(b) => b.login(user).await,
        }
    }

    async fn offerings(&self, user: &SessionIdentity) -> Result<OfferingSnapshot, BillingError> {
        match self {
            Self::Http(b) => b.offerings(user).await,
            Self::Sandbox(b) => b.offerings(user).await,
        }
    }

    async fn purchase(
        &self,
        user: &SessionIdentity,
        package: &Package,
    ) -> Result<EntitlementSnapshot, BillingError> {
        match self {
            Self::Http(b) => b.purchase(user, package).await,
            Self::Sandbox(b) => b.purchase(user, package).await,
        }
    }

    async fn customer_info(&self, user: &SessionIdentity) -> Result<EntitlementSnapshot, BillingError> {
        match self {
            Self::Http(b) => b.customer_info(user).await,
            Self::Sandbox(b) => b.customer_info(user).await,
        }
    }

    async fn restore_purchases(
        &self,
        user: &SessionIdentity,
    ) -> Result<EntitlementSnapshot, BillingError> {
        match self {
            Self::Http(b) => b.restore_purchases(user).await,
            Self::Sandbox(b) => b.restore_purchases(user).await,
        }
    }
}
