//! In-process billing backend
//!
//! Backs the CLI `--sandbox` mode and doubles as the test backend: every
//! operation is counted, can be made to fail, and can be held open until the
//! caller releases it (for reproducing in-flight races).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rust_decimal::Decimal;
use tokio::sync::{RwLock, Semaphore};

use super::backend::{BillingBackend, BillingError};
use super::types::{
    ActiveEntitlement, EntitlementSnapshot, EntitlementTier, Offering, OfferingSnapshot, Package,
    Price, SessionIdentity,
};

/// Operations of the billing contract, used to address counters, failures and holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxOp {
    Configure,
    Login,
    Offerings,
    Purchase,
    CustomerInfo,
    Restore,
}

const OP_COUNT: usize = 6;

impl SandboxOp {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct SandboxState {
    api_key: Option<String>,
    offerings: OfferingSnapshot,
    /// Store-side purchases per user: entitlement -> product
    purchases: HashMap<String, BTreeMap<String, ActiveEntitlement>>,
    /// Entitlements granted out of band (promo codes, staff access)
    grants: HashMap<String, BTreeMap<String, ActiveEntitlement>>,
    bound: HashSet<String>,
    failing: HashSet<SandboxOp>,
    holds: HashMap<SandboxOp, Arc<Semaphore>>,
    cancel_purchases: bool,
    withhold_purchase_grants: bool,
}

impl SandboxState {
    fn snapshot(&self, user: &SessionIdentity) -> EntitlementSnapshot {
        let mut active = BTreeMap::new();
        for source in [&self.grants, &self.purchases] {
            if let Some(entries) = source.get(user.as_str()) {
                active.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        EntitlementSnapshot {
            app_user_id: Some(user.to_string()),
            active,
        }
    }
}

/// Billing backend that keeps subscribers in memory
#[derive(Debug, Default)]
pub struct SandboxBackend {
    state: RwLock<SandboxState>,
    calls: [AtomicUsize; OP_COUNT],
}

impl SandboxBackend {
    /// Sandbox presenting [`default_offering`] as the current offering
    pub fn new() -> Self {
        Self::with_offerings(OfferingSnapshot::single(default_offering()))
    }

    pub fn with_offerings(offerings: OfferingSnapshot) -> Self {
        Self {
            state: RwLock::new(SandboxState {
                offerings,
                ..Default::default()
            }),
            calls: Default::default(),
        }
    }

    /// Number of times `op` reached the backend
    pub fn calls(&self, op: SandboxOp) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    /// Grant `entitlement` to `user` without a purchase
    pub async fn grant(&self, user: &SessionIdentity, entitlement: &str) {
        let mut state = self.state.write().await;
        state.grants.entry(user.to_string()).or_default().insert(
            entitlement.to_string(),
            ActiveEntitlement {
                identifier: entitlement.to_string(),
                product_id: None,
                expires_at: None,
            },
        );
    }

    /// Make every subsequent `op` fail until [`Self::recover`] is called
    pub async fn fail(&self, op: SandboxOp) {
        self.state.write().await.failing.insert(op);
    }

    pub async fn recover(&self, op: SandboxOp) {
        self.state.write().await.failing.remove(&op);
    }

    /// Simulate the user dismissing the store purchase sheet
    pub async fn cancel_purchases(&self, cancel: bool) {
        self.state.write().await.cancel_purchases = cancel;
    }

    /// Purchases complete but the entitlement is not granted yet
    pub async fn withhold_purchase_grants(&self, withhold: bool) {
        self.state.write().await.withhold_purchase_grants = withhold;
    }

    /// Hold every subsequent `op` after it has read its result, until a permit
    /// is added to the returned semaphore (one permit releases one call)
    pub async fn hold(&self, op: SandboxOp) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state.write().await.holds.insert(op, gate.clone());
        gate
    }

    /// Count the call and apply configured failure
    async fn enter(&self, op: SandboxOp, requires_key: bool) -> Result<(), BillingError> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        if requires_key && state.api_key.is_none() {
            return Err(BillingError::NotConfigured);
        }
        if state.failing.contains(&op) {
            return Err(BillingError::Backend(format!("sandbox {:?} failure", op)));
        }
        Ok(())
    }

    /// Wait on the hold for `op`, if any. The state lock is not held here.
    async fn leave(&self, op: SandboxOp) {
        let gate = self.state.read().await.holds.get(&op).cloned();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

impl BillingBackend for SandboxBackend {
    async fn configure(&self, api_key: &str) -> Result<(), BillingError> {
        self.enter(SandboxOp::Configure, false).await?;
        if api_key.trim().is_empty() {
            return Err(BillingError::InvalidApiKey("empty key".to_string()));
        }
        self.state.write().await.api_key = Some(api_key.to_string());
        self.leave(SandboxOp::Configure).await;
        Ok(())
    }

    async fn login(&self, user: &SessionIdentity) -> Result<EntitlementSnapshot, BillingError> {
        self.enter(SandboxOp::Login, true).await?;
        let snapshot = {
            let mut state = self.state.write().await;
            state.bound.insert(user.to_string());
            state.snapshot(user)
        };
        self.leave(SandboxOp::Login).await;
        Ok(snapshot)
    }

    async fn offerings(&self, _user: &SessionIdentity) -> Result<OfferingSnapshot, BillingError> {
        self.enter(SandboxOp::Offerings, true).await?;
        let offerings = self.state.read().await.offerings.clone();
        self.leave(SandboxOp::Offerings).await;
        Ok(offerings)
    }

    async fn purchase(
        &self,
        user: &SessionIdentity,
        package: &Package,
    ) -> Result<EntitlementSnapshot, BillingError> {
        self.enter(SandboxOp::Purchase, true).await?;
        let result = {
            let mut state = self.state.write().await;
            if state.cancel_purchases {
                Err(BillingError::Cancelled)
            } else {
                if !state.withhold_purchase_grants {
                    state.purchases.entry(user.to_string()).or_default().insert(
                        package.entitlement.clone(),
                        ActiveEntitlement {
                            identifier: package.entitlement.clone(),
                            product_id: Some(package.product_id.clone()),
                            expires_at: None,
                        },
                    );
                }
                Ok(state.snapshot(user))
            }
        };
        self.leave(SandboxOp::Purchase).await;
        result
    }

    async fn customer_info(&self, user: &SessionIdentity) -> Result<EntitlementSnapshot, BillingError> {
        self.enter(SandboxOp::CustomerInfo, true).await?;
        // Read before holding: a held query resolves with the state it observed
        let snapshot = self.state.read().await.snapshot(user);
        self.leave(SandboxOp::CustomerInfo).await;
        Ok(snapshot)
    }

    async fn restore_purchases(
        &self,
        user: &SessionIdentity,
    ) -> Result<EntitlementSnapshot, BillingError> {
        self.enter(SandboxOp::Restore, true).await?;
        let snapshot = self.state.read().await.snapshot(user);
        self.leave(SandboxOp::Restore).await;
        Ok(snapshot)
    }
}

/// The offering shown by the paywall: premium at $9.99/month, creator at $19.99/month
pub fn default_offering() -> Offering {
    let monthly = |amount: &str| Price {
        amount: Decimal::from_str(amount).unwrap_or_default(),
        currency: "USD".to_string(),
        period: Some("month".to_string()),
    };

    Offering {
        identifier: "default".to_string(),
        packages: vec![
            Package {
                identifier: EntitlementTier::PREMIUM_ENTITLEMENT.to_string(),
                product_id: "premium_monthly".to_string(),
                entitlement: EntitlementTier::PREMIUM_ENTITLEMENT.to_string(),
                price: Some(monthly("9.99")),
            },
            Package {
                identifier: EntitlementTier::CREATOR_ENTITLEMENT.to_string(),
                product_id: "creator_monthly".to_string(),
                entitlement: EntitlementTier::CREATOR_ENTITLEMENT.to_string(),
                price: Some(monthly("19.99")),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> SessionIdentity {
        SessionIdentity::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_requires_configuration() {
        let sandbox = SandboxBackend::new();
        assert!(matches!(
            sandbox.customer_info(&user("u1")).await,
            Err(BillingError::NotConfigured)
        ));
        sandbox.configure("sandbox").await.unwrap();
        assert!(sandbox.customer_info(&user("u1")).await.is_ok());
        assert_eq!(sandbox.calls(SandboxOp::CustomerInfo), 2);
    }

    #[tokio::test]
    async fn test_purchase_grants_package_entitlement() {
        let sandbox = SandboxBackend::new();
        sandbox.configure("sandbox").await.unwrap();
        let offering = default_offering();
        let package = offering.package("creator").unwrap();

        let snapshot = sandbox.purchase(&user("u1"), package).await.unwrap();
        assert_eq!(snapshot.tier(), EntitlementTier::Creator);
        assert_eq!(
            snapshot.active["creator"].product_id.as_deref(),
            Some("creator_monthly")
        );

        // Other subscribers are unaffected
        let other = sandbox.customer_info(&user("u2")).await.unwrap();
        assert_eq!(other.tier(), EntitlementTier::Free);
    }

    #[tokio::test]
    async fn test_failure_injection_and_recovery() {
        let sandbox = SandboxBackend::new();
        sandbox.configure("sandbox").await.unwrap();
        sandbox.fail(SandboxOp::Offerings).await;
        assert!(matches!(
            sandbox.offerings(&user("u1")).await,
            Err(BillingError::Backend(_))
        ));
        sandbox.recover(SandboxOp::Offerings).await;
        let offerings = sandbox.offerings(&user("u1")).await.unwrap();
        assert_eq!(offerings.current.unwrap().packages.len(), 2);
    }

    #[tokio::test]
    async fn test_hold_releases_one_call_per_permit() {
        let sandbox = Arc::new(SandboxBackend::new());
        sandbox.configure("sandbox").await.unwrap();
        let gate = sandbox.hold(SandboxOp::CustomerInfo).await;

        let task = tokio::spawn({
            let sandbox = sandbox.clone();
            async move { sandbox.customer_info(&user("u1")).await }
        });

        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        gate.add_permits(1);
        assert!(task.await.unwrap().is_ok());
    }
}
