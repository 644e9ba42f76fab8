//! Entitlement client: the only component that talks to the billing backend
//!
//! Nothing here returns an error to the caller. Backend failures are logged
//! and converted to safe defaults (free tier, failed purchase, unchanged
//! state), so a billing outage can never block free content.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use super::attempt::{PurchaseAttempt, PurchaseFailure, PurchaseOutcome};
use super::cache::{Binding, TierCache};
use crate::billing::{
    BillingBackend, BillingError, EntitlementTier, OfferingSnapshot, SessionIdentity,
};
use crate::config::GlobalConfig;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_PURCHASE_TIMEOUT: Duration = Duration::from_secs(30);

/// How many times a tier query is re-issued when the session changes under it
const MAX_SUPERSEDED_RETRIES: usize = 3;

/// Caller-side deadlines for backend calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    pub request: Duration,
    pub purchase: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            request: DEFAULT_REQUEST_TIMEOUT,
            purchase: DEFAULT_PURCHASE_TIMEOUT,
        }
    }
}

impl From<&GlobalConfig> for ClientTimeouts {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            request: config
                .request_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            purchase: config
                .purchase_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_PURCHASE_TIMEOUT),
        }
    }
}

/// Wraps a [`BillingBackend`] with configuration state and the shared tier cache
#[derive(Debug)]
pub struct EntitlementClient<B> {
    backend: B,
    configured: RwLock<bool>,
    /// Serializes `configure` so the backend is configured at most once
    configuring: Mutex<()>,
    cache: TierCache,
    timeouts: ClientTimeouts,
}

/// Run a backend call under a deadline
async fn guard<T>(
    operation: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, BillingError>>,
) -> Result<T, BillingError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| {
            Err(BillingError::TimedOut {
                operation,
                after: limit,
            })
        })
}

impl<B: BillingBackend> EntitlementClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            configured: RwLock::new(false),
            configuring: Mutex::new(()),
            cache: TierCache::new(),
            timeouts: ClientTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Handle on the shared tier cache (clones observe the same state)
    pub fn tier_cache(&self) -> TierCache {
        self.cache.clone()
    }

    pub async fn is_configured(&self) -> bool {
        *self.configured.read().await
    }

    /// Configure the backend with `api_key`
    ///
    /// Idempotent: once configured, further calls return `true` without
    /// touching the backend. A missing key leaves the client unconfigured.
    /// Readers of [`Self::is_configured`] are not blocked while the backend
    /// call is in flight.
    pub async fn configure(&self, api_key: Option<&str>) -> bool {
        let _serial = self.configuring.lock().await;
        if self.is_configured().await {
            tracing::debug!("Billing backend already configured");
            return true;
        }

        let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) else {
            tracing::warn!("Billing API key not configured; every user will be treated as free tier");
            return false;
        };

        match guard("configure", self.timeouts.request, self.backend.configure(key)).await {
            Ok(()) => {
                *self.configured.write().await = true;
                tracing::info!("Billing backend configured");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to configure billing backend");
                false
            }
        }
    }

    /// Bind entitlement queries to `identity` and return its tier
    ///
    /// A new identity supersedes the previous session immediately: the cached
    /// tier drops to free and any query still in flight for the old identity
    /// is discarded when it resolves.
    pub async fn login(&self, identity: &SessionIdentity) -> EntitlementTier {
        if !self.is_configured().await {
            tracing::warn!(user = %identity, "Billing unavailable; login skipped");
            return EntitlementTier::Free;
        }

        let (epoch, done) = match self.cache.begin_login(identity).await {
            Binding::Bound { .. } => {
                tracing::debug!(user = %identity, "Already logged in to billing backend");
                return self.cache.tier().await;
            }
            Binding::InFlight { epoch, done } => {
                tracing::debug!(user = %identity, "Waiting for login already in flight");
                return self.await_login(identity, epoch, done).await;
            }
            Binding::Pending { epoch, done } => (epoch, done),
        };

        match guard("login", self.timeouts.request, self.backend.login(identity)).await {
            Ok(snapshot) => {
                let tier = snapshot.tier();
                if self.cache.complete_login(epoch, snapshot).await {
                    done.send_replace(true);
                    tracing::info!(user = %identity, tier = %tier, "Logged in to billing backend");
                    tier
                } else {
                    tracing::debug!(user = %identity, "Login superseded by a newer session");
                    EntitlementTier::Free
                }
            }
            Err(e) => {
                tracing::error!(user = %identity, error = %e, "Billing login failed");
                EntitlementTier::Free
            }
        }
    }

    /// Tier from another caller's login of `identity`, free if it did not bind
    async fn await_login(
        &self,
        identity: &SessionIdentity,
        epoch: u64,
        mut done: tokio::sync::watch::Receiver<bool>,
    ) -> EntitlementTier {
        let finished = tokio::time::timeout(self.timeouts.request, done.wait_for(|bound| *bound))
            .await
            .is_ok_and(|bound| bound.is_ok());

        let session = self.cache.session().await;
        if finished && session.bound && session.epoch == epoch {
            session.tier
        } else {
            tracing::debug!(user = %identity, "Joined login did not complete; reporting free tier");
            EntitlementTier::Free
        }
    }

    /// Forget the current session (the user signed out)
    pub async fn logout(&self) {
        self.cache.clear().await;
        tracing::info!("Billing session cleared");
    }

    /// Tier currently cached for the session, without a network call
    pub async fn cached_tier(&self) -> EntitlementTier {
        self.cache.tier().await
    }

    /// Fetch the tier from the backend: creator, then premium, else free
    ///
    /// Returns free when unconfigured, when no session is bound, or on any
    /// error. A result belonging to a superseded session is dropped and the
    /// query re-issued for the current identity.
    pub async fn entitlement_tier(&self) -> EntitlementTier {
        if !self.is_configured().await {
            return EntitlementTier::Free;
        }

        for _ in 0..MAX_SUPERSEDED_RETRIES {
            let session = self.cache.session().await;
            let Some(identity) = session.identity else {
                tracing::debug!("No billing session; reporting free tier");
                return EntitlementTier::Free;
            };

            match guard(
                "customer_info",
                self.timeouts.request,
                self.backend.customer_info(&identity),
            )
            .await
            {
                Ok(snapshot) => {
                    let tier = snapshot.tier();
                    if self.cache.apply(session.epoch, snapshot).await {
                        tracing::debug!(user = %identity, tier = %tier, "Entitlement tier refreshed");
                        return tier;
                    }
                    tracing::debug!(user = %identity, "Discarding entitlement result from a superseded session");
                }
                Err(e) => {
                    if self.cache.epoch().await == session.epoch {
                        tracing::warn!(user = %identity, error = %e, "Entitlement check failed; reporting free tier");
                        return EntitlementTier::Free;
                    }
                }
            }
        }

        tracing::warn!("Session kept changing during entitlement check; reporting free tier");
        EntitlementTier::Free
    }

    /// Offerings for the current session (empty when unavailable)
    pub async fn offerings(&self) -> OfferingSnapshot {
        if !self.is_configured().await {
            return OfferingSnapshot::default();
        }
        let Some(identity) = self.cache.session().await.identity else {
            return OfferingSnapshot::default();
        };

        guard("offerings", self.timeouts.request, self.backend.offerings(&identity))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(user = %identity, error = %e, "Failed to fetch offerings");
                OfferingSnapshot::default()
            })
    }

    /// Purchase the package `product_id` from the current offering
    ///
    /// Succeeds only when the package's entitlement is active afterwards. An
    /// unknown product fails without reaching the backend's purchase call.
    /// Failures leave the cached tier untouched.
    pub async fn purchase(&self, product_id: &str) -> PurchaseAttempt {
        let outcome = self.purchase_outcome(product_id).await;

        match &outcome {
            PurchaseOutcome::Purchased { snapshot } => {
                tracing::info!(product_id = %product_id, tier = %snapshot.tier(), "Purchase completed");
            }
            PurchaseOutcome::Failed { failure } => {
                tracing::warn!(product_id = %product_id, reason = %failure, "Purchase failed");
            }
            PurchaseOutcome::Cancelled => {
                tracing::info!(product_id = %product_id, "Purchase cancelled by user");
            }
        }

        PurchaseAttempt::new(product_id, outcome)
    }

    async fn purchase_outcome(&self, product_id: &str) -> PurchaseOutcome {
        let failed = |failure: PurchaseFailure| PurchaseOutcome::Failed { failure };

        if !self.is_configured().await {
            return failed(PurchaseFailure::Unconfigured);
        }
        let session = self.cache.session().await;
        let Some(identity) = session.identity else {
            return failed(PurchaseFailure::NoSession);
        };

        let offerings = match guard(
            "offerings",
            self.timeouts.request,
            self.backend.offerings(&identity),
        )
        .await
        {
            Ok(offerings) => offerings,
            Err(e) => return failed(e.into()),
        };

        let Some(offering) = offerings.current else {
            return failed(PurchaseFailure::NoCurrentOffering);
        };
        let Some(package) = offering.package(product_id) else {
            return failed(PurchaseFailure::ProductNotFound {
                product_id: product_id.to_string(),
            });
        };

        tracing::debug!(
            user = %identity,
            product_id = %package.product_id,
            entitlement = %package.entitlement,
            "Starting purchase"
        );

        match guard(
            "purchase",
            self.timeouts.purchase,
            self.backend.purchase(&identity, package),
        )
        .await
        {
            Err(BillingError::Cancelled) => PurchaseOutcome::Cancelled,
            Err(e) => failed(e.into()),
            Ok(snapshot) if !snapshot.is_active(&package.entitlement) => {
                failed(PurchaseFailure::EntitlementInactive {
                    entitlement: package.entitlement.clone(),
                })
            }
            Ok(snapshot) => {
                if !self.cache.apply(session.epoch, snapshot.clone()).await {
                    tracing::debug!(user = %identity, "Purchase finished after a session change; cache untouched");
                }
                PurchaseOutcome::Purchased { snapshot }
            }
        }
    }

    /// Re-sync purchases for the current session and return the resulting tier
    ///
    /// A no-op when unconfigured or signed out. On failure the cached tier is
    /// left as it was.
    pub async fn restore(&self) -> EntitlementTier {
        if !self.is_configured().await {
            tracing::debug!("Billing unavailable; restore skipped");
            return EntitlementTier::Free;
        }
        let session = self.cache.session().await;
        let Some(identity) = session.identity else {
            tracing::debug!("No billing session; restore skipped");
            return EntitlementTier::Free;
        };

        match guard(
            "restore",
            self.timeouts.request,
            self.backend.restore_purchases(&identity),
        )
        .await
        {
            Ok(snapshot) => {
                let tier = snapshot.tier();
                if self.cache.apply(session.epoch, snapshot).await {
                    tracing::info!(user = %identity, tier = %tier, "Purchases restored");
                }
            }
            Err(e) => {
                tracing::warn!(user = %identity, error = %e, "Failed to restore purchases");
            }
        }
        self.cache.tier().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::billing::{OfferingSnapshot, SandboxBackend, SandboxOp};

    type TestClient = EntitlementClient<Arc<SandboxBackend>>;

    fn user(id: &str) -> SessionIdentity {
        SessionIdentity::new(id).unwrap()
    }

    fn sandbox_client() -> (Arc<SandboxBackend>, TestClient) {
        let sandbox = Arc::new(SandboxBackend::new());
        let client = EntitlementClient::new(sandbox.clone());
        (sandbox, client)
    }

    async fn logged_in(id: &str) -> (Arc<SandboxBackend>, TestClient) {
        let (sandbox, client) = sandbox_client();
        assert!(client.configure(Some("sk_sandbox")).await);
        client.login(&user(id)).await;
        (sandbox, client)
    }

    #[tokio::test]
    async fn test_unconfigured_client_reports_free() {
        let (sandbox, client) = sandbox_client();
        sandbox.grant(&user("u1"), "premium").await;

        assert!(!client.configure(None).await);
        assert!(!client.configure(Some("   ")).await);
        assert!(!client.is_configured().await);

        assert_eq!(client.login(&user("u1")).await, EntitlementTier::Free);
        assert_eq!(client.entitlement_tier().await, EntitlementTier::Free);
        assert_eq!(client.restore().await, EntitlementTier::Free);
        assert_eq!(
            client.purchase("premium").await.failure(),
            Some(&PurchaseFailure::Unconfigured)
        );

        assert_eq!(sandbox.calls(SandboxOp::Configure), 0);
        assert_eq!(sandbox.calls(SandboxOp::Login), 0);
        assert_eq!(sandbox.calls(SandboxOp::CustomerInfo), 0);
    }

    #[tokio::test]
    async fn test_configure_is_idempotent() {
        let (sandbox, client) = sandbox_client();
        assert!(client.configure(Some("sk_sandbox")).await);
        assert!(client.configure(Some("sk_other")).await);
        assert!(client.configure(None).await);
        assert_eq!(sandbox.calls(SandboxOp::Configure), 1);
    }

    #[tokio::test]
    async fn test_configure_failure_leaves_client_unconfigured() {
        let (sandbox, client) = sandbox_client();
        sandbox.fail(SandboxOp::Configure).await;
        assert!(!client.configure(Some("sk_sandbox")).await);
        assert!(!client.is_configured().await);

        sandbox.recover(SandboxOp::Configure).await;
        assert!(client.configure(Some("sk_sandbox")).await);
    }

    #[tokio::test]
    async fn test_repeated_login_binds_once() {
        let (sandbox, client) = logged_in("u1").await;
        client.login(&user("u1")).await;
        client.login(&user("u1")).await;
        assert_eq!(sandbox.calls(SandboxOp::Login), 1);
    }

    #[tokio::test]
    async fn test_concurrent_logins_share_one_backend_login() {
        let sandbox = Arc::new(SandboxBackend::new());
        let client = Arc::new(EntitlementClient::new(sandbox.clone()));
        client.configure(Some("sk_sandbox")).await;
        sandbox.grant(&user("u1"), "premium").await;

        let gate = sandbox.hold(SandboxOp::Login).await;
        let spawn_login = || {
            let client = client.clone();
            tokio::spawn(async move { client.login(&user("u1")).await })
        };

        let first = spawn_login();
        while sandbox.calls(SandboxOp::Login) == 0 {
            tokio::task::yield_now().await;
        }
        let second = spawn_login();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        gate.add_permits(2);
        assert_eq!(first.await.unwrap(), EntitlementTier::Premium);
        assert_eq!(second.await.unwrap(), EntitlementTier::Premium);
        assert_eq!(sandbox.calls(SandboxOp::Login), 1);
    }

    #[tokio::test]
    async fn test_configure_does_not_block_readers() {
        let sandbox = Arc::new(SandboxBackend::new());
        let client = Arc::new(EntitlementClient::new(sandbox.clone()));
        let gate = sandbox.hold(SandboxOp::Configure).await;

        let spawn_configure = || {
            let client = client.clone();
            tokio::spawn(async move { client.configure(Some("sk_sandbox")).await })
        };
        let first = spawn_configure();
        while sandbox.calls(SandboxOp::Configure) == 0 {
            tokio::task::yield_now().await;
        }
        let second = spawn_configure();

        let read = tokio::time::timeout(Duration::from_secs(1), client.is_configured()).await;
        assert_eq!(read, Ok(false));

        gate.add_permits(1);
        assert!(first.await.unwrap());
        assert!(second.await.unwrap());
        assert!(client.is_configured().await);
        assert_eq!(sandbox.calls(SandboxOp::Configure), 1);
    }

    #[tokio::test]
    async fn test_failed_login_is_retried() {
        let (sandbox, client) = sandbox_client();
        client.configure(Some("sk_sandbox")).await;
        sandbox.grant(&user("u1"), "premium").await;

        sandbox.fail(SandboxOp::Login).await;
        assert_eq!(client.login(&user("u1")).await, EntitlementTier::Free);

        sandbox.recover(SandboxOp::Login).await;
        assert_eq!(client.login(&user("u1")).await, EntitlementTier::Premium);
        assert_eq!(sandbox.calls(SandboxOp::Login), 2);
    }

    #[tokio::test]
    async fn test_tier_priority_creator_over_premium() {
        let (sandbox, client) = logged_in("u1").await;
        sandbox.grant(&user("u1"), "premium").await;
        sandbox.grant(&user("u1"), "creator").await;
        assert_eq!(client.entitlement_tier().await, EntitlementTier::Creator);
        assert_eq!(client.cached_tier().await, EntitlementTier::Creator);
    }

    #[tokio::test]
    async fn test_tier_check_error_reports_free_without_clearing_cache() {
        let (sandbox, client) = sandbox_client();
        client.configure(Some("sk_sandbox")).await;
        sandbox.grant(&user("u1"), "premium").await;
        assert_eq!(client.login(&user("u1")).await, EntitlementTier::Premium);

        sandbox.fail(SandboxOp::CustomerInfo).await;
        assert_eq!(client.entitlement_tier().await, EntitlementTier::Free);
        assert_eq!(client.cached_tier().await, EntitlementTier::Premium);
    }

    #[tokio::test]
    async fn test_purchase_then_tier_is_premium() {
        let (_sandbox, client) = logged_in("u1").await;
        let attempt = client.purchase("premium").await;
        assert!(attempt.succeeded());
        assert_eq!(client.cached_tier().await, EntitlementTier::Premium);
        assert_eq!(client.entitlement_tier().await, EntitlementTier::Premium);
    }

    #[tokio::test]
    async fn test_unknown_product_never_reaches_purchase() {
        let (sandbox, client) = logged_in("u1").await;
        let attempt = client.purchase("gold").await;

        assert!(!attempt.succeeded());
        assert_eq!(
            attempt.failure(),
            Some(&PurchaseFailure::ProductNotFound {
                product_id: "gold".to_string()
            })
        );
        assert_eq!(sandbox.calls(SandboxOp::Purchase), 0);
        assert_eq!(client.cached_tier().await, EntitlementTier::Free);
    }

    #[tokio::test]
    async fn test_backend_error_during_purchase_leaves_tier_untouched() {
        let (sandbox, client) = logged_in("u1").await;
        sandbox.fail(SandboxOp::Purchase).await;

        let attempt = client.purchase("premium").await;
        assert!(matches!(
            attempt.failure(),
            Some(PurchaseFailure::Backend { .. })
        ));
        assert_eq!(sandbox.calls(SandboxOp::Purchase), 1);
        assert_eq!(client.cached_tier().await, EntitlementTier::Free);
        assert!(client.tier_cache().snapshot().await.unwrap().active.is_empty());
    }

    #[tokio::test]
    async fn test_offerings_error_fails_purchase() {
        let (sandbox, client) = logged_in("u1").await;
        sandbox.fail(SandboxOp::Offerings).await;
        assert!(!client.purchase("premium").await.succeeded());
        assert_eq!(sandbox.calls(SandboxOp::Purchase), 0);
    }

    #[tokio::test]
    async fn test_purchase_without_current_offering() {
        let sandbox = Arc::new(SandboxBackend::with_offerings(OfferingSnapshot::default()));
        let client = EntitlementClient::new(sandbox.clone());
        client.configure(Some("sk_sandbox")).await;
        client.login(&user("u1")).await;

        assert_eq!(
            client.purchase("premium").await.failure(),
            Some(&PurchaseFailure::NoCurrentOffering)
        );
    }

    #[tokio::test]
    async fn test_purchase_requires_session() {
        let (_sandbox, client) = sandbox_client();
        client.configure(Some("sk_sandbox")).await;
        assert_eq!(
            client.purchase("premium").await.failure(),
            Some(&PurchaseFailure::NoSession)
        );
    }

    #[tokio::test]
    async fn test_cancelled_purchase() {
        let (sandbox, client) = logged_in("u1").await;
        sandbox.cancel_purchases(true).await;
        let attempt = client.purchase("premium").await;
        assert_eq!(attempt.outcome, PurchaseOutcome::Cancelled);
        assert_eq!(client.cached_tier().await, EntitlementTier::Free);
    }

    #[tokio::test]
    async fn test_purchase_without_active_entitlement_fails() {
        let (sandbox, client) = logged_in("u1").await;
        sandbox.withhold_purchase_grants(true).await;
        let attempt = client.purchase("premium").await;
        assert_eq!(
            attempt.failure(),
            Some(&PurchaseFailure::EntitlementInactive {
                entitlement: "premium".to_string()
            })
        );
        assert_eq!(client.cached_tier().await, EntitlementTier::Free);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_purchase_times_out() {
        let (sandbox, client) = logged_in("u1").await;
        let _gate = sandbox.hold(SandboxOp::Purchase).await;

        let attempt = client.purchase("premium").await;
        assert_eq!(attempt.failure(), Some(&PurchaseFailure::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_login_times_out_to_free() {
        let (sandbox, client) = sandbox_client();
        client.configure(Some("sk_sandbox")).await;
        sandbox.grant(&user("u1"), "premium").await;
        let gate = sandbox.hold(SandboxOp::Login).await;

        assert_eq!(client.login(&user("u1")).await, EntitlementTier::Free);
        assert_eq!(client.cached_tier().await, EntitlementTier::Free);
        assert!(!client.tier_cache().session().await.bound);
        assert!(client.tier_cache().snapshot().await.is_none());

        // The next login starts over rather than waiting on the abandoned one
        gate.add_permits(1);
        assert_eq!(client.login(&user("u1")).await, EntitlementTier::Premium);
        assert_eq!(sandbox.calls(SandboxOp::Login), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_requests_fall_back_to_safe_defaults() {
        let (sandbox, client) = sandbox_client();
        client.configure(Some("sk_sandbox")).await;
        sandbox.grant(&user("u1"), "premium").await;
        assert_eq!(client.login(&user("u1")).await, EntitlementTier::Premium);

        let _info = sandbox.hold(SandboxOp::CustomerInfo).await;
        let _offerings = sandbox.hold(SandboxOp::Offerings).await;
        let _restore = sandbox.hold(SandboxOp::Restore).await;

        assert_eq!(client.entitlement_tier().await, EntitlementTier::Free);
        assert_eq!(client.offerings().await, OfferingSnapshot::default());
        assert_eq!(client.restore().await, EntitlementTier::Premium);
        assert_eq!(
            client.purchase("premium").await.failure(),
            Some(&PurchaseFailure::TimedOut)
        );

        assert_eq!(client.cached_tier().await, EntitlementTier::Premium);
        assert!(client.tier_cache().session().await.bound);
        assert_eq!(sandbox.calls(SandboxOp::Purchase), 0);
    }

    #[tokio::test]
    async fn test_restore_picks_up_out_of_band_grants() {
        let (sandbox, client) = logged_in("u1").await;
        assert_eq!(client.cached_tier().await, EntitlementTier::Free);

        sandbox.grant(&user("u1"), "premium").await;
        assert_eq!(client.restore().await, EntitlementTier::Premium);

        sandbox.fail(SandboxOp::Restore).await;
        assert_eq!(client.restore().await, EntitlementTier::Premium);
    }

    #[tokio::test]
    async fn test_logout_reports_free_without_network() {
        let (sandbox, client) = sandbox_client();
        client.configure(Some("sk_sandbox")).await;
        sandbox.grant(&user("u1"), "premium").await;
        client.login(&user("u1")).await;

        client.logout().await;
        let before = sandbox.calls(SandboxOp::CustomerInfo);
        assert_eq!(client.entitlement_tier().await, EntitlementTier::Free);
        assert_eq!(sandbox.calls(SandboxOp::CustomerInfo), before);
    }

    #[tokio::test]
    async fn test_user_switch_never_leaks_previous_tier() {
        let sandbox = Arc::new(SandboxBackend::new());
        let client = Arc::new(EntitlementClient::new(sandbox.clone()));
        client.configure(Some("sk_sandbox")).await;
        sandbox.grant(&user("alice"), "premium").await;
        sandbox.grant(&user("bob"), "creator").await;

        assert_eq!(client.login(&user("alice")).await, EntitlementTier::Premium);

        // Alice's query is issued first and held at the network boundary
        let gate = sandbox.hold(SandboxOp::CustomerInfo).await;
        let query = tokio::spawn({
            let client = client.clone();
            async move { client.entitlement_tier().await }
        });
        while sandbox.calls(SandboxOp::CustomerInfo) == 0 {
            tokio::task::yield_now().await;
        }

        // Bob signs in while it is in flight
        assert_eq!(client.login(&user("bob")).await, EntitlementTier::Creator);

        // Alice's result resolves late and must be discarded; the re-issued
        // query for Bob needs its own permit
        gate.add_permits(2);
        assert_eq!(query.await.unwrap(), EntitlementTier::Creator);
        assert_eq!(client.cached_tier().await, EntitlementTier::Creator);
        assert_eq!(sandbox.calls(SandboxOp::CustomerInfo), 2);
    }

    #[tokio::test]
    async fn test_user_switch_to_free_user_drops_premium() {
        let sandbox = Arc::new(SandboxBackend::new());
        let client = Arc::new(EntitlementClient::new(sandbox.clone()));
        client.configure(Some("sk_sandbox")).await;
        sandbox.grant(&user("alice"), "premium").await;
        client.login(&user("alice")).await;

        let gate = sandbox.hold(SandboxOp::CustomerInfo).await;
        let query = tokio::spawn({
            let client = client.clone();
            async move { client.entitlement_tier().await }
        });
        while sandbox.calls(SandboxOp::CustomerInfo) == 0 {
            tokio::task::yield_now().await;
        }

        client.login(&user("bob")).await;
        assert_eq!(client.cached_tier().await, EntitlementTier::Free);

        gate.add_permits(2);
        assert_eq!(query.await.unwrap(), EntitlementTier::Free);
        assert_eq!(client.cached_tier().await, EntitlementTier::Free);
    }
}
