//! Watch-view access decisions

use std::sync::Arc;

use super::controller::{PaywallController, PaywallResult};
use super::view::PaywallNotice;
use crate::billing::{BillingBackend, EntitlementTier};
use crate::catalog::ContentItem;
use crate::entitlement::EntitlementClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// Paywall opened for the item
    Denied {
        required: EntitlementTier,
        current: EntitlementTier,
    },
}

impl Access {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// How a purchase from the gate ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseResolution {
    /// The refreshed tier grants the item
    Unlocked {
        item: ContentItem,
        tier: EntitlementTier,
    },
    /// The purchase went through but the tier is still too low; paywall reopened
    InsufficientTier {
        item: ContentItem,
        required: EntitlementTier,
        current: EntitlementTier,
    },
    /// No purchase completed (failed, cancelled, busy or closed)
    Pending(PaywallResult),
}

/// Decides between rendering content and opening the paywall
#[derive(Debug)]
pub struct ContentGate<B> {
    client: Arc<EntitlementClient<B>>,
    paywall: PaywallController<B>,
}

impl<B: BillingBackend> ContentGate<B> {
    pub fn new(client: Arc<EntitlementClient<B>>) -> Self {
        let paywall = PaywallController::new(client.clone());
        Self { client, paywall }
    }

    pub fn with_paywall(client: Arc<EntitlementClient<B>>, paywall: PaywallController<B>) -> Self {
        Self { client, paywall }
    }

    pub fn paywall(&self) -> &PaywallController<B> {
        &self.paywall
    }

    pub fn client(&self) -> &EntitlementClient<B> {
        &self.client
    }

    /// Grant `item` or open the paywall for it
    ///
    /// Reads the cached tier only; no network call is made.
    pub async fn request_access(&self, item: &ContentItem) -> Access {
        if !item.is_premium {
            return Access::Granted;
        }

        let required = item.required_tier();
        let current = self.client.cached_tier().await;
        if current.grants(required) {
            tracing::debug!(item = %item.id, tier = %current, "Premium access granted");
            return Access::Granted;
        }

        tracing::info!(item = %item.id, tier = %current, required = %required, "Premium content gated");
        self.paywall.open(item).await;
        Access::Denied { required, current }
    }

    /// Purchase through the paywall, then re-check access against the updated tier
    ///
    /// The tier comes from the shared cache, which the purchase itself wrote;
    /// a status call failing right after a charge cannot relock the item.
    pub async fn purchase(&self, product_id: &str) -> PurchaseResolution {
        let item = match self.paywall.purchase(product_id).await {
            PaywallResult::Purchased { item, .. } => item,
            other => return PurchaseResolution::Pending(other),
        };

        let required = item.required_tier();
        let tier = self.client.cached_tier().await;
        if tier.grants(required) {
            tracing::info!(item = %item.id, tier = %tier, "Content unlocked");
            return PurchaseResolution::Unlocked { item, tier };
        }

        tracing::warn!(
            item = %item.id,
            tier = %tier,
            required = %required,
            "Purchase completed but tier does not unlock the item"
        );
        self.paywall
            .reopen(
                &item,
                PaywallNotice::InsufficientTier {
                    required,
                    current: tier,
                },
            )
            .await;
        PurchaseResolution::InsufficientTier {
            item,
            required,
            current: tier,
        }
    }

    /// "Close" or "Continue with Free Content"
    pub async fn dismiss(&self) {
        self.paywall.dismiss().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{SandboxBackend, SandboxOp, SessionIdentity};
    use crate::paywall::PaywallState;

    fn user(id: &str) -> SessionIdentity {
        SessionIdentity::new(id).unwrap()
    }

    async fn gate() -> (Arc<SandboxBackend>, ContentGate<Arc<SandboxBackend>>) {
        let sandbox = Arc::new(SandboxBackend::new());
        let client = Arc::new(EntitlementClient::new(sandbox.clone()));
        client.configure(Some("sk_sandbox")).await;
        client.login(&user("u1")).await;
        (sandbox, ContentGate::new(client))
    }

    fn calculus() -> ContentItem {
        ContentItem::premium("2", "Advanced Calculus Masterclass", "Dr. Michael Chen", None)
    }

    #[tokio::test]
    async fn test_premium_item_for_free_user_opens_paywall() {
        let (_sandbox, gate) = gate().await;
        let access = gate.request_access(&calculus()).await;

        assert_eq!(
            access,
            Access::Denied {
                required: EntitlementTier::Premium,
                current: EntitlementTier::Free,
            }
        );
        assert_eq!(
            gate.paywall().state().await,
            PaywallState::Open { item: calculus() }
        );
    }

    #[tokio::test]
    async fn test_free_item_is_granted_and_paywall_stays_closed() {
        let (sandbox, gate) = gate().await;
        let item = ContentItem::free("1", "Introduction to Algebra", "Prof. Sarah Johnson");

        assert!(gate.request_access(&item).await.is_granted());
        assert_eq!(gate.paywall().state().await, PaywallState::Closed);
        assert_eq!(sandbox.calls(SandboxOp::CustomerInfo), 0);
    }

    #[tokio::test]
    async fn test_free_item_granted_when_unconfigured() {
        let client = Arc::new(EntitlementClient::new(SandboxBackend::new()));
        let gate = ContentGate::new(client);
        let item = ContentItem::free("1", "Intro", "Kim");
        assert!(gate.request_access(&item).await.is_granted());
        assert!(!gate.request_access(&calculus()).await.is_granted());
    }

    #[tokio::test]
    async fn test_premium_user_is_granted() {
        let sandbox = Arc::new(SandboxBackend::new());
        sandbox.grant(&user("u1"), "premium").await;
        let client = Arc::new(EntitlementClient::new(sandbox.clone()));
        client.configure(Some("sk_sandbox")).await;
        client.login(&user("u1")).await;
        let gate = ContentGate::new(client);

        assert!(gate.request_access(&calculus()).await.is_granted());
        assert_eq!(gate.paywall().state().await, PaywallState::Closed);

        // Creator-only content still needs the creator tier
        let creator_cut = calculus().requiring(EntitlementTier::Creator);
        assert!(!gate.request_access(&creator_cut).await.is_granted());
    }

    #[tokio::test]
    async fn test_purchase_unlocks_item() {
        let (sandbox, gate) = gate().await;
        gate.request_access(&calculus()).await;

        let resolution = gate.purchase("premium").await;
        assert_eq!(
            resolution,
            PurchaseResolution::Unlocked {
                item: calculus(),
                tier: EntitlementTier::Premium,
            }
        );
        assert_eq!(gate.paywall().state().await, PaywallState::Closed);
        assert_eq!(sandbox.calls(SandboxOp::Purchase), 1);
        assert!(gate.request_access(&calculus()).await.is_granted());
    }

    #[tokio::test]
    async fn test_status_outage_after_purchase_still_unlocks() {
        let (sandbox, gate) = gate().await;
        gate.request_access(&calculus()).await;
        sandbox.fail(SandboxOp::CustomerInfo).await;

        assert_eq!(
            gate.purchase("premium").await,
            PurchaseResolution::Unlocked {
                item: calculus(),
                tier: EntitlementTier::Premium,
            }
        );
        assert_eq!(gate.paywall().state().await, PaywallState::Closed);
        assert!(gate.paywall().notice().await.is_none());
        assert!(gate.request_access(&calculus()).await.is_granted());
    }

    #[tokio::test]
    async fn test_premium_purchase_for_creator_item_reopens_paywall() {
        let (_sandbox, gate) = gate().await;
        let item = calculus().requiring(EntitlementTier::Creator);
        gate.request_access(&item).await;

        let resolution = gate.purchase("premium").await;
        assert_eq!(
            resolution,
            PurchaseResolution::InsufficientTier {
                item: item.clone(),
                required: EntitlementTier::Creator,
                current: EntitlementTier::Premium,
            }
        );

        let view = gate.paywall().view().await.unwrap();
        assert!(view.banner.unwrap().contains("requires creator"));

        // Upgrading to creator then unlocks it
        assert!(matches!(
            gate.purchase("creator").await,
            PurchaseResolution::Unlocked { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_purchase_keeps_content_gated() {
        let (sandbox, gate) = gate().await;
        sandbox.fail(SandboxOp::Purchase).await;
        gate.request_access(&calculus()).await;

        assert!(matches!(
            gate.purchase("premium").await,
            PurchaseResolution::Pending(PaywallResult::Retry { .. })
        ));
        assert!(gate.paywall().state().await.is_open());
        assert!(!gate.request_access(&calculus()).await.is_granted());
    }

    #[tokio::test]
    async fn test_dismiss_closes_paywall() {
        let (_sandbox, gate) = gate().await;
        gate.request_access(&calculus()).await;
        gate.dismiss().await;
        assert_eq!(gate.paywall().state().await, PaywallState::Closed);
        assert!(matches!(
            gate.purchase("premium").await,
            PurchaseResolution::Pending(PaywallResult::NotOpen)
        ));
    }
}
