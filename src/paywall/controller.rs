//! Paywall modal state machine
//!
//! ```text
//! Closed --open--> Open --purchase--> Processing --success--> Closed
//!                   ^  \                  |
//!                   |   dismiss           | failure / cancel
//!                   |     v               v
//!                   |   Closed           Open (with banner)
//! ```
//!
//! The transition into `Processing` is a check-and-set under one write lock,
//! so at most one purchase is outstanding per controller.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use super::view::{PaywallNotice, PaywallView, PurchaseOption};
use crate::billing::BillingBackend;
use crate::catalog::ContentItem;
use crate::entitlement::{EntitlementClient, PurchaseAttempt, PurchaseOutcome};

/// Callback run after a successful purchase, before the modal closes
pub type SuccessHook = Arc<dyn Fn(&ContentItem, &PurchaseAttempt) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaywallState {
    #[default]
    Closed,
    Open {
        item: ContentItem,
    },
    Processing {
        item: ContentItem,
        product_id: String,
    },
}

impl PaywallState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing { .. })
    }

    pub fn item(&self) -> Option<&ContentItem> {
        match self {
            Self::Closed => None,
            Self::Open { item } | Self::Processing { item, .. } => Some(item),
        }
    }
}

/// What a purchase trigger did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaywallResult {
    /// Purchase confirmed; the hook ran and the modal is closed
    Purchased {
        item: ContentItem,
        attempt: PurchaseAttempt,
    },
    /// Failed or cancelled; the modal is open again for a retry
    Retry { attempt: PurchaseAttempt },
    /// Another purchase is in flight; nothing was called
    Busy,
    /// The modal is closed; nothing was called
    NotOpen,
}

#[derive(Debug, Default)]
struct Modal {
    state: PaywallState,
    notice: Option<PaywallNotice>,
}

pub struct PaywallController<B> {
    client: Arc<EntitlementClient<B>>,
    modal: RwLock<Modal>,
    options: Vec<PurchaseOption>,
    on_success: Option<SuccessHook>,
}

impl<B> std::fmt::Debug for PaywallController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaywallController")
            .field("options", &self.options)
            .field("on_success", &self.on_success.is_some())
            .finish_non_exhaustive()
    }
}

impl<B: BillingBackend> PaywallController<B> {
    pub fn new(client: Arc<EntitlementClient<B>>) -> Self {
        Self {
            client,
            modal: RwLock::new(Modal::default()),
            options: vec![PurchaseOption::premium()],
            on_success: None,
        }
    }

    /// Replace the purchase options shown in the modal
    pub fn with_options(mut self, options: Vec<PurchaseOption>) -> Self {
        if !options.is_empty() {
            self.options = options;
        }
        self
    }

    /// Register the callback run when a purchase succeeds
    pub fn on_purchase_success(
        &mut self,
        hook: impl Fn(&ContentItem, &PurchaseAttempt) + Send + Sync + 'static,
    ) {
        self.on_success = Some(Arc::new(hook));
    }

    pub fn options(&self) -> &[PurchaseOption] {
        &self.options
    }

    pub async fn state(&self) -> PaywallState {
        self.modal.read().await.state.clone()
    }

    pub async fn notice(&self) -> Option<PaywallNotice> {
        self.modal.read().await.notice.clone()
    }

    /// Show the modal for `item`
    ///
    /// Replaces the item if already open. Ignored while a purchase is processing.
    pub async fn open(&self, item: &ContentItem) {
        let mut modal = self.modal.write().await;
        if modal.state.is_processing() {
            tracing::debug!(item = %item.id, "Paywall busy; open ignored");
            return;
        }
        tracing::debug!(item = %item.id, "Opening paywall");
        modal.state = PaywallState::Open { item: item.clone() };
        modal.notice = None;
    }

    /// Reopen for `item` with a banner explaining why it is still locked
    pub(crate) async fn reopen(&self, item: &ContentItem, notice: PaywallNotice) {
        let mut modal = self.modal.write().await;
        if modal.state.is_processing() {
            return;
        }
        modal.state = PaywallState::Open { item: item.clone() };
        modal.notice = Some(notice);
    }

    /// Close the modal without purchasing ("close" or "continue with free")
    ///
    /// Ignored while a purchase is processing.
    pub async fn dismiss(&self) {
        let mut modal = self.modal.write().await;
        match modal.state {
            PaywallState::Processing { .. } => {
                tracing::debug!("Paywall busy; dismiss ignored");
            }
            PaywallState::Open { .. } => {
                modal.state = PaywallState::Closed;
                modal.notice = None;
                tracing::debug!("Paywall dismissed");
            }
            PaywallState::Closed => {}
        }
    }

    /// Purchase `product_id` for the item the modal is open for
    pub async fn purchase(&self, product_id: &str) -> PaywallResult {
        let item = {
            let mut modal = self.modal.write().await;
            let item = match &modal.state {
                PaywallState::Closed => return PaywallResult::NotOpen,
                PaywallState::Processing { .. } => {
                    tracing::debug!(product_id = %product_id, "Purchase already in flight");
                    return PaywallResult::Busy;
                }
                PaywallState::Open { item } => item.clone(),
            };
            modal.state = PaywallState::Processing {
                item: item.clone(),
                product_id: product_id.to_string(),
            };
            modal.notice = None;
            item
        };

        let attempt = self.client.purchase(product_id).await;

        if attempt.succeeded() {
            if let Some(hook) = &self.on_success {
                hook(&item, &attempt);
            }
            let mut modal = self.modal.write().await;
            modal.state = PaywallState::Closed;
            modal.notice = None;
            return PaywallResult::Purchased { item, attempt };
        }

        let mut modal = self.modal.write().await;
        modal.notice = match &attempt.outcome {
            PurchaseOutcome::Failed { failure } => Some(PaywallNotice::PurchaseFailed {
                message: failure.to_string(),
            }),
            _ => None,
        };
        modal.state = PaywallState::Open { item };
        PaywallResult::Retry { attempt }
    }

    /// Render model of the modal, or `None` while closed
    pub async fn view(&self) -> Option<PaywallView> {
        let modal = self.modal.read().await;
        let item = modal.state.item()?;
        Some(PaywallView::new(
            item,
            &self.options,
            modal.state.is_processing(),
            modal.notice.as_ref(),
        ))
    }
}
