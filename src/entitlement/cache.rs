//! Process-wide cache of the current session's entitlement tier
//!
//! Every identity change bumps an epoch. Writers must present the epoch they
//! observed when their query started; a write carrying an older epoch belongs
//! to a superseded session and is rejected.

use tokio::sync::watch;

use crate::billing::{EntitlementSnapshot, EntitlementTier, SessionIdentity};
use crate::prelude::RwArc;

/// Point-in-time view of the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub identity: Option<SessionIdentity>,
    pub epoch: u64,
    /// Whether the backend login for `identity` has completed
    pub bound: bool,
    pub tier: EntitlementTier,
}

/// Outcome of starting a login
#[derive(Debug)]
pub enum Binding {
    /// Identity already bound on the backend, nothing to do
    Bound { epoch: u64 },
    /// Another caller is logging the identity in; `done` flips to true once bound
    InFlight {
        epoch: u64,
        done: watch::Receiver<bool>,
    },
    /// Backend login required under `epoch`
    ///
    /// Dropping `done` without sending wakes the waiters unbound, which is how
    /// a failed or abandoned login hands over to the next caller.
    Pending {
        epoch: u64,
        done: watch::Sender<bool>,
    },
}

#[derive(Debug, Default)]
struct CacheState {
    identity: Option<SessionIdentity>,
    epoch: u64,
    bound: bool,
    /// Completion signal of the login in flight for `identity`
    login: Option<watch::Receiver<bool>>,
    tier: EntitlementTier,
    snapshot: Option<EntitlementSnapshot>,
}

impl CacheState {
    fn start_login(&mut self) -> Binding {
        let (done, waiter) = watch::channel(false);
        self.login = Some(waiter);
        Binding::Pending {
            epoch: self.epoch,
            done,
        }
    }
}

/// Shared handle; clones observe the same cache
#[derive(Debug, Clone, Default)]
pub struct TierCache {
    inner: RwArc<CacheState>,
}

impl TierCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session(&self) -> SessionView {
        let state = self.inner.read().await;
        SessionView {
            identity: state.identity.clone(),
            epoch: state.epoch,
            bound: state.bound,
            tier: state.tier,
        }
    }

    pub async fn tier(&self) -> EntitlementTier {
        self.inner.read().await.tier
    }

    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    /// Last snapshot applied for the current session
    pub async fn snapshot(&self) -> Option<EntitlementSnapshot> {
        self.inner.read().await.snapshot.clone()
    }

    /// Start a login for `identity`
    ///
    /// A different identity starts a new epoch and drops the cached tier back
    /// to free before any network call is made. The same identity joins a
    /// login already in flight instead of starting a second one.
    pub async fn begin_login(&self, identity: &SessionIdentity) -> Binding {
        let mut state = self.inner.write().await;

        if state.identity.as_ref() == Some(identity) {
            if state.bound {
                return Binding::Bound { epoch: state.epoch };
            }
            // A closed channel means the previous login failed or was dropped
            if let Some(waiter) = state.login.as_ref().filter(|w| w.has_changed().is_ok()) {
                return Binding::InFlight {
                    epoch: state.epoch,
                    done: waiter.clone(),
                };
            }
            return state.start_login();
        }

        state.epoch += 1;
        state.identity = Some(identity.clone());
        state.bound = false;
        state.tier = EntitlementTier::Free;
        state.snapshot = None;
        state.start_login()
    }

    /// Record a completed backend login; rejected if the session moved on
    pub async fn complete_login(&self, epoch: u64, snapshot: EntitlementSnapshot) -> bool {
        let mut state = self.inner.write().await;
        if state.epoch != epoch {
            return false;
        }
        state.bound = true;
        state.login = None;
        state.tier = snapshot.tier();
        state.snapshot = Some(snapshot);
        true
    }

    /// Apply a snapshot obtained under `epoch`; rejected if the session moved on
    pub async fn apply(&self, epoch: u64, snapshot: EntitlementSnapshot) -> bool {
        let mut state = self.inner.write().await;
        if state.epoch != epoch || state.identity.is_none() {
            return false;
        }
        state.tier = snapshot.tier();
        state.snapshot = Some(snapshot);
        true
    }

    /// Forget the session (sign-out); in-flight queries become stale
    pub async fn clear(&self) {
        let mut state = self.inner.write().await;
        state.epoch += 1;
        state.identity = None;
        state.bound = false;
        state.login = None;
        state.tier = EntitlementTier::Free;
        state.snapshot = None;
    }
}
