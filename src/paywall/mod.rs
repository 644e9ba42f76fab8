//! Paywall flow
//!
//! [`ContentGate`] decides whether an item can be watched and drives the
//! [`PaywallController`] modal when it cannot.

pub mod controller;
pub mod gate;
pub mod view;

pub use controller::{PaywallController, PaywallResult, PaywallState, SuccessHook};
pub use gate::{Access, ContentGate, PurchaseResolution};
pub use view::{PaywallNotice, PaywallView, PurchaseOption};
