//! Typed records exchanged with the billing backend
//!
//! The backend speaks loosely-shaped JSON. Everything crossing the
//! [`BillingBackend`](super::BillingBackend) boundary is narrowed into the
//! records below: malformed entries are dropped (with a warning) instead of
//! failing the whole payload, and expired or inactive grants never count as
//! active.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Session Identity
// ============================================================================

/// Opaque identifier of the signed-in user, supplied by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionIdentity(String);

#[derive(Debug, thiserror::Error)]
#[error("session identity must not be empty")]
pub struct EmptyIdentity;

impl SessionIdentity {
    pub fn new(id: impl Into<String>) -> Result<Self, EmptyIdentity> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(EmptyIdentity);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionIdentity {
    type Err = EmptyIdentity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionIdentity {
    type Error = EmptyIdentity;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionIdentity> for String {
    fn from(value: SessionIdentity) -> Self {
        value.0
    }
}

// ============================================================================
// Entitlement Tier
// ============================================================================

/// Access tier derived from the user's active entitlements
///
/// Ordered: `Free < Premium < Creator`. A higher tier grants everything a
/// lower one does.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementTier {
    #[default]
    Free,
    Premium,
    Creator,
}

impl EntitlementTier {
    pub const PREMIUM_ENTITLEMENT: &'static str = "premium";
    pub const CREATOR_ENTITLEMENT: &'static str = "creator";

    /// Evaluate the tier of a snapshot: creator first, then premium, else free
    pub fn from_snapshot(snapshot: &EntitlementSnapshot) -> Self {
        if snapshot.is_active(Self::CREATOR_ENTITLEMENT) {
            Self::Creator
        } else if snapshot.is_active(Self::PREMIUM_ENTITLEMENT) {
            Self::Premium
        } else {
            Self::Free
        }
    }

    /// Whether this tier is sufficient for content requiring `required`
    pub fn grants(self, required: EntitlementTier) -> bool {
        self >= required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Creator => "creator",
        }
    }
}

impl fmt::Display for EntitlementTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entitlement Snapshot
// ============================================================================

/// An entitlement that is active right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveEntitlement {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Unix seconds; `None` means lifetime access
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// Active entitlements of one subscriber at the time of the query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntitlementSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_user_id: Option<String>,
    pub active: BTreeMap<String, ActiveEntitlement>,
}

impl EntitlementSnapshot {
    pub fn is_active(&self, entitlement: &str) -> bool {
        self.active.contains_key(entitlement)
    }

    pub fn tier(&self) -> EntitlementTier {
        EntitlementTier::from_snapshot(self)
    }

    /// Narrow a customer-info payload into a snapshot as of `now` (unix seconds)
    pub fn narrow(payload: CustomerInfoPayload, now: u64) -> Self {
        let mut active = BTreeMap::new();

        for (identifier, raw) in payload.entitlements {
            let entry: EntitlementPayload = match serde_json::from_value(raw) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(entitlement = %identifier, error = %e, "Dropping malformed entitlement");
                    continue;
                }
            };

            if entry.is_active == Some(false) {
                continue;
            }
            if entry.expires_at.is_some_and(|expires| expires <= now) {
                tracing::debug!(entitlement = %identifier, "Entitlement expired");
                continue;
            }

            active.insert(
                identifier.clone(),
                ActiveEntitlement {
                    identifier,
                    product_id: entry.product_identifier,
                    expires_at: entry.expires_at,
                },
            );
        }

        Self {
            app_user_id: payload.app_user_id,
            active,
        }
    }
}

/// Raw customer-info body as returned by the billing API
#[derive(Debug, Default, Deserialize)]
pub struct CustomerInfoPayload {
    #[serde(default)]
    pub app_user_id: Option<String>,
    #[serde(default)]
    pub entitlements: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct EntitlementPayload {
    #[serde(default)]
    product_identifier: Option<String>,
    #[serde(default)]
    expires_at: Option<u64>,
    #[serde(default)]
    is_active: Option<bool>,
}

// ============================================================================
// Offerings
// ============================================================================

/// Price of a package, e.g. `9.99 USD / month`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Price {
    pub amount: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.currency.eq_ignore_ascii_case("USD") {
            write!(f, "${}", self.amount)?;
        } else {
            write!(f, "{} {}", self.amount, self.currency)?;
        }
        if let Some(period) = &self.period {
            write!(f, "/{}", period)?;
        }
        Ok(())
    }
}

/// A purchasable package inside an offering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    /// Identifier the paywall asks for (e.g. "premium")
    pub identifier: String,
    /// Store product behind the package (e.g. "premium_monthly")
    pub product_id: String,
    /// Entitlement granted by a successful purchase
    pub entitlement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Offering {
    pub identifier: String,
    pub packages: Vec<Package>,
}

impl Offering {
    pub fn package(&self, identifier: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.identifier == identifier)
    }
}

/// Offerings configured for a subscriber, with the one to present by default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OfferingSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Offering>,
    pub all: Vec<Offering>,
}

impl OfferingSnapshot {
    /// Build a snapshot whose single offering is also the current one
    pub fn single(offering: Offering) -> Self {
        Self {
            current: Some(offering.clone()),
            all: vec![offering],
        }
    }

    /// Narrow an offerings payload; packages without an identifier or with an
    /// unreadable price are dropped
    pub fn narrow(payload: OfferingsPayload) -> Self {
        let all: Vec<Offering> = payload
            .offerings
            .into_iter()
            .filter_map(|raw| {
                let raw: OfferingPayload = match serde_json::from_value(raw) {
                    Ok(o) => o,
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping malformed offering");
                        return None;
                    }
                };
                let packages = raw.packages.into_iter().filter_map(narrow_package).collect();
                Some(Offering {
                    identifier: raw.identifier,
                    packages,
                })
            })
            .collect();

        let current = payload
            .current_offering_id
            .as_deref()
            .and_then(|id| all.iter().find(|o| o.identifier == id))
            .cloned();

        Self { current, all }
    }
}

fn narrow_package(raw: Value) -> Option<Package> {
    let raw: PackagePayload = match serde_json::from_value(raw) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed package");
            return None;
        }
    };

    let price = match raw.price {
        None | Some(Value::Null) => None,
        Some(value) => match parse_price(&value) {
            Some(amount) => Some(Price {
                amount,
                currency: raw.currency.unwrap_or_else(|| "USD".to_string()),
                period: raw.period,
            }),
            None => {
                tracing::warn!(package = %raw.identifier, price = %value, "Dropping package with invalid price");
                return None;
            }
        },
    };

    Some(Package {
        product_id: raw
            .platform_product_identifier
            .unwrap_or_else(|| raw.identifier.clone()),
        entitlement: raw.entitlement.unwrap_or_else(|| raw.identifier.clone()),
        identifier: raw.identifier,
        price,
    })
}

/// Accepts `"9.99"` or `9.99`; rejects negatives
fn parse_price(value: &Value) -> Option<Decimal> {
    let amount = match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok()?,
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok()?,
        _ => return None,
    };
    (!amount.is_sign_negative()).then_some(amount)
}

/// Raw offerings body as returned by the billing API
#[derive(Debug, Default, Deserialize)]
pub struct OfferingsPayload {
    #[serde(default)]
    pub current_offering_id: Option<String>,
    #[serde(default)]
    pub offerings: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct OfferingPayload {
    identifier: String,
    #[serde(default)]
    packages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PackagePayload {
    identifier: String,
    #[serde(default)]
    platform_product_identifier: Option<String>,
    #[serde(default)]
    entitlement: Option<String>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    period: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customer_info(value: Value) -> CustomerInfoPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_tier_priority_prefers_creator() {
        let payload = customer_info(json!({
            "app_user_id": "u1",
            "entitlements": {
                "premium": { "product_identifier": "premium_monthly" },
                "creator": { "product_identifier": "creator_monthly" }
            }
        }));
        let snapshot = EntitlementSnapshot::narrow(payload, 1_000);
        assert_eq!(snapshot.tier(), EntitlementTier::Creator);
    }

    #[test]
    fn test_expired_and_inactive_entitlements_are_dropped() {
        let payload = customer_info(json!({
            "entitlements": {
                "premium": { "expires_at": 999 },
                "creator": { "is_active": false }
            }
        }));
        let snapshot = EntitlementSnapshot::narrow(payload, 1_000);
        assert!(snapshot.active.is_empty());
        assert_eq!(snapshot.tier(), EntitlementTier::Free);
    }

    #[test]
    fn test_malformed_entitlement_does_not_poison_snapshot() {
        let payload = customer_info(json!({
            "entitlements": {
                "premium": { "expires_at": 2_000 },
                "creator": "not-an-object"
            }
        }));
        let snapshot = EntitlementSnapshot::narrow(payload, 1_000);
        assert_eq!(snapshot.tier(), EntitlementTier::Premium);
        assert_eq!(snapshot.active["premium"].expires_at, Some(2_000));
    }

    #[test]
    fn test_offerings_narrowing() {
        let payload: OfferingsPayload = serde_json::from_value(json!({
            "current_offering_id": "default",
            "offerings": [
                {
                    "identifier": "default",
                    "packages": [
                        { "identifier": "premium", "platform_product_identifier": "premium_monthly",
                          "price": "9.99", "period": "month" },
                        { "identifier": "creator", "price": 19.99, "currency": "EUR" },
                        { "identifier": "broken", "price": "-1" },
                        { "price": "5.00" }
                    ]
                },
                { "identifier": "legacy", "packages": [] }
            ]
        }))
        .unwrap();

        let snapshot = OfferingSnapshot::narrow(payload);
        let current = snapshot.current.expect("current offering");
        assert_eq!(current.identifier, "default");
        assert_eq!(current.packages.len(), 2);

        let premium = current.package("premium").unwrap();
        assert_eq!(premium.product_id, "premium_monthly");
        assert_eq!(premium.entitlement, "premium");
        assert_eq!(premium.price.as_ref().unwrap().to_string(), "$9.99/month");

        let creator = current.package("creator").unwrap();
        assert_eq!(creator.product_id, "creator");
        assert_eq!(creator.price.as_ref().unwrap().to_string(), "19.99 EUR");

        assert!(current.package("broken").is_none());
        assert_eq!(snapshot.all.len(), 2);
    }

    #[test]
    fn test_missing_current_offering() {
        let payload: OfferingsPayload = serde_json::from_value(json!({
            "current_offering_id": "gone",
            "offerings": [{ "identifier": "default" }]
        }))
        .unwrap();
        assert!(OfferingSnapshot::narrow(payload).current.is_none());
    }

    #[test]
    fn test_tier_grants() {
        assert!(EntitlementTier::Creator.grants(EntitlementTier::Premium));
        assert!(EntitlementTier::Premium.grants(EntitlementTier::Premium));
        assert!(!EntitlementTier::Premium.grants(EntitlementTier::Creator));
        assert!(EntitlementTier::Free.grants(EntitlementTier::Free));
        assert!(!EntitlementTier::Free.grants(EntitlementTier::Premium));
    }

    #[test]
    fn test_session_identity_rejects_blank() {
        assert!(SessionIdentity::new("   ").is_err());
        assert_eq!(SessionIdentity::new(" user-1 ").unwrap().as_str(), "user-1");
        let parsed: Result<SessionIdentity, _> = serde_json::from_value(json!(""));
        assert!(parsed.is_err());
    }
}
