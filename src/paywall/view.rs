//! Render model of the paywall modal

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::billing::{EntitlementTier, Offering, Price};
use crate::catalog::ContentItem;

pub const TITLE: &str = "Premium Content";
pub const SUBSCRIBE_LABEL: &str = "Subscribe to Premium";
pub const PROCESSING_LABEL: &str = "Processing...";
pub const CONTINUE_FREE_LABEL: &str = "Continue with Free Content";
pub const FOOTER: &str =
    "Free content remains completely free. Premium subscriptions support creators.";

const PREMIUM_BENEFITS: &[&str] = &[
    "Access to all premium videos",
    "High-quality downloads",
    "Priority support",
    "Ad-free experience",
];

const CREATOR_BENEFITS: &[&str] = &[
    "Everything in Premium",
    "Creator-only masterclasses",
    "Early access to new courses",
];

/// One purchasable option shown in the modal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseOption {
    /// Package identifier passed to the purchase call
    pub product_id: String,
    pub name: String,
    pub price: Price,
    pub benefits: Vec<String>,
}

impl PurchaseOption {
    /// Premium access at $9.99/month
    pub fn premium() -> Self {
        Self {
            product_id: EntitlementTier::PREMIUM_ENTITLEMENT.to_string(),
            name: "Premium Access".to_string(),
            price: monthly_usd(Decimal::new(999, 2)),
            benefits: to_strings(PREMIUM_BENEFITS),
        }
    }

    /// Options for every package of `offering` with a price, in offering order
    pub fn from_offering(offering: &Offering) -> Vec<Self> {
        offering
            .packages
            .iter()
            .filter_map(|package| {
                let price = package.price.clone()?;
                let (name, benefits) = match package.entitlement.as_str() {
                    EntitlementTier::PREMIUM_ENTITLEMENT => {
                        ("Premium Access".to_string(), to_strings(PREMIUM_BENEFITS))
                    }
                    EntitlementTier::CREATOR_ENTITLEMENT => {
                        ("Creator Access".to_string(), to_strings(CREATOR_BENEFITS))
                    }
                    other => (other.to_string(), Vec::new()),
                };
                Some(Self {
                    product_id: package.identifier.clone(),
                    name,
                    price,
                    benefits,
                })
            })
            .collect()
    }
}

fn to_strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|b| b.to_string()).collect()
}

fn monthly_usd(amount: Decimal) -> Price {
    Price {
        amount,
        currency: "USD".to_string(),
        period: Some("month".to_string()),
    }
}

/// Message shown above the purchase options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaywallNotice {
    /// Last attempt did not go through; the user may retry
    PurchaseFailed { message: String },
    /// Purchase succeeded but does not unlock this item
    InsufficientTier {
        required: EntitlementTier,
        current: EntitlementTier,
    },
}

impl fmt::Display for PaywallNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PurchaseFailed { message } => {
                write!(f, "Processing failed, please try again. {}", message)
            }
            Self::InsufficientTier { required, current } => write!(
                f,
                "Your {} subscription does not include this video; it requires {}.",
                current, required
            ),
        }
    }
}

/// Everything a front-end needs to draw the modal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaywallView {
    pub title: String,
    pub item_line: String,
    pub options: Vec<PurchaseOption>,
    pub subscribe_label: String,
    pub subscribe_enabled: bool,
    pub banner: Option<String>,
    pub continue_label: String,
    pub footer: String,
}

impl PaywallView {
    pub fn new(
        item: &ContentItem,
        options: &[PurchaseOption],
        processing: bool,
        notice: Option<&PaywallNotice>,
    ) -> Self {
        Self {
            title: TITLE.to_string(),
            item_line: format!(
                "\"{}\" by {} is premium content",
                item.title, item.creator_name
            ),
            options: options.to_vec(),
            subscribe_label: if processing {
                PROCESSING_LABEL
            } else {
                SUBSCRIBE_LABEL
            }
            .to_string(),
            subscribe_enabled: !processing,
            banner: notice.map(ToString::to_string),
            continue_label: CONTINUE_FREE_LABEL.to_string(),
            footer: FOOTER.to_string(),
        }
    }
}

impl fmt::Display for PaywallView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", self.item_line)?;
        if let Some(banner) = &self.banner {
            writeln!(f)?;
            writeln!(f, "! {}", banner)?;
        }
        for option in &self.options {
            writeln!(f)?;
            writeln!(f, "[{}] {} - {}", option.product_id, option.name, option.price)?;
            for benefit in &option.benefits {
                writeln!(f, "  * {}", benefit)?;
            }
        }
        writeln!(f)?;
        let state = if self.subscribe_enabled { "" } else { " (disabled)" };
        writeln!(f, "> {}{}", self.subscribe_label, state)?;
        writeln!(f, "> {}", self.continue_label)?;
        writeln!(f)?;
        write!(f, "{}", self.footer)
    }
}
