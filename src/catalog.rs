//! Video catalog
//!
//! Items are read from a JSON array of rows as stored by the content service
//! (`is_premium`, `premium_price`, `uploader.full_name`). When no catalog is
//! available the built-in demo catalog is used instead.

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::billing::EntitlementTier;

const UNKNOWN_CREATOR: &str = "Unknown creator";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse catalog '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid catalog item: {0}")]
    InvalidItem(String),
    #[error("Duplicate catalog item id '{0}'")]
    DuplicateId(String),
}

// ============================================================================
// Content Item
// ============================================================================

/// A video as the gate sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ContentRow", into = "ContentRow")]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub creator_name: String,
    pub is_premium: bool,
    pub price: Option<Decimal>,
    pub subject: Option<String>,
    /// Explicit tier requirement; see [`ContentItem::required_tier`]
    pub tier: Option<EntitlementTier>,
}

impl ContentItem {
    pub fn free(id: &str, title: &str, creator_name: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            creator_name: creator_name.to_string(),
            is_premium: false,
            price: None,
            subject: None,
            tier: None,
        }
    }

    pub fn premium(id: &str, title: &str, creator_name: &str, price: Option<Decimal>) -> Self {
        Self {
            is_premium: true,
            price,
            ..Self::free(id, title, creator_name)
        }
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn requiring(mut self, tier: EntitlementTier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Minimum tier needed to watch the item
    ///
    /// Free items never require anything. Premium items require the explicit
    /// tier if set (never below premium), otherwise premium.
    pub fn required_tier(&self) -> EntitlementTier {
        if !self.is_premium {
            return EntitlementTier::Free;
        }
        self.tier
            .unwrap_or(EntitlementTier::Premium)
            .max(EntitlementTier::Premium)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Uploader {
    full_name: Option<String>,
}

/// Row shape of the content service
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentRow {
    id: serde_json::Value,
    title: String,
    #[serde(default)]
    is_premium: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    premium_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uploader: Option<Uploader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    required_tier: Option<EntitlementTier>,
}

impl TryFrom<ContentRow> for ContentItem {
    type Error = CatalogError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        let id = match row.id {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(CatalogError::InvalidItem(format!(
                    "id must be a string or number, got {}",
                    other
                )));
            }
        };
        if id.is_empty() {
            return Err(CatalogError::InvalidItem("empty id".to_string()));
        }
        if row.title.trim().is_empty() {
            return Err(CatalogError::InvalidItem(format!("item '{}' has no title", id)));
        }
        if row.premium_price.is_some_and(|price| price.is_sign_negative()) {
            return Err(CatalogError::InvalidItem(format!(
                "item '{}' has a negative price",
                id
            )));
        }

        let creator_name = row
            .uploader
            .and_then(|u| u.full_name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_CREATOR.to_string());

        Ok(Self {
            id,
            title: row.title,
            creator_name,
            is_premium: row.is_premium,
            price: row.premium_price,
            subject: row.subject,
            tier: row.required_tier,
        })
    }
}

impl From<ContentItem> for ContentRow {
    fn from(item: ContentItem) -> Self {
        Self {
            id: serde_json::Value::String(item.id),
            title: item.title,
            is_premium: item.is_premium,
            premium_price: item.price,
            subject: item.subject,
            uploader: Some(Uploader {
                full_name: Some(item.creator_name),
            }),
            required_tier: item.tier,
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<ContentItem>,
}

impl Catalog {
    pub fn new(items: Vec<ContentItem>) -> Result<Self, CatalogError> {
        let mut seen = std::collections::HashSet::new();
        for item in &items {
            if !seen.insert(item.id.as_str()) {
                return Err(CatalogError::DuplicateId(item.id.clone()));
            }
        }
        Ok(Self { items })
    }

    /// Read a catalog from a JSON array of content rows
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let items: Vec<ContentItem> =
            serde_json::from_str(&json).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), items = items.len(), "Loaded catalog");
        Self::new(items)
    }

    /// Load `path` if given, falling back to the demo catalog on any failure
    pub fn load_or_demo(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::demo();
        };
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Catalog unavailable, loading demo content");
            Self::demo()
        })
    }

    /// Demo content shown when the content service cannot be reached
    pub fn demo() -> Self {
        let price = |cents: i64| Some(Decimal::new(cents, 2));
        Self {
            items: vec![
                ContentItem::free(
                    "1",
                    "Introduction to Algebra - Basic Concepts",
                    "Prof. Sarah Johnson",
                )
                .with_subject("Mathematics"),
                ContentItem::premium(
                    "2",
                    "Advanced Calculus Masterclass",
                    "Dr. Michael Chen",
                    price(1999),
                )
                .with_subject("Mathematics"),
                ContentItem::free("3", "The Solar System Explained", "Dr. Emily Rodriguez")
                    .with_subject("Science"),
                ContentItem::premium(
                    "4",
                    "Premium Python Programming Course",
                    "Dev. Alex Thompson",
                    price(4999),
                )
                .with_subject("Technology"),
                ContentItem::free("5", "World War II History Overview", "Prof. David Kim")
                    .with_subject("History"),
                ContentItem::premium(
                    "6",
                    "Digital Art Masterclass - Premium Content",
                    "Artist Lisa Wong",
                    price(2999),
                )
                .with_subject("Art"),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&ContentItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn premium_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_premium).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_row_shape_is_narrowed() {
        let item: ContentItem = serde_json::from_str(
            r#"{
                "id": "2",
                "title": "Advanced Calculus Masterclass",
                "is_premium": true,
                "premium_price": 19.99,
                "view_count": 8930,
                "uploader": { "full_name": "Dr. Michael Chen" }
            }"#,
        )
        .unwrap();

        assert_eq!(item.creator_name, "Dr. Michael Chen");
        assert!(item.is_premium);
        assert_eq!(item.price, Some(Decimal::new(1999, 2)));
        assert_eq!(item.required_tier(), EntitlementTier::Premium);
    }

    #[test]
    fn test_missing_uploader_and_numeric_id() {
        let item: ContentItem =
            serde_json::from_str(r#"{"id": 7, "title": "Fractions", "premium_price": null}"#)
                .unwrap();
        assert_eq!(item.id, "7");
        assert_eq!(item.creator_name, UNKNOWN_CREATOR);
        assert!(!item.is_premium);
        assert_eq!(item.required_tier(), EntitlementTier::Free);
    }

    #[test]
    fn test_invalid_rows_rejected() {
        assert!(serde_json::from_str::<ContentItem>(r#"{"id": "", "title": "x"}"#).is_err());
        assert!(serde_json::from_str::<ContentItem>(r#"{"id": "1", "title": " "}"#).is_err());
        assert!(
            serde_json::from_str::<ContentItem>(
                r#"{"id": "1", "title": "x", "premium_price": -1}"#
            )
            .is_err()
        );
    }

    #[test]
    fn test_required_tier() {
        let item = ContentItem::premium("1", "Studio Tour", "Ana", None);
        assert_eq!(item.required_tier(), EntitlementTier::Premium);

        let creator_only = item.clone().requiring(EntitlementTier::Creator);
        assert_eq!(creator_only.required_tier(), EntitlementTier::Creator);

        // A premium item can never be downgraded to free
        let floor = item.requiring(EntitlementTier::Free);
        assert_eq!(floor.required_tier(), EntitlementTier::Premium);

        // Free items ignore an explicit requirement
        let free = ContentItem::free("2", "Intro", "Ana").requiring(EntitlementTier::Creator);
        assert_eq!(free.required_tier(), EntitlementTier::Free);
    }

    #[test]
    fn test_demo_catalog() {
        let catalog = Catalog::demo();
        assert_eq!(catalog.len(), 6);
        assert_eq!(catalog.premium_count(), 3);
        assert_eq!(
            catalog.get("2").map(|i| i.title.as_str()),
            Some("Advanced Calculus Masterclass")
        );
        assert!(catalog.get("99").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "a", "title": "Free one", "uploader": {{"full_name": "Kim"}}}},
                {{"id": "b", "title": "Creator cut", "is_premium": true, "required_tier": "creator"}}
            ]"#
        )
        .unwrap();

        let catalog = Catalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.get("b").unwrap().required_tier(),
            EntitlementTier::Creator
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let items = vec![
            ContentItem::free("1", "A", "x"),
            ContentItem::free("1", "B", "y"),
        ];
        assert!(matches!(
            Catalog::new(items),
            Err(CatalogError::DuplicateId(id)) if id == "1"
        ));
    }

    #[test]
    fn test_broken_file_falls_back_to_demo() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(matches!(
            Catalog::load(file.path()),
            Err(CatalogError::Parse { .. })
        ));
        assert_eq!(Catalog::load_or_demo(Some(file.path())).len(), 6);
        assert_eq!(
            Catalog::load_or_demo(Some(Path::new("/nonexistent/catalog.json"))).len(),
            6
        );
        assert_eq!(Catalog::load_or_demo(None).len(), 6);
    }

    #[test]
    fn test_serializes_back_to_row_shape() {
        let item = ContentItem::premium("4", "Python", "Alex", Some(Decimal::new(4999, 2)));
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["uploader"]["full_name"], "Alex");
        assert_eq!(value["is_premium"], true);
        assert!(value.get("required_tier").is_none());
    }
}
