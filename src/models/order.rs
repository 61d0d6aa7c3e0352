use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

use super::claim::ClaimItem;

const UNKNOWN_ITEM: &str = "Unknown Item";
const DEFAULT_CATEGORY: &str = "Garden Item";

// ---------------------------------------------------------------------------
// Order: storefront invoice as returned by the order API
// ---------------------------------------------------------------------------

/// An order (invoice) owned by the storefront. Read-only to this crate.
///
/// Deserialization is lenient: the storefront omits fields freely and is not
/// consistent about numbers versus strings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Order {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderLine>,
}

impl Order {
    /// Parse `created_at`, accepting RFC 3339 and `YYYY-MM-DD HH:MM:SS` (UTC).
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Build fresh claim items from the order lines.
    pub fn claim_items(&self) -> Vec<ClaimItem> {
        self.items.iter().map(OrderLine::to_claim_item).collect()
    }
}

// ---------------------------------------------------------------------------
// OrderLine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrderLine {
    #[serde(default)]
    pub product: Option<OrderProduct>,
    #[serde(default)]
    pub variant: Option<OrderVariant>,
    #[serde(default)]
    pub price_usd: Option<Value>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub delivered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrderProduct {
    #[serde(default)]
    pub name: Option<String>,
    /// Either a plain string or an object carrying a `name`.
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrderVariant {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProductImage {
    pub url: String,
}

impl OrderLine {
    /// Product name, then variant name, then a placeholder.
    pub fn name(&self) -> &str {
        self.product
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .or_else(|| self.variant.as_ref().and_then(|v| v.name.as_deref()))
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(UNKNOWN_ITEM)
    }

    /// Category name; accepts a bare string or a `{ "name": ... }` object.
    pub fn category(&self) -> String {
        let category = self.product.as_ref().and_then(|p| p.category.as_ref());
        match category {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Object(map)) => map
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
            _ => DEFAULT_CATEGORY.to_string(),
        }
    }

    /// Unit price in USD, fixed at two decimal places. Unparseable prices
    /// read as zero.
    pub fn unit_price(&self) -> Decimal {
        let parsed = match &self.price_usd {
            Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).ok(),
            Some(Value::String(s)) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        };
        let mut price = parsed.unwrap_or(Decimal::ZERO).round_dp(2);
        price.rescale(2);
        price
    }

    /// Snapshot of this line as stored on a claim.
    pub fn to_claim_item(&self) -> ClaimItem {
        ClaimItem {
            item_name: self.name().to_string(),
            item_category: self.category(),
            price: self.unit_price(),
            quantity: self.quantity.filter(|q| *q >= 1).unwrap_or(1),
            image_url: self
                .product
                .as_ref()
                .and_then(|p| p.images.first())
                .map(|img| img.url.clone()),
            delivered: self.delivered,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
