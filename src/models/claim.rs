use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::INVALIDATED_PREFIX;

// ---------------------------------------------------------------------------
// ClaimId
// ---------------------------------------------------------------------------

/// Internal claim identifier, assigned once at materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(pub Uuid);

impl ClaimId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Identifier carried by synthetic claims that were never materialized.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// ClaimStatus
// ---------------------------------------------------------------------------

/// Where a claim sits in its lifecycle.
///
/// `Invalidated` is terminal and reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Verified,
    Claimed,
    Invalidated,
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Verified => write!(f, "verified"),
            Self::Claimed => write!(f, "claimed"),
            Self::Invalidated => write!(f, "invalidated"),
        }
    }
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// Local record reconciling one storefront order with verification and
/// delivery state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: ClaimId,
    pub claim_code: String,
    pub order_id: String,
    pub email: String,
    pub game_username: Option<String>,
    pub verified: bool,
    pub claimed: bool,
    pub chat_channel_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub invalidated_at: Option<DateTime<Utc>>,
    /// Set once when the buyer asks for in-game delivery.
    #[serde(default)]
    pub delivery_requested_at: Option<DateTime<Utc>>,
}

impl Claim {
    /// Lifecycle state derived from the flags; invalidation wins.
    pub fn status(&self) -> ClaimStatus {
        if self.invalidated_at.is_some() {
            ClaimStatus::Invalidated
        } else if self.claimed {
            ClaimStatus::Claimed
        } else if self.verified {
            ClaimStatus::Verified
        } else {
            ClaimStatus::Active
        }
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated_at.is_some()
    }

    /// Verified and claimed: nothing left for the buyer to do.
    pub fn is_fully_processed(&self) -> bool {
        self.claimed && self.verified
    }

    /// The code as shown to people. Invalidated claims carry a visible prefix.
    pub fn display_code(&self) -> String {
        if self.is_invalidated() {
            format!("{}{}", INVALIDATED_PREFIX, self.claim_code)
        } else {
            self.claim_code.clone()
        }
    }

    /// The order email with the local part hidden, e.g. `b****@example.com`.
    pub fn masked_email(&self) -> String {
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) => {
                let mut chars = local.chars();
                match chars.next() {
                    Some(first) => format!("{}{}@{}", first, "*".repeat(chars.count().max(1)), domain),
                    None => format!("@{}", domain),
                }
            }
            None if email.is_empty() => String::new(),
            None => "*".repeat(email.chars().count()),
        }
    }

    /// Case-insensitive comparison against the order email.
    pub fn email_matches(&self, email: &str) -> bool {
        !self.email.is_empty() && self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}

// ---------------------------------------------------------------------------
// ClaimItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimItem {
    pub item_name: String,
    pub item_category: String,
    pub price: Decimal,
    pub quantity: u32,
    pub image_url: Option<String>,
    pub delivered: bool,
}

impl ClaimItem {
    /// Unit price times quantity.
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

// ---------------------------------------------------------------------------
// ClaimWithItems
// ---------------------------------------------------------------------------

/// A claim together with the items it covers. Every lookup returns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimWithItems {
    #[serde(flatten)]
    pub claim: Claim,
    pub items: Vec<ClaimItem>,
}

impl ClaimWithItems {
    /// Sum of every line total.
    pub fn total_price(&self) -> Decimal {
        self.items.iter().map(ClaimItem::line_total).sum()
    }

    /// Drop the item list, for invalidated claims and for codes that were
    /// already redeemed.
    pub fn withheld(mut self) -> Self {
        self.items.clear();
        self
    }
}
