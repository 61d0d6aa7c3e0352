//! In-memory claim store.
//!
//! Claims live in one table keyed by [`ClaimId`]. Two secondary indices map
//! order ids and claim codes onto that key and are maintained by the store
//! itself, so a mutation made through any key is visible through all of
//! them. A separate block table holds permanent tombstones for orders that
//! staff invalidated; a blocked order never gets a usable claim again.
//!
//! Everything sits behind a single mutex. Callers must not hold the store
//! across an `.await`; every method here is synchronous and short.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::claim_code;
use crate::config::INVALIDATED_PREFIX;
use crate::error::{ClaimError, Result};
use crate::models::{Claim, ClaimId, ClaimItem, ClaimWithItems, Order};

/// Claim code carried by synthetic claims of orders that were blocked before
/// any claim existed.
pub const BLOCKED_CODE: &str = "BLOCKED";

/// Any key a claim can be reached by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKey<'a> {
    Id(ClaimId),
    Order(&'a str),
    Code(&'a str),
}

/// Outcome of [`ClaimCache::invalidate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Invalidation {
    pub order_id: String,
    /// The claim as it was right before invalidation, if one existed.
    pub previous: Option<Claim>,
    /// False when the order was already blocked.
    pub newly_blocked: bool,
}

struct ClaimEntry {
    claim: Claim,
    items: Vec<ClaimItem>,
}

impl ClaimEntry {
    /// Snapshot as handed to callers; invalidated claims never expose their
    /// items.
    fn snapshot(&self) -> ClaimWithItems {
        let snapshot = ClaimWithItems {
            claim: self.claim.clone(),
            items: self.items.clone(),
        };
        if self.claim.is_invalidated() {
            snapshot.withheld()
        } else {
            snapshot
        }
    }

    /// Snapshot for a code lookup. A redeemed code no longer reveals what it
    /// was redeemed for.
    fn code_snapshot(&self) -> ClaimWithItems {
        if self.claim.claimed {
            self.snapshot().withheld()
        } else {
            self.snapshot()
        }
    }
}

#[derive(Default)]
struct CacheState {
    claims: HashMap<ClaimId, ClaimEntry>,
    by_order: HashMap<String, ClaimId>,
    by_code: HashMap<String, ClaimId>,
    blocked: HashMap<String, DateTime<Utc>>,
}

impl CacheState {
    fn resolve(&self, key: ClaimKey<'_>) -> Option<ClaimId> {
        match key {
            ClaimKey::Id(id) => self.claims.contains_key(&id).then_some(id),
            ClaimKey::Order(order_id) => self.by_order.get(order_id).copied(),
            ClaimKey::Code(code) => {
                let code = code.strip_prefix(INVALIDATED_PREFIX).unwrap_or(code);
                self.by_code.get(code).copied()
            }
        }
    }

    fn entry_mut(&mut self, key: ClaimKey<'_>) -> Option<&mut ClaimEntry> {
        let id = self.resolve(key)?;
        self.claims.get_mut(&id)
    }

    fn insert(&mut self, entry: ClaimEntry) {
        let id = entry.claim.id;
        self.by_order.insert(entry.claim.order_id.clone(), id);
        // First claim to register a code keeps it.
        self.by_code.entry(entry.claim.claim_code.clone()).or_insert(id);
        self.claims.insert(id, entry);
    }

    fn blocked_snapshot(&self, order_id: &str) -> Option<ClaimWithItems> {
        let blocked_at = *self.blocked.get(order_id)?;
        if let Some(entry) = self.resolve(ClaimKey::Order(order_id)).and_then(|id| self.claims.get(&id)) {
            return Some(entry.snapshot());
        }
        Some(ClaimWithItems {
            claim: Claim {
                id: ClaimId::nil(),
                claim_code: BLOCKED_CODE.to_string(),
                order_id: order_id.to_string(),
                email: String::new(),
                game_username: None,
                verified: true,
                claimed: true,
                chat_channel_id: None,
                created_at: blocked_at,
                invalidated_at: Some(blocked_at),
                delivery_requested_at: None,
            },
            items: Vec::new(),
        })
    }
}

/// Single-process reconciliation store for claims.
///
/// Construct one per process and share it through an `Arc`.
#[derive(Default)]
pub struct ClaimCache {
    state: Mutex<CacheState>,
}

impl ClaimCache {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A panic mid-mutation leaves at worst one half-updated claim; the
        // indices are only touched in `insert`, which cannot panic halfway.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of materialized claims.
    pub fn len(&self) -> usize {
        self.lock().claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once staff invalidated the order.
    pub fn is_blocked(&self, order_id: &str) -> bool {
        self.lock().blocked.contains_key(order_id)
    }

    // -- Lookups -----------------------------------------------------------

    /// Look up the claim of an order.
    ///
    /// A blocked order always comes back as a spent claim without items: the
    /// invalidated claim itself, or a synthetic blocked claim if the order was
    /// blocked before anyone materialized it.
    pub fn find_by_order_id(&self, order_id: &str) -> Option<ClaimWithItems> {
        let state = self.lock();
        if let Some(blocked) = state.blocked_snapshot(order_id) {
            tracing::debug!(order_id, "order is blocked");
            return Some(blocked);
        }
        let id = state.resolve(ClaimKey::Order(order_id))?;
        state.claims.get(&id).map(ClaimEntry::snapshot)
    }

    /// Look up a claim by its code, or by the `INVALIDATED-` form of it.
    ///
    /// Claimed claims come back without items.
    pub fn find_by_claim_code(&self, code: &str) -> Option<ClaimWithItems> {
        self.find(ClaimKey::Code(code))
    }

    /// Look up a claim by any key. Code keys follow [`Self::find_by_claim_code`].
    pub fn find(&self, key: ClaimKey<'_>) -> Option<ClaimWithItems> {
        let state = self.lock();
        let entry = state.resolve(key).and_then(|id| state.claims.get(&id))?;
        Some(match key {
            ClaimKey::Code(_) => entry.code_snapshot(),
            ClaimKey::Id(_) | ClaimKey::Order(_) => entry.snapshot(),
        })
    }

    // -- Materialization ---------------------------------------------------

    /// Build a claim from an order, unless one already exists.
    ///
    /// Returns the existing claim when the order was seen before, so
    /// resubmitting an order id never mints a second code, and the blocked
    /// snapshot when staff invalidated the order.
    pub fn materialize(&self, order: &Order, order_id: &str) -> ClaimWithItems {
        let mut state = self.lock();

        if let Some(blocked) = state.blocked_snapshot(order_id) {
            tracing::info!(order_id, "refusing to materialize a blocked order");
            return blocked;
        }

        if let Some(entry) = state
            .resolve(ClaimKey::Order(order_id))
            .and_then(|id| state.claims.get(&id))
        {
            tracing::info!(order_id, claim_id = %entry.claim.id, "returning existing claim");
            return entry.snapshot();
        }

        let claim = Claim {
            id: ClaimId::new(),
            claim_code: claim_code::generate(order_id),
            order_id: order_id.to_string(),
            email: order.email.trim().to_string(),
            game_username: None,
            verified: false,
            claimed: false,
            chat_channel_id: None,
            created_at: order.created_at().unwrap_or_else(Utc::now),
            invalidated_at: None,
            delivery_requested_at: None,
        };
        tracing::info!(
            order_id,
            claim_id = %claim.id,
            claim_code = %claim.claim_code,
            items = order.items.len(),
            "materialized claim"
        );

        let entry = ClaimEntry {
            claim,
            items: order.claim_items(),
        };
        let snapshot = entry.snapshot();
        state.insert(entry);
        snapshot
    }

    /// Replace the item snapshot of a claim with a fresher one from the
    /// order feed. Claim-level fields are untouched.
    pub fn refresh_items(&self, order_id: &str, items: Vec<ClaimItem>) -> Option<ClaimWithItems> {
        let mut state = self.lock();
        if state.blocked.contains_key(order_id) {
            return state.blocked_snapshot(order_id);
        }
        let entry = state.entry_mut(ClaimKey::Order(order_id))?;
        entry.items = items;
        Some(entry.snapshot())
    }

    // -- Guarded transitions -----------------------------------------------

    /// Check ownership of an order and mark its claim verified, under one
    /// lock so a concurrent invalidation either wins outright or not at all.
    pub fn verify(&self, order_id: &str, email: &str) -> Result<ClaimWithItems> {
        let mut state = self.lock();
        if state.blocked.contains_key(order_id) {
            return Err(ClaimError::AlreadyProcessed(
                "This order has already been claimed".into(),
            ));
        }
        let entry = state
            .entry_mut(ClaimKey::Order(order_id))
            .ok_or_else(|| ClaimError::NotFound(format!("Claim for order {}", order_id)))?;

        if entry.claim.is_invalidated() {
            return Err(ClaimError::AlreadyProcessed(
                "This order has already been claimed".into(),
            ));
        }
        if entry.claim.is_fully_processed() {
            return Err(ClaimError::AlreadyProcessed(
                "This order has already been claimed and processed".into(),
            ));
        }
        if !entry.claim.email_matches(email) {
            return Err(ClaimError::EmailMismatch);
        }

        entry.claim.verified = true;
        Ok(entry.snapshot())
    }

    /// Stamp a verified claim as sent for delivery. Succeeds once per order.
    pub fn begin_delivery(&self, order_id: &str) -> Result<ClaimWithItems> {
        let mut state = self.lock();
        if state.blocked.contains_key(order_id) {
            return Err(ClaimError::AlreadyProcessed(
                "This order has already been claimed".into(),
            ));
        }
        let entry = state
            .entry_mut(ClaimKey::Order(order_id))
            .ok_or_else(|| ClaimError::NotFound(format!("Claim for order {}", order_id)))?;

        if entry.claim.is_invalidated() {
            return Err(ClaimError::AlreadyProcessed(
                "This order has already been claimed".into(),
            ));
        }
        if !entry.claim.verified {
            return Err(ClaimError::InvalidArgument(
                "Verify the order before requesting delivery".into(),
            ));
        }
        if entry.claim.delivery_requested_at.is_some() {
            return Err(ClaimError::AlreadyProcessed(
                "Delivery was already requested for this order".into(),
            ));
        }

        entry.claim.delivery_requested_at = Some(Utc::now());
        tracing::info!(order_id, claim_id = %entry.claim.id, "delivery requested");
        Ok(entry.snapshot())
    }

    // -- Mutators ----------------------------------------------------------

    /// Mark a claim verified. Idempotent; never clears the flag.
    pub fn set_verified(&self, key: ClaimKey<'_>) -> Option<ClaimWithItems> {
        self.update(key, |claim| claim.verified = true)
    }

    /// Mark a claim claimed. Idempotent; never clears the flag.
    pub fn mark_claimed(&self, order_id: &str) -> Option<ClaimWithItems> {
        self.update(ClaimKey::Order(order_id), |claim| claim.claimed = true)
    }

    /// Remember the ticket channel opened for an order.
    pub fn attach_channel(&self, order_id: &str, channel_id: &str) -> Option<ClaimWithItems> {
        self.update(ClaimKey::Order(order_id), |claim| {
            claim.chat_channel_id = Some(channel_id.to_string())
        })
    }

    /// Record the in-game account the order is delivered to.
    pub fn set_game_username(&self, order_id: &str, username: &str) -> Option<ClaimWithItems> {
        self.update(ClaimKey::Order(order_id), |claim| {
            claim.game_username = Some(username.to_string())
        })
    }

    /// Permanently revoke an order.
    ///
    /// The claim (if any) becomes claimed and invalidated, and the order id
    /// gets a tombstone that outlives anything the order feed says later.
    /// Works for orders that were never materialized. Idempotent.
    pub fn invalidate(&self, order_id: &str) -> Invalidation {
        let mut state = self.lock();
        let now = Utc::now();

        let previous = state.entry_mut(ClaimKey::Order(order_id)).map(|entry| {
            let before = entry.claim.clone();
            entry.claim.claimed = true;
            entry.claim.invalidated_at.get_or_insert(now);
            before
        });

        let newly_blocked = !state.blocked.contains_key(order_id);
        state.blocked.entry(order_id.to_string()).or_insert(now);

        match &previous {
            Some(claim) => tracing::info!(
                order_id,
                claim_code = %claim.claim_code,
                newly_blocked,
                "invalidated claim and blocked order"
            ),
            None => tracing::info!(order_id, newly_blocked, "blocked order without a claim"),
        }

        Invalidation {
            order_id: order_id.to_string(),
            previous,
            newly_blocked,
        }
    }

    fn update<F>(&self, key: ClaimKey<'_>, apply: F) -> Option<ClaimWithItems>
    where
        F: FnOnce(&mut Claim),
    {
        let mut state = self.lock();
        let entry = state.entry_mut(key)?;
        apply(&mut entry.claim);
        Some(entry.snapshot())
    }
}
