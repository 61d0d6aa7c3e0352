//! Claim verification and lookup on top of the claim store and order feed.

use std::sync::Arc;

use crate::cache::{ClaimCache, Invalidation};
use crate::claim_code;
use crate::error::{ClaimError, Result};
use crate::models::ClaimWithItems;
use crate::order_client::OrderSource;

const MAX_ORDER_ID_LEN: usize = 100;

/// Public read/verify/invalidate operations used by the web and chat layers.
///
/// Reads go to the [`ClaimCache`] first and fall through to the order feed
/// on a miss. Network calls never happen while the store is locked.
#[derive(Clone)]
pub struct ClaimReconciler {
    cache: Arc<ClaimCache>,
    orders: Arc<dyn OrderSource>,
}

impl ClaimReconciler {
    /// Reconciler over a shared store and an order feed.
    pub fn new(cache: Arc<ClaimCache>, orders: Arc<dyn OrderSource>) -> Self {
        Self { cache, orders }
    }

    /// The underlying store.
    pub fn cache(&self) -> &Arc<ClaimCache> {
        &self.cache
    }

    /// Verify that `email` owns `order_id` and mark the claim verified.
    ///
    /// A claim that is claimed but not yet verified stays eligible: the
    /// ticket flow can mark a claim claimed before the web flow verifies it.
    pub async fn verify(&self, order_id: &str, email: &str) -> Result<ClaimWithItems> {
        let order_id = validate_order_id(order_id)?;
        validate_email(email)?;

        // Loading only fills the store; the decision is taken under its lock.
        self.load(order_id).await?;
        match self.cache.verify(order_id, email) {
            Ok(verified) => {
                tracing::info!(order_id, claim_id = %verified.claim.id, "claim verified");
                Ok(verified)
            }
            Err(e) => {
                tracing::info!(order_id, reason = %e, "verification refused");
                Err(e)
            }
        }
    }

    /// Current state of an order's claim, materializing it if needed.
    pub async fn lookup_by_order_id(&self, order_id: &str) -> Result<ClaimWithItems> {
        let order_id = validate_order_id(order_id)?;
        self.load(order_id).await
    }

    /// Find a claim by its code. Only materialized claims have codes, so this
    /// never reaches the order feed.
    pub fn lookup_by_claim_code(&self, code: &str) -> Result<ClaimWithItems> {
        let code = claim_code::normalize_code_input(code);
        self.cache
            .find_by_claim_code(&code)
            .ok_or_else(|| ClaimError::NotFound(format!("Claim code {}", code)))
    }

    /// Reserve an order for in-game delivery.
    ///
    /// The claim must be verified and not yet sent; a second request for the
    /// same order is refused.
    pub fn begin_delivery(&self, order_id: &str) -> Result<ClaimWithItems> {
        let order_id = validate_order_id(order_id)?;
        self.cache.begin_delivery(order_id)
    }

    // -- Mutators ----------------------------------------------------------

    /// Mark an order's claim claimed.
    pub fn record_claimed(&self, order_id: &str) -> Result<ClaimWithItems> {
        self.cache
            .mark_claimed(order_id)
            .ok_or_else(|| missing(order_id))
    }

    /// Attach the delivery ticket channel to an order's claim.
    pub fn record_channel(&self, order_id: &str, channel_id: &str) -> Result<ClaimWithItems> {
        self.cache
            .attach_channel(order_id, channel_id)
            .ok_or_else(|| missing(order_id))
    }

    /// Store the buyer's in-game username. Blank names are rejected.
    pub fn record_game_username(&self, order_id: &str, username: &str) -> Result<ClaimWithItems> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ClaimError::InvalidArgument("Game username is required".into()));
        }
        self.cache
            .set_game_username(order_id, username)
            .ok_or_else(|| missing(order_id))
    }

    /// Staff revocation. Irreversible; succeeds for unknown orders too.
    pub fn invalidate(&self, order_id: &str) -> Result<Invalidation> {
        let order_id = validate_order_id(order_id)?;
        Ok(self.cache.invalidate(order_id))
    }

    // -- Internals ---------------------------------------------------------

    /// Resolve an order id to its richest known snapshot.
    async fn load(&self, order_id: &str) -> Result<ClaimWithItems> {
        if let Some(cached) = self.cache.find_by_order_id(order_id) {
            if cached.claim.is_invalidated() {
                return Ok(cached);
            }
            tracing::debug!(order_id, "claim cached; refreshing items from order feed");
            return Ok(match self.orders.fetch_order(order_id).await {
                Ok(Some(order)) => self
                    .cache
                    .refresh_items(order_id, order.claim_items())
                    .unwrap_or(cached),
                Ok(None) => {
                    tracing::warn!(order_id, "order vanished upstream; serving cached claim");
                    cached
                }
                Err(e) => {
                    tracing::warn!(order_id, error = %e, "order feed unavailable; serving cached claim");
                    cached
                }
            });
        }

        match self.orders.fetch_order(order_id).await {
            Ok(Some(order)) => Ok(self.cache.materialize(&order, order_id)),
            Ok(None) => Err(ClaimError::NotFound(format!("Order {}", order_id))),
            Err(ClaimError::Config(msg)) => {
                tracing::error!(order_id, %msg, "order feed misconfigured");
                Err(ClaimError::Config(msg))
            }
            Err(e) => {
                tracing::warn!(order_id, error = %e, "order feed unavailable");
                Err(ClaimError::ServiceUnavailable(
                    "Order lookup is temporarily unavailable".into(),
                ))
            }
        }
    }
}

fn missing(order_id: &str) -> ClaimError {
    ClaimError::NotFound(format!("Claim for order {}", order_id))
}

fn validate_order_id(order_id: &str) -> Result<&str> {
    let trimmed = order_id.trim();
    if trimmed.is_empty() {
        return Err(ClaimError::InvalidArgument("Order id is required".into()));
    }
    if trimmed.chars().count() > MAX_ORDER_ID_LEN {
        return Err(ClaimError::InvalidArgument("Order id too long".into()));
    }
    Ok(trimmed)
}

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ClaimError::InvalidArgument("Invalid email format".into()))
    }
}
