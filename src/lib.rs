//! Ryft claim desk.
//!
//! Reconciles storefront orders with local claim state: buyers verify an
//! order by email, get a short claim code, and redeem it through a private
//! chat delivery ticket. Staff can permanently invalidate an order. Claims
//! live in memory; the storefront order feed is the source of truth for
//! order contents.
//!
//! # Quick start
//!
//! ```no_run
//! use ryft_claims::{ClaimDesk, config::Settings};
//!
//! # async fn run() -> ryft_claims::Result<()> {
//! let settings = Settings::from_env()?;
//! let desk = ClaimDesk::builder().settings(&settings).build()?;
//!
//! // Verify a buyer's order
//! let claim = desk.claims().verify("4e6d5d5941fbd-0000006644093", "buyer@example.com").await?;
//! println!("{} -> {}", claim.claim.order_id, claim.claim.claim_code);
//! # Ok(())
//! # }
//! ```

pub mod accounts;
pub mod cache;
pub mod chat;
pub mod claim_code;
pub mod config;
pub mod delivery;
pub mod error;
pub mod models;
pub mod order_client;
pub mod reconciler;

pub use accounts::{GameAccount, GameAccounts, RobloxAccounts};
pub use cache::{ClaimCache, ClaimKey, Invalidation};
pub use delivery::{DeliveryDispatcher, DeliveryReceipt};
pub use error::{ClaimError, Result};
pub use order_client::{OrderSource, SellAuthClient};
pub use reconciler::ClaimReconciler;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chat::{ChatCommands, ChatPlatform, DiscordRest, TicketDesk, TicketSettings};
use config::{
    ChatConfig, DeliveryConfig, OrderApiConfig, Settings, DEFAULT_CLEANUP_DELAY, DEFAULT_TIMEOUT,
};

// ---------------------------------------------------------------------------
// ClaimDeskBuilder
// ---------------------------------------------------------------------------

/// Builder for a [`ClaimDesk`].
///
/// Every collaborator can be injected; anything not injected is built from
/// the matching config section.
pub struct ClaimDeskBuilder {
    order_api: Option<OrderApiConfig>,
    orders: Option<Arc<dyn OrderSource>>,
    accounts: Option<Arc<dyn GameAccounts>>,
    chat_config: Option<ChatConfig>,
    chat: Option<(Arc<dyn ChatPlatform>, TicketSettings)>,
    delivery: DeliveryConfig,
    cache: Option<Arc<ClaimCache>>,
    timeout: Duration,
    cleanup_delay: Duration,
}

impl Default for ClaimDeskBuilder {
    fn default() -> Self {
        Self {
            order_api: None,
            orders: None,
            accounts: None,
            chat_config: None,
            chat: None,
            delivery: DeliveryConfig::default(),
            cache: None,
            timeout: DEFAULT_TIMEOUT,
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
        }
    }
}

impl ClaimDeskBuilder {
    /// Apply every section of process settings.
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.order_api = Some(settings.orders.clone());
        self.delivery = settings.delivery.clone();
        self.chat_config = settings.chat.clone();
        self.timeout = settings.timeout;
        self
    }

    /// Storefront API credentials for the default [`SellAuthClient`].
    pub fn order_api(mut self, config: OrderApiConfig) -> Self {
        self.order_api = Some(config);
        self
    }

    /// Use a custom order feed instead of the storefront API.
    pub fn order_source(mut self, source: Arc<dyn OrderSource>) -> Self {
        self.orders = Some(source);
        self
    }

    /// Use a custom game-account lookup instead of the Roblox API.
    pub fn accounts(mut self, accounts: Arc<dyn GameAccounts>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Enable delivery tickets over the Discord REST API.
    pub fn chat_config(mut self, config: ChatConfig) -> Self {
        self.chat_config = Some(config);
        self
    }

    /// Enable delivery tickets over a custom chat platform.
    pub fn chat(mut self, platform: Arc<dyn ChatPlatform>, settings: TicketSettings) -> Self {
        self.chat = Some((platform, settings));
        self
    }

    /// Delivery webhook and game settings.
    pub fn delivery(mut self, config: DeliveryConfig) -> Self {
        self.delivery = config;
        self
    }

    /// Share an existing claim store.
    pub fn cache(mut self, cache: Arc<ClaimCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Timeout for every outbound HTTP call. Defaults to 10 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Grace period before a claimed ticket channel is deleted.
    pub fn cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    /// Build the desk. Fails when no order source can be made.
    pub fn build(self) -> Result<ClaimDesk> {
        let orders: Arc<dyn OrderSource> = match self.orders {
            Some(source) => source,
            None => {
                let config = self.order_api.ok_or_else(|| {
                    ClaimError::Config("no order source or storefront API configured".into())
                })?;
                Arc::new(SellAuthClient::with_timeout(config, self.timeout)?)
            }
        };
        let accounts: Arc<dyn GameAccounts> = match self.accounts {
            Some(accounts) => accounts,
            None => Arc::new(RobloxAccounts::with_timeout(self.timeout)?),
        };

        let cache = self.cache.unwrap_or_default();
        let claims = ClaimReconciler::new(Arc::clone(&cache), orders);

        let chat = match (self.chat, self.chat_config) {
            (Some(injected), _) => Some(injected),
            (None, Some(config)) => {
                let platform: Arc<dyn ChatPlatform> =
                    Arc::new(DiscordRest::with_timeout(&config, self.timeout)?);
                Some((platform, TicketSettings::from(&config)))
            }
            (None, None) => None,
        };
        let tickets = chat.map(|(platform, settings)| TicketDesk::new(platform, claims.clone(), settings));

        Ok(ClaimDesk {
            cache,
            claims,
            accounts,
            delivery: DeliveryDispatcher::with_timeout(self.delivery, self.timeout)?,
            tickets,
            cleanup_delay: self.cleanup_delay,
        })
    }
}

// ---------------------------------------------------------------------------
// ClaimDesk
// ---------------------------------------------------------------------------

/// Entry point wiring the claim store to its collaborators.
///
/// Cheap to share behind an `Arc`; every accessor borrows.
pub struct ClaimDesk {
    cache: Arc<ClaimCache>,
    claims: ClaimReconciler,
    accounts: Arc<dyn GameAccounts>,
    delivery: DeliveryDispatcher,
    tickets: Option<TicketDesk>,
    cleanup_delay: Duration,
}

impl ClaimDesk {
    /// Create a new [`ClaimDeskBuilder`].
    pub fn builder() -> ClaimDeskBuilder {
        ClaimDeskBuilder::default()
    }

    /// Verify, look up and invalidate claims.
    pub fn claims(&self) -> &ClaimReconciler {
        &self.claims
    }

    /// Game-account lookup.
    pub fn accounts(&self) -> &dyn GameAccounts {
        self.accounts.as_ref()
    }

    /// In-game delivery dispatch.
    pub fn delivery(&self) -> &DeliveryDispatcher {
        &self.delivery
    }

    /// Delivery tickets; `None` when no chat platform is configured.
    pub fn tickets(&self) -> Option<&TicketDesk> {
        self.tickets.as_ref()
    }

    /// Ticket desk, or a [`ClaimError::Config`] naming the missing integration.
    pub fn require_tickets(&self) -> Result<&TicketDesk> {
        self.tickets
            .as_ref()
            .ok_or_else(|| ClaimError::Config("chat integration is not configured".into()))
    }

    /// Slash-command handlers; `None` when no chat platform is configured.
    pub fn commands(&self) -> Option<ChatCommands<'_>> {
        self.tickets
            .as_ref()
            .map(|t| ChatCommands::new(&self.claims, t).with_cleanup_delay(self.cleanup_delay))
    }

    /// The shared claim store.
    pub fn cache(&self) -> &Arc<ClaimCache> {
        &self.cache
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for ClaimDesk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClaimDesk(claims={}, chat={})",
            self.cache.len(),
            if self.tickets.is_some() { "enabled" } else { "disabled" }
        )
    }
}
