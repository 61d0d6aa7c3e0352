use std::time::Duration;

use crate::error::{ClaimError, Result};

pub const SELLAUTH_API_BASE: &str = "https://api.sellauth.com/v1";
pub const ROBLOX_USERS_API: &str = "https://users.roblox.com/v1";
pub const ROBLOX_THUMBNAILS_API: &str = "https://thumbnails.roblox.com/v1";
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

pub const CLAIM_CODE_PREFIX: &str = "RYFT";
pub const INVALIDATED_PREFIX: &str = "INVALIDATED-";
pub const TICKET_CHANNEL_PREFIX: &str = "web-order-";

/// Grow a Garden.
pub const DEFAULT_GAME_ID: &str = "2041312716";
pub const DEFAULT_WEBHOOK_SECRET: &str = "sellauth-garden-delivery";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Credentials for the storefront order API.
#[derive(Debug, Clone)]
pub struct OrderApiConfig {
    pub api_key: String,
    pub shop_id: String,
    pub base_url: String,
}

impl OrderApiConfig {
    /// Credentials against the default API root.
    pub fn new(api_key: impl Into<String>, shop_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            shop_id: shop_id.into(),
            base_url: SELLAUTH_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API root (staging, local fakes).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Both the key and the shop id must be non-empty.
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.shop_id.trim().is_empty()
    }
}

/// Settings for the in-game delivery webhook.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub game_id: String,
    /// When unset, deliveries are simulated.
    pub webhook_url: Option<String>,
    pub webhook_secret: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            game_id: DEFAULT_GAME_ID.to_string(),
            webhook_url: None,
            webhook_secret: DEFAULT_WEBHOOK_SECRET.to_string(),
        }
    }
}

/// Chat-platform bot settings used for delivery tickets.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub bot_token: String,
    pub guild_id: String,
    /// Parent category every delivery channel is created under.
    pub category_id: String,
    /// Roles allowed into every delivery channel besides the invited buyer.
    pub admin_role_ids: Vec<String>,
    pub api_base: String,
}

impl ChatConfig {
    /// Bot settings against the public Discord API, with no admin roles.
    pub fn new(
        bot_token: impl Into<String>,
        guild_id: impl Into<String>,
        category_id: impl Into<String>,
    ) -> Self {
        Self {
            bot_token: bot_token.into(),
            guild_id: guild_id.into(),
            category_id: category_id.into(),
            admin_role_ids: Vec::new(),
            api_base: DISCORD_API_BASE.to_string(),
        }
    }
}

/// Process-wide settings, normally read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub orders: OrderApiConfig,
    pub delivery: DeliveryConfig,
    pub chat: Option<ChatConfig>,
    pub timeout: Duration,
    pub bind_addr: String,
}

impl Settings {
    /// Read settings from the environment.
    ///
    /// Missing storefront credentials are a hard error so the service fails at
    /// startup instead of on the first verification attempt. Chat settings are
    /// optional as a group: either all three of token, guild and category are
    /// set, or the chat integration is disabled.
    pub fn from_env() -> Result<Self> {
        let api_key = require("SELLAUTH_API_KEY")?;
        let shop_id = require("SELLAUTH_SHOP_ID")?;
        let mut orders = OrderApiConfig::new(api_key, shop_id);
        if let Some(base) = optional("SELLAUTH_API_BASE") {
            orders = orders.with_base_url(base);
        }

        let timeout = match optional("HTTP_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(v.parse().map_err(|_| {
                ClaimError::Config(format!(
                    "Invalid HTTP_TIMEOUT_SECS value '{}': expected a number",
                    v
                ))
            })?),
            None => DEFAULT_TIMEOUT,
        };

        let delivery = DeliveryConfig {
            game_id: optional("ROBLOX_GAME_ID").unwrap_or_else(|| DEFAULT_GAME_ID.to_string()),
            webhook_url: optional("ROBLOX_DELIVERY_WEBHOOK_URL"),
            webhook_secret: optional("WEBHOOK_SECRET")
                .unwrap_or_else(|| DEFAULT_WEBHOOK_SECRET.to_string()),
        };

        let chat = match (
            optional("DISCORD_BOT_TOKEN"),
            optional("DISCORD_GUILD_ID"),
            optional("DISCORD_DELIVERY_CATEGORY_ID"),
        ) {
            (Some(token), Some(guild), Some(category)) => {
                let mut chat = ChatConfig::new(token, guild, category);
                chat.admin_role_ids = optional("DISCORD_ADMIN_ROLE_IDS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default();
                Some(chat)
            }
            (None, None, None) => None,
            _ => {
                return Err(ClaimError::Config(
                    "DISCORD_BOT_TOKEN, DISCORD_GUILD_ID and DISCORD_DELIVERY_CATEGORY_ID \
                     must be set together"
                        .into(),
                ))
            }
        };

        Ok(Self {
            orders,
            delivery,
            chat,
            timeout,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

fn require(name: &str) -> Result<String> {
    optional(name).ok_or_else(|| ClaimError::Config(format!("{} not set", name)))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
