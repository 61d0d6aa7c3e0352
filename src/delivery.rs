//! In-game delivery dispatch.
//!
//! Delivery soft-succeeds: when the webhook is missing or failing the buyer
//! still gets a join URL and staff pick the order up by hand.

use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{DeliveryConfig, DEFAULT_TIMEOUT};
use crate::error::{ClaimError, Result};
use crate::models::ClaimWithItems;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub message: String,
    pub join_url: String,
    pub trade_id: Option<String>,
    /// True when the webhook was unreachable and the join URL is synthesized.
    pub degraded: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryPayload<'a> {
    invoice_id: &'a str,
    recipient: &'a str,
    email: &'a str,
    items: Vec<DeliveryLine<'a>>,
    timestamp: String,
    game_id: &'a str,
}

#[derive(Serialize)]
struct DeliveryLine<'a> {
    name: &'a str,
    category: &'a str,
    quantity: u32,
    price: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookReply {
    #[serde(default)]
    game_join_url: Option<String>,
    #[serde(default)]
    trade_id: Option<serde_json::Value>,
}

/// Sends delivery requests to the external trading service.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    http: Client,
    config: DeliveryConfig,
}

impl DeliveryDispatcher {
    /// Dispatcher with the default request timeout.
    pub fn new(config: DeliveryConfig) -> Result<Self> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    /// Dispatcher whose webhook calls give up after `timeout`.
    pub fn with_timeout(config: DeliveryConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            config,
        })
    }

    /// Join URL used whenever the delivery service does not hand one back.
    pub fn fallback_join_url(&self, order_id: &str) -> String {
        let base = format!("https://www.roblox.com/games/{}/grow-a-garden", self.config.game_id);
        match reqwest::Url::parse(&base) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("ref", &format!("delivery-{}", order_id));
                url.to_string()
            }
            Err(_) => base,
        }
    }

    /// Queue delivery of a claim's items to `recipient`. Never fails.
    pub async fn deliver(&self, claim: &ClaimWithItems, recipient: &str) -> DeliveryReceipt {
        let order_id = claim.claim.order_id.as_str();
        tracing::info!(order_id, recipient, items = claim.items.len(), "dispatching delivery");

        let Some(webhook_url) = self.config.webhook_url.as_deref() else {
            tracing::info!(order_id, "no delivery webhook configured; simulating delivery");
            return DeliveryReceipt {
                message: "Items are being prepared for delivery. Join the game and wait for bot contact."
                    .into(),
                join_url: self.fallback_join_url(order_id),
                trade_id: None,
                degraded: false,
            };
        };

        match self.post_webhook(webhook_url, claim, recipient).await {
            Ok(reply) => DeliveryReceipt {
                message: "Items queued for delivery. Bot will contact you in-game shortly.".into(),
                join_url: reply
                    .game_join_url
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| self.fallback_join_url(order_id)),
                trade_id: reply.trade_id.and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
                degraded: false,
            },
            Err(e) => {
                tracing::warn!(order_id, error = %e, "delivery webhook failed; degrading");
                DeliveryReceipt {
                    message: "Delivery system is experiencing delays. Join the game and the bot will contact you soon."
                        .into(),
                    join_url: self.fallback_join_url(order_id),
                    trade_id: None,
                    degraded: true,
                }
            }
        }
    }

    async fn post_webhook(
        &self,
        url: &str,
        claim: &ClaimWithItems,
        recipient: &str,
    ) -> Result<WebhookReply> {
        let payload = DeliveryPayload {
            invoice_id: &claim.claim.order_id,
            recipient,
            email: &claim.claim.email,
            items: claim
                .items
                .iter()
                .map(|item| DeliveryLine {
                    name: &item.item_name,
                    category: &item.item_category,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            timestamp: Utc::now().to_rfc3339(),
            game_id: &self.config.game_id,
        };

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.config.webhook_secret)
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClaimError::Upstream(format!(
                "delivery webhook returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}
