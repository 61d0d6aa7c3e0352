//! Private delivery channels ("tickets") for verified orders.

use std::sync::Arc;

use super::{
    ChannelRef, ChannelSpec, ChatPlatform, Embed, OverwriteTarget, Permission,
    PermissionOverwrite, COLOR_SUCCESS, PARTICIPANT, STAFF,
};
use crate::claim_code;
use crate::config::{ChatConfig, TICKET_CHANNEL_PREFIX};
use crate::error::{ClaimError, Result};
use crate::models::{Claim, ClaimWithItems};

/// Discord caps channel names at 100 characters.
const MAX_CHANNEL_NAME_LEN: usize = 100;
use crate::reconciler::ClaimReconciler;

/// Where tickets are created and who may see them.
#[derive(Debug, Clone, Default)]
pub struct TicketSettings {
    pub category_id: String,
    pub admin_role_ids: Vec<String>,
}

impl From<&ChatConfig> for TicketSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            category_id: config.category_id.clone(),
            admin_role_ids: config.admin_role_ids.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketOutcome {
    pub channel_id: String,
    pub channel_name: String,
    /// False when an existing channel was reused.
    pub created: bool,
    /// Whether an invited user was granted access.
    pub user_added: bool,
}

/// Channel name for an order's ticket.
pub fn channel_name(order_id: &str) -> String {
    format!("{}{}", TICKET_CHANNEL_PREFIX, claim_code::channel_slug(order_id))
}

/// Collision-free channel name built from the whole order id. Used when the
/// short name is held by another order's ticket.
pub fn fallback_channel_name(order_id: &str) -> String {
    let mut name = format!(
        "{}{}",
        TICKET_CHANNEL_PREFIX,
        claim_code::sanitize(order_id).to_ascii_lowercase()
    );
    name.truncate(MAX_CHANNEL_NAME_LEN);
    name
}

/// True for channels created by [`TicketDesk`].
pub fn is_ticket_channel(name: &str) -> bool {
    name.starts_with(TICKET_CHANNEL_PREFIX)
}

fn ticket_topic(claim: &Claim) -> String {
    format!("Delivery for order {} ({})", claim.order_id, claim.claim_code)
}

/// Whether `channel` is the ticket of `claim`'s order, judged by the channel
/// recorded on the claim or the order id in the channel topic.
fn belongs_to(channel: &ChannelRef, claim: &Claim) -> bool {
    if claim.chat_channel_id.as_deref() == Some(channel.id.as_str()) {
        return true;
    }
    let marker = format!("Delivery for order {} (", claim.order_id);
    channel
        .topic
        .as_deref()
        .is_some_and(|topic| topic.starts_with(&marker))
}

#[derive(Clone)]
pub struct TicketDesk {
    chat: Arc<dyn ChatPlatform>,
    claims: ClaimReconciler,
    settings: TicketSettings,
}

impl TicketDesk {
    /// Ticket desk creating channels on `chat` and recording them on `claims`.
    pub fn new(chat: Arc<dyn ChatPlatform>, claims: ClaimReconciler, settings: TicketSettings) -> Self {
        Self {
            chat,
            claims,
            settings,
        }
    }

    /// The chat platform tickets are opened on.
    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.chat
    }

    /// Open (or reopen) the delivery channel for a claim.
    ///
    /// An existing channel is only reused when it belongs to this order; a
    /// name held by another order moves the ticket to
    /// [`fallback_channel_name`]. Failing to invite the user or to post the
    /// summary is logged and does not undo the ticket.
    pub async fn open_delivery_ticket(
        &self,
        claim: &ClaimWithItems,
        invited_user: Option<&str>,
    ) -> Result<TicketOutcome> {
        let order_id = claim.claim.order_id.as_str();
        let invited_user = invited_user.map(str::trim).filter(|u| !u.is_empty());

        let mut free_name = None;
        for name in [channel_name(order_id), fallback_channel_name(order_id)] {
            match self.chat.find_channel(&name).await? {
                Some(existing) if belongs_to(&existing, &claim.claim) => {
                    return self.reopen(order_id, existing, invited_user).await;
                }
                Some(other) => {
                    tracing::warn!(order_id, channel = %other.name, "ticket name held by another order");
                }
                None if free_name.is_none() => free_name = Some(name),
                None => {}
            }
        }
        let name = free_name.ok_or_else(|| {
            ClaimError::Upstream(format!("No free ticket channel name for order {}", order_id))
        })?;

        let channel = self
            .chat
            .create_private_channel(&self.channel_spec(&name, claim, invited_user))
            .await?;
        tracing::info!(order_id, channel = %channel.name, "created delivery channel");
        // Channel first, then claimed.
        self.claims.record_channel(order_id, &channel.id)?;

        if let Err(e) = self
            .chat
            .post_embed(&channel.id, &summary_embed(claim, &channel))
            .await
        {
            tracing::warn!(order_id, channel_id = %channel.id, error = %e, "could not post delivery summary");
        }
        self.claims.record_claimed(order_id)?;

        Ok(TicketOutcome {
            channel_id: channel.id,
            channel_name: channel.name,
            created: true,
            user_added: invited_user.is_some(),
        })
    }

    async fn reopen(
        &self,
        order_id: &str,
        existing: ChannelRef,
        invited_user: Option<&str>,
    ) -> Result<TicketOutcome> {
        tracing::info!(order_id, channel = %existing.name, "reusing delivery channel");
        let user_added = match invited_user {
            Some(user) => match self.chat.grant_member(&existing.id, user).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(order_id, channel_id = %existing.id, error = %e, "could not add user to delivery channel");
                    false
                }
            },
            None => false,
        };

        self.claims.record_channel(order_id, &existing.id)?;
        self.claims.record_claimed(order_id)?;
        Ok(TicketOutcome {
            channel_id: existing.id,
            channel_name: existing.name,
            created: false,
            user_added,
        })
    }

    fn channel_spec(&self, name: &str, claim: &ClaimWithItems, invited_user: Option<&str>) -> ChannelSpec {
        let mut overwrites = vec![PermissionOverwrite::deny(
            OverwriteTarget::Everyone,
            &[Permission::ViewChannel],
        )];
        if let Some(user) = invited_user {
            overwrites.push(PermissionOverwrite::allow(
                OverwriteTarget::Member(user.to_string()),
                PARTICIPANT,
            ));
        }
        overwrites.extend(
            self.settings
                .admin_role_ids
                .iter()
                .map(|role| PermissionOverwrite::allow(OverwriteTarget::Role(role.clone()), STAFF)),
        );

        ChannelSpec {
            name: name.to_string(),
            topic: ticket_topic(&claim.claim),
            parent_id: self.settings.category_id.clone(),
            overwrites,
            reason: format!("Delivery ticket for order {}", claim.claim.order_id),
        }
    }
}

fn summary_embed(claim: &ClaimWithItems, channel: &ChannelRef) -> Embed {
    let items = if claim.items.is_empty() {
        "No items".to_string()
    } else {
        claim
            .items
            .iter()
            .map(|i| format!("{}x {} (${:.2})", i.quantity, i.item_name, i.price))
            .collect::<Vec<_>>()
            .join("\n")
    };

    Embed::new("Delivery Order", COLOR_SUCCESS)
        .description(format!(
            "Order **{}** is ready for delivery. Staff will be with you shortly.",
            claim.claim.order_id
        ))
        .field("Claim Code", claim.claim.display_code(), true)
        .field(
            "Game Username",
            claim.claim.game_username.clone().unwrap_or_else(|| "Not set".into()),
            true,
        )
        .field("Total", format!("${:.2}", claim.total_price()), true)
        .field("Items", items, false)
        .footer(format!("Channel {}", channel.name))
}
