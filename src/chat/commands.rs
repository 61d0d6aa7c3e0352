//! Staff and buyer slash commands (`/claim`, `/claimed`).
//!
//! Commands return a [`CommandOutcome`] instead of talking to the platform's
//! interaction API directly; the bot glue renders the reply.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::tickets::{is_ticket_channel, TicketDesk};
use super::{ChannelRef, ChatPlatform, Embed, COLOR_DANGER, COLOR_SUCCESS};
use crate::claim_code;
use crate::config::{DEFAULT_CLEANUP_DELAY, INVALIDATED_PREFIX};
use crate::error::ClaimError;
use crate::models::ClaimWithItems;
use crate::reconciler::ClaimReconciler;

const MIN_ORDER_ID_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    /// Plain text, visible only to the invoker when `ephemeral`.
    Notice { content: String, ephemeral: bool },
    Embed { embed: Embed, ephemeral: bool },
}

impl CommandReply {
    fn notice(content: impl Into<String>) -> Self {
        Self::Notice {
            content: content.into(),
            ephemeral: true,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        match self {
            Self::Notice { ephemeral, .. } | Self::Embed { ephemeral, .. } => *ephemeral,
        }
    }

    pub fn embed(&self) -> Option<&Embed> {
        match self {
            Self::Embed { embed, .. } => Some(embed),
            Self::Notice { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Notice { content, .. } => Some(content),
            Self::Embed { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct CommandOutcome {
    pub reply: CommandReply,
    /// Second message sent after the reply, if any.
    pub follow_up: Option<String>,
    /// Scheduled channel deletion.
    pub cleanup: Option<JoinHandle<()>>,
}

impl From<CommandReply> for CommandOutcome {
    fn from(reply: CommandReply) -> Self {
        Self {
            reply,
            follow_up: None,
            cleanup: None,
        }
    }
}

/// Command handlers bound to a claim store and ticket desk.
pub struct ChatCommands<'a> {
    claims: &'a ClaimReconciler,
    tickets: &'a TicketDesk,
    cleanup_delay: Duration,
}

impl<'a> ChatCommands<'a> {
    /// Handlers using the default cleanup delay.
    pub fn new(claims: &'a ClaimReconciler, tickets: &'a TicketDesk) -> Self {
        Self {
            claims,
            tickets,
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
        }
    }

    /// How long `/claimed` waits before deleting a ticket channel.
    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    /// `/claim <order_id>`: show purchase details and open a delivery ticket.
    pub async fn claim(&self, input: &str, invoking_user: &str) -> CommandOutcome {
        let input = input.trim();
        if claim_code::is_claim_code(input) || input.chars().count() < MIN_ORDER_ID_LEN {
            return CommandReply::notice(
                "Please provide your full order id, not a claim code. \
                 You can find it in your purchase confirmation email.",
            )
            .into();
        }

        let claim = match self.claims.lookup_by_order_id(input).await {
            Ok(claim) => claim,
            Err(ClaimError::NotFound(_)) => {
                return CommandReply::notice(format!(
                    "No order found with id `{}`. Check the id and try again.",
                    input
                ))
                .into()
            }
            Err(e) => {
                tracing::warn!(order_id = input, error = %e, "claim command lookup failed");
                return CommandReply::notice(
                    "There was an error retrieving your order. Please try again later.",
                )
                .into();
            }
        };

        if claim.claim.is_invalidated() {
            return CommandReply::notice(
                "This order has already been claimed and is no longer eligible.",
            )
            .into();
        }

        let ticket = match self.tickets.open_delivery_ticket(&claim, Some(invoking_user)).await {
            Ok(outcome) => format!("Ticket ready: <#{}>", outcome.channel_id),
            Err(e) => {
                tracing::warn!(order_id = input, error = %e, "could not open delivery ticket");
                "Could not create a ticket. Please contact staff.".to_string()
            }
        };

        let embed = purchase_embed(&claim).field("Ticket", ticket, false);
        CommandReply::Embed {
            embed,
            ephemeral: true,
        }
        .into()
    }

    /// `/claimed <order_id>`: staff revocation.
    ///
    /// Inside a ticket channel the channel is deleted after the cleanup delay.
    pub async fn claimed(
        &self,
        input: &str,
        current_channel: Option<&ChannelRef>,
        staff: &str,
    ) -> CommandOutcome {
        let input = input.trim();
        let claim = match self.claims.lookup_by_order_id(input).await {
            Ok(claim) => claim,
            Err(ClaimError::NotFound(_)) => {
                return CommandReply::notice(format!("No order found with id `{}`.", input)).into()
            }
            Err(e) => {
                tracing::warn!(order_id = input, error = %e, "claimed command lookup failed");
                return CommandReply::notice("There was an error processing this order.").into();
            }
        };

        if claim.claim.is_invalidated() {
            return CommandReply::notice(format!(
                "Order `{}` is already marked as claimed.",
                input
            ))
            .into();
        }

        let invalidation = match self.claims.invalidate(input) {
            Ok(invalidation) => invalidation,
            Err(e) => {
                return CommandReply::notice(format!("Could not invalidate order: {}", e)).into()
            }
        };
        tracing::info!(order_id = %invalidation.order_id, staff, "order marked as claimed");

        let embed = Embed::new("Order Marked as Claimed", COLOR_DANGER)
            .description(format!(
                "Order **{}** has been invalidated and can no longer be claimed.",
                invalidation.order_id
            ))
            .field(
                "Claim Code",
                format!("{}{}", INVALIDATED_PREFIX, claim.claim.claim_code),
                true,
            )
            .field("Email", claim.claim.email.clone(), true)
            .field("Marked By", staff.to_string(), true);

        let mut outcome = CommandOutcome::from(CommandReply::Embed {
            embed,
            ephemeral: false,
        });

        if let Some(channel) = current_channel.filter(|c| is_ticket_channel(&c.name)) {
            outcome.follow_up = Some(format!(
                "Deleting this ticket in {} seconds...",
                self.cleanup_delay.as_secs()
            ));
            outcome.cleanup = Some(schedule_deletion(
                Arc::clone(self.tickets.platform()),
                channel.id.clone(),
                self.cleanup_delay,
                format!("Order {} claimed", invalidation.order_id),
            ));
        }
        outcome
    }
}

fn schedule_deletion(
    chat: Arc<dyn ChatPlatform>,
    channel_id: String,
    delay: Duration,
    reason: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = chat.delete_channel(&channel_id, &reason).await {
            tracing::warn!(channel_id, error = %e, "failed to delete ticket channel");
        }
    })
}

fn purchase_embed(claim: &ClaimWithItems) -> Embed {
    let purchased = claim
        .claim
        .created_at
        .format("%B %-d, %Y %H:%M UTC")
        .to_string();
    let status = if claim.claim.verified {
        "Verified"
    } else {
        "Not verified"
    };
    let items = if claim.items.is_empty() {
        "No items found".to_string()
    } else {
        claim
            .items
            .iter()
            .map(|i| format!("- {} ({}) x{} - ${:.2}", i.item_name, i.item_category, i.quantity, i.line_total()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    Embed::new("Purchase Details", COLOR_SUCCESS)
        .description(format!("Order **{}**", claim.claim.order_id))
        .field("Total Price", format!("${:.2}", claim.total_price()), true)
        .field("Purchase Date", purchased, true)
        .field("Email", claim.claim.email.clone(), true)
        .field(
            "Username",
            claim.claim.game_username.clone().unwrap_or_else(|| "Not set".into()),
            true,
        )
        .field("Status", status, true)
        .field("Claim Code", claim.claim.display_code(), true)
        .field("Items", items, false)
}
