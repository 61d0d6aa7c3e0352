//! Chat-platform integration: private delivery channels and staff commands.
//!
//! The platform itself sits behind [`ChatPlatform`]; [`DiscordRest`] is the
//! production implementation. Tickets and commands only speak the trait.

pub mod commands;
pub mod discord;
pub mod tickets;

pub use commands::{ChatCommands, CommandOutcome, CommandReply};
pub use discord::DiscordRest;
pub use tickets::{TicketDesk, TicketOutcome, TicketSettings};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const COLOR_SUCCESS: u32 = 0x00ff00;
pub const COLOR_DANGER: u32 = 0xff0000;

/// A channel as known to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ViewChannel,
    SendMessages,
    ReadMessageHistory,
    AttachFiles,
    EmbedLinks,
    ManageMessages,
}

/// Everything a participant needs inside a delivery channel.
pub const PARTICIPANT: &[Permission] = &[
    Permission::ViewChannel,
    Permission::SendMessages,
    Permission::ReadMessageHistory,
    Permission::AttachFiles,
    Permission::EmbedLinks,
];

/// Participant rights plus moderation.
pub const STAFF: &[Permission] = &[
    Permission::ViewChannel,
    Permission::SendMessages,
    Permission::ReadMessageHistory,
    Permission::AttachFiles,
    Permission::EmbedLinks,
    Permission::ManageMessages,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverwriteTarget {
    /// The default role every member has.
    Everyone,
    Role(String),
    Member(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub target: OverwriteTarget,
    pub allow: Vec<Permission>,
    pub deny: Vec<Permission>,
}

impl PermissionOverwrite {
    /// Grant `permissions` to `target`.
    pub fn allow(target: OverwriteTarget, permissions: &[Permission]) -> Self {
        Self {
            target,
            allow: permissions.to_vec(),
            deny: Vec::new(),
        }
    }

    /// Deny `permissions` to `target`.
    pub fn deny(target: OverwriteTarget, permissions: &[Permission]) -> Self {
        Self {
            target,
            allow: Vec::new(),
            deny: permissions.to_vec(),
        }
    }
}

/// Request for a new private text channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub topic: String,
    pub parent_id: String,
    pub overwrites: Vec<PermissionOverwrite>,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Embed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Structured rich message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    /// Embed with a title and side color and nothing else.
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            color,
            fields: Vec::new(),
            footer: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Value of the first field with this name.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

// ---------------------------------------------------------------------------
// ChatPlatform
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Find a text channel by exact name.
    async fn find_channel(&self, name: &str) -> Result<Option<ChannelRef>>;

    async fn create_private_channel(&self, spec: &ChannelSpec) -> Result<ChannelRef>;

    /// Give a member participant rights in a channel.
    async fn grant_member(&self, channel_id: &str, user_id: &str) -> Result<()>;

    async fn post_embed(&self, channel_id: &str, embed: &Embed) -> Result<()>;

    async fn delete_channel(&self, channel_id: &str, reason: &str) -> Result<()>;
}
