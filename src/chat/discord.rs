//! Discord REST implementation of [`ChatPlatform`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ChannelRef, ChannelSpec, ChatPlatform, Embed, OverwriteTarget, Permission, PARTICIPANT};
use crate::config::{ChatConfig, DEFAULT_TIMEOUT};
use crate::error::{ClaimError, Result};

const GUILD_TEXT: u8 = 0;
const OVERWRITE_ROLE: u8 = 0;
const OVERWRITE_MEMBER: u8 = 1;

fn bit(permission: Permission) -> u64 {
    match permission {
        Permission::ViewChannel => 1 << 10,
        Permission::SendMessages => 1 << 11,
        Permission::ManageMessages => 1 << 13,
        Permission::EmbedLinks => 1 << 14,
        Permission::AttachFiles => 1 << 15,
        Permission::ReadMessageHistory => 1 << 16,
    }
}

/// Discord encodes permission sets as decimal strings of a bit field.
fn bits(permissions: &[Permission]) -> String {
    permissions
        .iter()
        .fold(0u64, |acc, p| acc | bit(*p))
        .to_string()
}

#[derive(Deserialize)]
struct GuildChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

/// Bot-token client for one guild.
#[derive(Clone)]
pub struct DiscordRest {
    http: Client,
    token: String,
    guild_id: String,
    api_base: String,
}

impl DiscordRest {
    /// Client with the default request timeout.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    /// Client whose requests give up after `timeout`.
    pub fn with_timeout(config: &ChatConfig, timeout: Duration) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(ClaimError::Config("Discord bot token not set".into()));
        }
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            token: config.bot_token.clone(),
            guild_id: config.guild_id.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let resp = builder.send().await?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(ClaimError::Upstream(format!(
                "Discord {} failed with {}: {}",
                what, status, body
            )))
        }
    }

    fn overwrite_json(&self, target: &OverwriteTarget, allow: &[Permission], deny: &[Permission]) -> Value {
        let (id, kind) = match target {
            // The @everyone role shares the guild's id.
            OverwriteTarget::Everyone => (self.guild_id.as_str(), OVERWRITE_ROLE),
            OverwriteTarget::Role(id) => (id.as_str(), OVERWRITE_ROLE),
            OverwriteTarget::Member(id) => (id.as_str(), OVERWRITE_MEMBER),
        };
        json!({ "id": id, "type": kind, "allow": bits(allow), "deny": bits(deny) })
    }
}

#[async_trait]
impl ChatPlatform for DiscordRest {
    async fn find_channel(&self, name: &str) -> Result<Option<ChannelRef>> {
        let path = format!("/guilds/{}/channels", self.guild_id);
        let resp = self.send(self.request(Method::GET, &path), "channel listing").await?;
        let channels: Vec<GuildChannel> = resp.json().await?;
        Ok(channels
            .into_iter()
            .filter(|c| c.kind == GUILD_TEXT)
            .find_map(|c| match c.name {
                Some(n) if n == name => Some(ChannelRef {
                    id: c.id,
                    name: n,
                    topic: c.topic,
                }),
                _ => None,
            }))
    }

    async fn create_private_channel(&self, spec: &ChannelSpec) -> Result<ChannelRef> {
        let overwrites: Vec<Value> = spec
            .overwrites
            .iter()
            .map(|o| self.overwrite_json(&o.target, &o.allow, &o.deny))
            .collect();
        let body = json!({
            "name": spec.name,
            "type": GUILD_TEXT,
            "parent_id": spec.parent_id,
            "topic": spec.topic,
            "permission_overwrites": overwrites,
        });

        let path = format!("/guilds/{}/channels", self.guild_id);
        let builder = self
            .request(Method::POST, &path)
            .header("X-Audit-Log-Reason", spec.reason.as_str())
            .json(&body);
        let created: GuildChannel = self.send(builder, "channel creation").await?.json().await?;
        Ok(ChannelRef {
            id: created.id,
            name: created.name.unwrap_or_else(|| spec.name.clone()),
            topic: created.topic.or_else(|| Some(spec.topic.clone())),
        })
    }

    async fn grant_member(&self, channel_id: &str, user_id: &str) -> Result<()> {
        let path = format!("/channels/{}/permissions/{}", channel_id, user_id);
        let body = json!({ "type": OVERWRITE_MEMBER, "allow": bits(PARTICIPANT), "deny": "0" });
        self.send(self.request(Method::PUT, &path).json(&body), "permission update")
            .await?;
        Ok(())
    }

    async fn post_embed(&self, channel_id: &str, embed: &Embed) -> Result<()> {
        let fields: Vec<Value> = embed
            .fields
            .iter()
            .map(|f| json!({ "name": f.name, "value": f.value, "inline": f.inline }))
            .collect();
        let mut rendered = json!({
            "title": embed.title,
            "color": embed.color,
            "fields": fields,
        });
        if let Some(description) = &embed.description {
            rendered["description"] = json!(description);
        }
        if let Some(footer) = &embed.footer {
            rendered["footer"] = json!({ "text": footer });
        }
        if let Some(ts) = embed.timestamp {
            rendered["timestamp"] = json!(ts.to_rfc3339());
        }

        let path = format!("/channels/{}/messages", channel_id);
        self.send(
            self.request(Method::POST, &path).json(&json!({ "embeds": [rendered] })),
            "message post",
        )
        .await?;
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str, reason: &str) -> Result<()> {
        let path = format!("/channels/{}", channel_id);
        self.send(
            self.request(Method::DELETE, &path)
                .header("X-Audit-Log-Reason", reason),
            "channel deletion",
        )
        .await?;
        Ok(())
    }
}
