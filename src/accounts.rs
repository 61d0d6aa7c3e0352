//! Game-account lookup (username -> user id -> avatar).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::{DEFAULT_TIMEOUT, ROBLOX_THUMBNAILS_API, ROBLOX_USERS_API};
use crate::error::Result;

/// A resolved game account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameAccount {
    pub user_id: u64,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub has_verified_badge: bool,
}

#[async_trait]
pub trait GameAccounts: Send + Sync {
    /// `Ok(None)` when the account does not exist or cannot be fully resolved.
    async fn lookup(&self, username: &str) -> Result<Option<GameAccount>>;

    async fn exists(&self, username: &str) -> Result<bool> {
        Ok(self.lookup(username).await?.is_some())
    }
}

#[derive(Deserialize)]
struct UsersResponse {
    #[serde(default)]
    data: Vec<UserRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    id: u64,
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    has_verified_badge: bool,
}

#[derive(Deserialize)]
struct ThumbnailResponse {
    #[serde(default)]
    data: Vec<Thumbnail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Thumbnail {
    #[serde(default)]
    image_url: Option<String>,
}

/// Roblox users + thumbnails API client.
#[derive(Clone)]
pub struct RobloxAccounts {
    http: Client,
    users_api: String,
    thumbnails_api: String,
}

impl RobloxAccounts {
    /// Client with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Client whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            users_api: ROBLOX_USERS_API.to_string(),
            thumbnails_api: ROBLOX_THUMBNAILS_API.to_string(),
        })
    }

    /// Override both API roots, e.g. to point at a local fake.
    pub fn with_endpoints(mut self, users_api: &str, thumbnails_api: &str) -> Self {
        self.users_api = users_api.trim_end_matches('/').to_string();
        self.thumbnails_api = thumbnails_api.trim_end_matches('/').to_string();
        self
    }

    async fn user_by_name(&self, username: &str) -> Result<Option<UserRecord>> {
        let resp = self
            .http
            .post(format!("{}/usernames/users", self.users_api))
            .json(&json!({ "usernames": [username] }))
            .send()
            .await?;
        if !resp.status().is_success() {
            tracing::debug!(username, status = %resp.status(), "user lookup rejected");
            return Ok(None);
        }
        let body: UsersResponse = resp.json().await?;
        Ok(body.data.into_iter().next())
    }

    /// `Ok(None)` when the thumbnail service rejects the request; the inner
    /// option is the image URL, which the service may still be rendering.
    async fn avatar(&self, user_id: u64) -> Result<Option<Option<String>>> {
        let resp = self
            .http
            .get(format!("{}/users/avatar", self.thumbnails_api))
            .query(&[
                ("userIds", user_id.to_string()),
                ("size", "150x150".to_string()),
                ("format", "Png".to_string()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let body: ThumbnailResponse = resp.json().await?;
        Ok(Some(body.data.into_iter().next().and_then(|t| t.image_url)))
    }
}

#[async_trait]
impl GameAccounts for RobloxAccounts {
    async fn lookup(&self, username: &str) -> Result<Option<GameAccount>> {
        let username = username.trim();
        if username.is_empty() {
            return Ok(None);
        }

        let Some(user) = self.user_by_name(username).await? else {
            return Ok(None);
        };
        // Both calls must succeed before the account counts as existing.
        let Some(avatar_url) = self.avatar(user.id).await? else {
            tracing::debug!(username, "avatar service rejected user");
            return Ok(None);
        };

        Ok(Some(GameAccount {
            user_id: user.id,
            display_name: user.display_name.unwrap_or_else(|| user.name.clone()),
            username: user.name,
            avatar_url,
            has_verified_badge: user.has_verified_badge,
        }))
    }
}
