//! Storefront order lookup.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::config::{OrderApiConfig, DEFAULT_TIMEOUT};
use crate::error::{ClaimError, Result};
use crate::models::Order;

/// Source of authoritative order records.
///
/// `Ok(None)` means the order does not exist. Any other failure (network,
/// credentials, unexpected status) is an `Err`; callers decide whether that
/// degrades to a cached answer.
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn fetch_order(&self, order_id: &str) -> Result<Option<Order>>;
}

/// Order client for the SellAuth invoice API.
#[derive(Clone)]
pub struct SellAuthClient {
    http: Client,
    config: OrderApiConfig,
}

impl SellAuthClient {
    /// Client with the default request timeout.
    pub fn new(config: OrderApiConfig) -> Result<Self> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    /// Client whose requests give up after `timeout`. Incomplete credentials
    /// only surface as [`ClaimError::Config`] on the first fetch.
    pub fn with_timeout(config: OrderApiConfig, timeout: Duration) -> Result<Self> {
        if !config.is_complete() {
            tracing::warn!("storefront credentials missing; order lookups will fail");
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    fn invoice_url(&self, order_id: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.config.base_url).map_err(|e| {
            ClaimError::Config(format!("Invalid order API base '{}': {}", self.config.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| ClaimError::Config("Order API base cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["shops", self.config.shop_id.as_str(), "invoices", order_id]);
        Ok(url)
    }
}

#[async_trait]
impl OrderSource for SellAuthClient {
    async fn fetch_order(&self, order_id: &str) -> Result<Option<Order>> {
        if !self.config.is_complete() {
            return Err(ClaimError::Config(
                "SellAuth API credentials not configured".into(),
            ));
        }

        let url = self.invoice_url(order_id)?;
        tracing::debug!(order_id, %url, "fetching order");

        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(resp.json::<Order>().await?)),
            status => Err(ClaimError::Upstream(format!(
                "order API returned {} for {}",
                status, order_id
            ))),
        }
    }
}
