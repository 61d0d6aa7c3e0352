//! Shared fixtures for the claim desk integration tests.
//!
//! In-memory fakes for every collaborator trait, order fixtures shaped like
//! storefront invoices, and a helper that serves an axum router on an
//! ephemeral local port.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use ryft_claims::chat::{ChannelRef, ChannelSpec, ChatPlatform, Embed, TicketSettings};
use ryft_claims::models::Order;
use ryft_claims::{ClaimDesk, ClaimError, GameAccount, GameAccounts, OrderSource, Result};

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Build an order with `items` line items priced 4.50 each.
pub fn order(id: &str, email: &str, items: usize) -> Order {
    let lines: Vec<serde_json::Value> = (0..items)
        .map(|i| {
            serde_json::json!({
                "product": {
                    "name": format!("Seed Pack {}", i + 1),
                    "category": { "name": "Seeds" },
                    "images": [{ "url": format!("https://cdn.example.com/{}.png", i) }]
                },
                "variant": { "name": "Default" },
                "price_usd": "4.50",
                "quantity": 2
            })
        })
        .collect();
    serde_json::from_value(serde_json::json!({
        "id": id,
        "email": email,
        "created_at": "2025-06-01 12:30:00",
        "items": lines
    }))
    .unwrap()
}

/// Order feed backed by a map, with a switch to simulate an outage.
#[derive(Default)]
pub struct FakeOrders {
    orders: Mutex<HashMap<String, Order>>,
    failing: AtomicBool,
    fetches: AtomicUsize,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl FakeOrders {
    pub fn with(orders: Vec<Order>) -> Arc<Self> {
        let feed = Self::default();
        for o in orders {
            feed.insert(o);
        }
        Arc::new(feed)
    }

    pub fn insert(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.id.clone(), order);
    }

    pub fn remove(&self, order_id: &str) {
        self.orders.lock().unwrap().remove(order_id);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Park the next fetch until the returned handle is notified.
    pub fn hold_next_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl OrderSource for FakeOrders {
    async fn fetch_order(&self, order_id: &str) -> Result<Option<Order>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.hold.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClaimError::Upstream("order feed down".into()));
        }
        Ok(self.orders.lock().unwrap().get(order_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Game accounts
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeAccounts {
    known: HashMap<String, GameAccount>,
}

impl FakeAccounts {
    pub fn with(usernames: &[&str]) -> Arc<Self> {
        let known = usernames
            .iter()
            .enumerate()
            .map(|(i, name)| {
                (
                    name.to_ascii_lowercase(),
                    GameAccount {
                        user_id: 1000 + i as u64,
                        username: name.to_string(),
                        display_name: name.to_string(),
                        avatar_url: None,
                        has_verified_badge: false,
                    },
                )
            })
            .collect();
        Arc::new(Self { known })
    }
}

#[async_trait]
impl GameAccounts for FakeAccounts {
    async fn lookup(&self, username: &str) -> Result<Option<GameAccount>> {
        Ok(self.known.get(&username.trim().to_ascii_lowercase()).cloned())
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Records every call; channels live in a vector.
#[derive(Default)]
pub struct FakeChat {
    pub channels: Mutex<Vec<ChannelRef>>,
    pub created: Mutex<Vec<ChannelSpec>>,
    pub grants: Mutex<Vec<(String, String)>>,
    pub posts: Mutex<Vec<(String, Embed)>>,
    pub deleted: Mutex<Vec<(String, String)>>,
    pub fail_create: AtomicBool,
    pub fail_grant: AtomicBool,
    pub fail_post: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A channel with no topic, as a person would create it.
    pub fn add_channel(&self, id: &str, name: &str) {
        self.channels.lock().unwrap().push(ChannelRef {
            id: id.to_string(),
            name: name.to_string(),
            topic: None,
        });
    }

    /// A ticket channel left over from an earlier run.
    pub fn add_ticket(&self, id: &str, name: &str, topic: &str) {
        self.channels.lock().unwrap().push(ChannelRef {
            id: id.to_string(),
            name: name.to_string(),
            topic: Some(topic.to_string()),
        });
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn find_channel(&self, name: &str) -> Result<Option<ChannelRef>> {
        Ok(self
            .channels
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn create_private_channel(&self, spec: &ChannelSpec) -> Result<ChannelRef> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ClaimError::Upstream("missing permissions".into()));
        }
        let id = format!("chan-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let channel = ChannelRef {
            id,
            name: spec.name.clone(),
            topic: Some(spec.topic.clone()),
        };
        self.created.lock().unwrap().push(spec.clone());
        self.channels.lock().unwrap().push(channel.clone());
        Ok(channel)
    }

    async fn grant_member(&self, channel_id: &str, user_id: &str) -> Result<()> {
        if self.fail_grant.load(Ordering::SeqCst) {
            return Err(ClaimError::Upstream("unknown member".into()));
        }
        self.grants
            .lock()
            .unwrap()
            .push((channel_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn post_embed(&self, channel_id: &str, embed: &Embed) -> Result<()> {
        if self.fail_post.load(Ordering::SeqCst) {
            return Err(ClaimError::Upstream("missing access".into()));
        }
        self.posts
            .lock()
            .unwrap()
            .push((channel_id.to_string(), embed.clone()));
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str, reason: &str) -> Result<()> {
        self.channels.lock().unwrap().retain(|c| c.id != channel_id);
        self.deleted
            .lock()
            .unwrap()
            .push((channel_id.to_string(), reason.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Desk
// ---------------------------------------------------------------------------

pub fn ticket_settings() -> TicketSettings {
    TicketSettings {
        category_id: "cat-deliveries".into(),
        admin_role_ids: vec!["role-staff".into()],
    }
}

/// Desk over fake orders and accounts, without chat.
pub fn desk(orders: Arc<FakeOrders>) -> ClaimDesk {
    ClaimDesk::builder()
        .order_source(orders)
        .accounts(FakeAccounts::with(&["GardenKid"]))
        .build()
        .unwrap()
}

/// Desk over fake orders, accounts and chat.
pub fn desk_with_chat(orders: Arc<FakeOrders>, chat: Arc<FakeChat>) -> ClaimDesk {
    ClaimDesk::builder()
        .order_source(orders)
        .accounts(FakeAccounts::with(&["GardenKid"]))
        .chat(chat, ticket_settings())
        .cleanup_delay(Duration::from_millis(10))
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
