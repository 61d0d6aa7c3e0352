//! Delivery tickets, slash commands and the Discord REST client.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use common::{desk, desk_with_chat, order, FakeChat, FakeOrders};
use ryft_claims::chat::{
    ChannelRef, ChannelSpec, ChatPlatform, DiscordRest, Embed, OverwriteTarget, PermissionOverwrite,
    Permission, COLOR_SUCCESS, PARTICIPANT,
};
use ryft_claims::config::ChatConfig;
use ryft_claims::ClaimError;

const ORDER: &str = "ord-AB12CD";
const EMAIL: &str = "buyer@example.com";
const CHANNEL: &str = "web-order-ryft-orcd";
const TOPIC: &str = "Delivery for order ord-AB12CD (RYFT-ORCD)";

// ---------------------------------------------------------------------------
// TicketDesk
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ticket_creates_private_channel_and_claims() {
    let chat = FakeChat::new();
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 2)]), chat.clone());
    let claim = desk.claims().verify(ORDER, EMAIL).await.unwrap();

    let outcome = desk
        .tickets()
        .unwrap()
        .open_delivery_ticket(&claim, Some("user-1"))
        .await
        .unwrap();
    assert!(outcome.created);
    assert!(outcome.user_added);
    assert_eq!(outcome.channel_name, CHANNEL);

    let created = chat.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    let spec = &created[0];
    assert_eq!(spec.parent_id, "cat-deliveries");
    assert_eq!(spec.overwrites[0].target, OverwriteTarget::Everyone);
    assert_eq!(spec.overwrites[0].deny, vec![Permission::ViewChannel]);
    assert!(spec.overwrites.contains(&PermissionOverwrite::allow(
        OverwriteTarget::Member("user-1".into()),
        PARTICIPANT
    )));
    assert!(spec
        .overwrites
        .iter()
        .any(|o| o.target == OverwriteTarget::Role("role-staff".into())));

    let posts = chat.posts.lock().unwrap().clone();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, outcome.channel_id);
    assert_eq!(posts[0].1.field_value("Claim Code"), Some("RYFT-ORCD"));

    let after = desk.claims().lookup_by_claim_code("RYFT-ORCD").unwrap();
    assert!(after.claim.claimed);
    assert_eq!(after.claim.chat_channel_id.as_deref(), Some(outcome.channel_id.as_str()));
}

#[tokio::test]
async fn existing_ticket_is_reused() {
    let chat = FakeChat::new();
    chat.add_ticket("chan-existing", CHANNEL, TOPIC);
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 1)]), chat.clone());
    let claim = desk.claims().verify(ORDER, EMAIL).await.unwrap();

    let outcome = desk
        .tickets()
        .unwrap()
        .open_delivery_ticket(&claim, Some("user-2"))
        .await
        .unwrap();
    assert!(!outcome.created);
    assert_eq!(outcome.channel_id, "chan-existing");
    assert!(chat.created.lock().unwrap().is_empty());
    assert_eq!(
        chat.grants.lock().unwrap().as_slice(),
        &[("chan-existing".to_string(), "user-2".to_string())]
    );
}

#[tokio::test]
async fn colliding_orders_get_separate_tickets() {
    let first = "ab-0001-cd";
    let second = "ab-0002-cd";
    let chat = FakeChat::new();
    let orders = FakeOrders::with(vec![order(first, EMAIL, 1), order(second, "other@example.com", 1)]);
    let desk = desk_with_chat(orders, chat.clone());
    let tickets = desk.tickets().unwrap();

    let a = desk.claims().verify(first, EMAIL).await.unwrap();
    let b = desk.claims().verify(second, "other@example.com").await.unwrap();
    let first_ticket = tickets.open_delivery_ticket(&a, Some("buyer-a")).await.unwrap();
    let second_ticket = tickets.open_delivery_ticket(&b, Some("buyer-b")).await.unwrap();

    assert!(first_ticket.created && second_ticket.created);
    assert_eq!(first_ticket.channel_name, "web-order-ryft-abcd");
    assert_eq!(second_ticket.channel_name, "web-order-ab0002cd");
    assert_ne!(first_ticket.channel_id, second_ticket.channel_id);
    // Nobody was added to a channel they do not own.
    assert!(chat.grants.lock().unwrap().is_empty());

    let b_after = desk.claims().lookup_by_order_id(second).await.unwrap();
    assert_eq!(b_after.claim.chat_channel_id.as_deref(), Some(second_ticket.channel_id.as_str()));

    // Reopening finds each order's own channel again.
    let again = tickets.open_delivery_ticket(&b_after, Some("buyer-b")).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.channel_id, second_ticket.channel_id);
}

#[tokio::test]
async fn untagged_channel_with_ticket_name_is_not_reused() {
    let chat = FakeChat::new();
    chat.add_channel("chan-manual", CHANNEL);
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 1)]), chat.clone());
    let claim = desk.claims().verify(ORDER, EMAIL).await.unwrap();

    let outcome = desk
        .tickets()
        .unwrap()
        .open_delivery_ticket(&claim, Some("user-2"))
        .await
        .unwrap();
    assert!(outcome.created);
    assert_ne!(outcome.channel_id, "chan-manual");
    assert_eq!(outcome.channel_name, "web-order-ordab12cd");
    assert!(chat.grants.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_grant_still_reopens_ticket() {
    let chat = FakeChat::new();
    chat.add_ticket("chan-existing", CHANNEL, TOPIC);
    chat.fail_grant.store(true, Ordering::SeqCst);
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 1)]), chat.clone());
    let claim = desk.claims().verify(ORDER, EMAIL).await.unwrap();

    let outcome = desk
        .tickets()
        .unwrap()
        .open_delivery_ticket(&claim, Some("user-2"))
        .await
        .unwrap();
    assert_eq!(outcome.channel_id, "chan-existing");
    assert!(!outcome.user_added);

    let after = desk.claims().lookup_by_order_id(ORDER).await.unwrap();
    assert!(after.claim.claimed);
    assert_eq!(after.claim.chat_channel_id.as_deref(), Some("chan-existing"));
}

#[tokio::test]
async fn failed_summary_keeps_channel_recorded() {
    let chat = FakeChat::new();
    chat.fail_post.store(true, Ordering::SeqCst);
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 1)]), chat.clone());
    let claim = desk.claims().verify(ORDER, EMAIL).await.unwrap();

    let outcome = desk
        .tickets()
        .unwrap()
        .open_delivery_ticket(&claim, None)
        .await
        .unwrap();
    assert!(outcome.created);
    assert!(chat.posts.lock().unwrap().is_empty());

    let after = desk.claims().lookup_by_order_id(ORDER).await.unwrap();
    assert!(after.claim.claimed);
    assert_eq!(after.claim.chat_channel_id.as_deref(), Some(outcome.channel_id.as_str()));

    // A retry reuses the channel instead of creating another.
    let retry = desk
        .tickets()
        .unwrap()
        .open_delivery_ticket(&after, None)
        .await
        .unwrap();
    assert!(!retry.created);
    assert_eq!(retry.channel_id, outcome.channel_id);
    assert_eq!(chat.created.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn desk_without_chat_has_no_tickets() {
    let desk = desk(FakeOrders::with(vec![]));
    assert!(desk.tickets().is_none());
    assert!(desk.commands().is_none());
    assert!(matches!(desk.require_tickets(), Err(ClaimError::Config(_))));
    assert!(desk.to_string().contains("chat=disabled"));
}

// ---------------------------------------------------------------------------
// /claim
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claim_command_rejects_codes_and_short_ids() {
    let chat = FakeChat::new();
    let orders = FakeOrders::with(vec![order(ORDER, EMAIL, 1)]);
    let desk = desk_with_chat(orders.clone(), chat);
    let commands = desk.commands().unwrap();

    for input in ["RYFT-ORCD", "ryft-orcd", "short"] {
        let outcome = commands.claim(input, "user-1").await;
        assert!(outcome.reply.is_ephemeral());
        assert!(outcome.reply.content().unwrap().contains("full order id"));
    }
    assert_eq!(orders.fetch_count(), 0);
}

#[tokio::test]
async fn claim_command_reports_unknown_order() {
    let desk = desk_with_chat(FakeOrders::with(vec![]), FakeChat::new());
    let outcome = desk.commands().unwrap().claim("ord-does-not-exist", "user-1").await;
    assert!(outcome.reply.content().unwrap().contains("No order found"));
}

#[tokio::test]
async fn claim_command_refuses_invalidated_order() {
    let chat = FakeChat::new();
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 1)]), chat.clone());
    desk.claims().invalidate(ORDER).unwrap();

    let outcome = desk.commands().unwrap().claim(ORDER, "user-1").await;
    assert!(outcome.reply.content().unwrap().contains("already been claimed"));
    assert!(chat.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn claim_command_shows_purchase_and_opens_ticket() {
    let chat = FakeChat::new();
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 2)]), chat.clone());

    let outcome = desk.commands().unwrap().claim(ORDER, "user-7").await;
    let embed = outcome.reply.embed().unwrap();
    assert_eq!(embed.title, "Purchase Details");
    assert_eq!(embed.field_value("Total Price"), Some("$18.00"));
    assert_eq!(embed.field_value("Purchase Date"), Some("June 1, 2025 12:30 UTC"));
    assert_eq!(embed.field_value("Email"), Some(EMAIL));
    assert_eq!(embed.field_value("Status"), Some("Not verified"));
    assert_eq!(embed.field_value("Claim Code"), Some("RYFT-ORCD"));
    assert!(embed.field_value("Items").unwrap().contains("Seed Pack 2"));
    assert_eq!(embed.field_value("Ticket"), Some("Ticket ready: <#chan-1>"));

    assert_eq!(chat.created.lock().unwrap().len(), 1);
    let claim = desk.claims().lookup_by_claim_code("RYFT-ORCD").unwrap();
    assert!(claim.claim.claimed);
}

#[tokio::test]
async fn claim_command_after_ticket_still_lists_items() {
    let chat = FakeChat::new();
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 2)]), chat.clone());
    let commands = desk.commands().unwrap();
    commands.claim(ORDER, "user-7").await;

    let again = commands.claim(ORDER, "user-7").await;
    let embed = again.reply.embed().unwrap();
    assert_eq!(embed.field_value("Total Price"), Some("$18.00"));
    assert!(embed.field_value("Items").unwrap().contains("Seed Pack 1"));
    assert_eq!(embed.field_value("Ticket"), Some("Ticket ready: <#chan-1>"));
    assert_eq!(chat.created.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn claim_command_survives_ticket_failure() {
    let chat = FakeChat::new();
    chat.fail_create.store(true, Ordering::SeqCst);
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 1)]), chat);

    let outcome = desk.commands().unwrap().claim(ORDER, "user-7").await;
    let embed = outcome.reply.embed().unwrap();
    assert!(embed.field_value("Ticket").unwrap().contains("Could not create"));

    let claim = desk.claims().lookup_by_claim_code("RYFT-ORCD").unwrap();
    assert!(!claim.claim.claimed);
}

// ---------------------------------------------------------------------------
// /claimed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claimed_command_invalidates_and_cleans_up_ticket() {
    let chat = FakeChat::new();
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 1)]), chat.clone());
    let commands = desk.commands().unwrap();
    commands.claim(ORDER, "user-1").await;

    let channel = chat.channels.lock().unwrap()[0].clone();
    let outcome = commands.claimed(ORDER, Some(&channel), "staff#1").await;

    let embed = outcome.reply.embed().unwrap();
    assert!(!outcome.reply.is_ephemeral());
    assert_eq!(embed.field_value("Claim Code"), Some("INVALIDATED-RYFT-ORCD"));
    assert_eq!(embed.field_value("Marked By"), Some("staff#1"));
    assert!(outcome.follow_up.is_some());

    outcome.cleanup.unwrap().await.unwrap();
    let deleted = chat.deleted.lock().unwrap().clone();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].0, channel.id);

    let claim = desk.claims().lookup_by_order_id(ORDER).await.unwrap();
    assert!(claim.claim.is_invalidated());
}

#[tokio::test]
async fn claimed_command_outside_ticket_keeps_channel() {
    let chat = FakeChat::new();
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 1)]), chat.clone());
    let general = ChannelRef {
        id: "chan-general".into(),
        name: "general".into(),
        topic: None,
    };

    let outcome = desk.commands().unwrap().claimed(ORDER, Some(&general), "staff#1").await;
    assert!(outcome.reply.embed().is_some());
    assert!(outcome.cleanup.is_none());
    assert!(outcome.follow_up.is_none());
}

#[tokio::test]
async fn claimed_command_is_not_repeatable() {
    let desk = desk_with_chat(FakeOrders::with(vec![order(ORDER, EMAIL, 1)]), FakeChat::new());
    let commands = desk.commands().unwrap();

    commands.claimed(ORDER, None, "staff#1").await;
    let again = commands.claimed(ORDER, None, "staff#2").await;
    assert!(again.reply.content().unwrap().contains("already marked as claimed"));
}

#[tokio::test]
async fn claimed_command_reports_unknown_order() {
    let desk = desk_with_chat(FakeOrders::with(vec![]), FakeChat::new());
    let outcome = desk.commands().unwrap().claimed("ord-does-not-exist", None, "staff#1").await;
    assert!(outcome.reply.content().unwrap().contains("No order found"));
    assert!(!desk.cache().is_blocked("ord-does-not-exist"));
}

// ---------------------------------------------------------------------------
// DiscordRest
// ---------------------------------------------------------------------------

type Calls = Arc<Mutex<Vec<(String, Value)>>>;

fn record(calls: &Calls, what: String, headers: &HeaderMap, body: Value) {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or_default();
    let reason = headers
        .get("x-audit-log-reason")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    calls
        .lock()
        .unwrap()
        .push((what, json!({ "auth": auth, "reason": reason, "body": body })));
}

async fn list_channels(Path(guild): Path<String>) -> Json<Value> {
    assert_eq!(guild, "guild-1");
    Json(json!([
        { "id": "10", "name": "general", "type": 0 },
        { "id": "11", "name": CHANNEL, "type": 2 },
        { "id": "12", "name": CHANNEL, "topic": TOPIC, "type": 0 },
        { "id": "13", "type": 4 }
    ]))
}

async fn create_channel(
    State(calls): State<Calls>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let name = body["name"].clone();
    record(&calls, "create".into(), &headers, body);
    Json(json!({ "id": "99", "name": name, "type": 0 }))
}

async fn set_permissions(
    State(calls): State<Calls>,
    Path((channel, user)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    record(&calls, format!("grant {} {}", channel, user), &headers, body);
    StatusCode::NO_CONTENT
}

async fn post_message(
    State(calls): State<Calls>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    record(&calls, format!("post {}", channel), &headers, body);
    Json(json!({ "id": "m-1" }))
}

async fn delete_channel(State(calls): State<Calls>, Path(channel): Path<String>, headers: HeaderMap) -> StatusCode {
    if channel == "missing" {
        return StatusCode::NOT_FOUND;
    }
    record(&calls, format!("delete {}", channel), &headers, Value::Null);
    StatusCode::OK
}

async fn discord() -> (DiscordRest, Calls) {
    let calls: Calls = Arc::default();
    let router = Router::new()
        .route("/api/guilds/{guild}/channels", get(list_channels).post(create_channel))
        .route("/api/channels/{channel}/permissions/{user}", put(set_permissions))
        .route("/api/channels/{channel}/messages", post(post_message))
        .route("/api/channels/{channel}", axum::routing::delete(delete_channel))
        .with_state(calls.clone());
    let base = common::serve(router).await;

    let mut config = ChatConfig::new("bot-token", "guild-1", "cat-1");
    config.api_base = format!("{}/api/", base);
    (DiscordRest::new(&config).unwrap(), calls)
}

#[tokio::test]
async fn discord_finds_text_channels_by_name() {
    let (client, _) = discord().await;
    let found = client.find_channel(CHANNEL).await.unwrap().unwrap();
    assert_eq!(found.id, "12");
    assert_eq!(found.topic.as_deref(), Some(TOPIC));
    assert!(client.find_channel("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn discord_creates_channel_with_overwrites() {
    let (client, calls) = discord().await;
    let spec = ChannelSpec {
        name: CHANNEL.into(),
        topic: "Delivery".into(),
        parent_id: "cat-1".into(),
        overwrites: vec![
            PermissionOverwrite::deny(OverwriteTarget::Everyone, &[Permission::ViewChannel]),
            PermissionOverwrite::allow(OverwriteTarget::Member("u-1".into()), PARTICIPANT),
        ],
        reason: "Delivery ticket".into(),
    };

    let created = client.create_private_channel(&spec).await.unwrap();
    assert_eq!(
        created,
        ChannelRef {
            id: "99".into(),
            name: CHANNEL.into(),
            topic: Some("Delivery".into()),
        }
    );

    let calls = calls.lock().unwrap();
    let (what, call) = &calls[0];
    assert_eq!(what, "create");
    assert_eq!(call["auth"], "Bot bot-token");
    assert_eq!(call["reason"], "Delivery ticket");
    assert_eq!(call["body"]["type"], 0);
    assert_eq!(call["body"]["parent_id"], "cat-1");
    let overwrites = &call["body"]["permission_overwrites"];
    assert_eq!(overwrites[0]["id"], "guild-1");
    assert_eq!(overwrites[0]["deny"], "1024");
    assert_eq!(overwrites[1]["id"], "u-1");
    assert_eq!(overwrites[1]["type"], 1);
    assert_eq!(overwrites[1]["allow"], "117760");
}

#[tokio::test]
async fn discord_grants_posts_and_deletes() {
    let (client, calls) = discord().await;

    client.grant_member("99", "u-2").await.unwrap();
    client
        .post_embed("99", &Embed::new("Hello", COLOR_SUCCESS).field("A", "B", true).footer("f"))
        .await
        .unwrap();
    client.delete_channel("99", "Order claimed").await.unwrap();
    let err = client.delete_channel("missing", "gone").await.unwrap_err();
    assert!(err.is_upstream());

    let calls = calls.lock().unwrap();
    let whats: Vec<&str> = calls.iter().map(|(w, _)| w.as_str()).collect();
    assert_eq!(whats, ["grant 99 u-2", "post 99", "delete 99"]);
    assert_eq!(calls[0].1["body"]["allow"], "117760");
    let embed = &calls[1].1["body"]["embeds"][0];
    assert_eq!(embed["title"], "Hello");
    assert_eq!(embed["color"], COLOR_SUCCESS);
    assert_eq!(embed["fields"][0]["name"], "A");
    assert_eq!(embed["footer"]["text"], "f");
    assert_eq!(calls[2].1["reason"], "Order claimed");
}
