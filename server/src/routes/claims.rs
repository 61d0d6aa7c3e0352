use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Json;
use ryft_claims::models::ClaimWithItems;
use ryft_claims::{ClaimDesk, ClaimError};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBody {
    pub order_id: String,
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameBody {
    pub email: String,
    pub game_username: String,
}

/// Render a claim snapshot with its derived fields.
pub fn claim_json(claim: &ClaimWithItems) -> Value {
    json!({
        "claim": claim,
        "displayCode": claim.claim.display_code(),
        "status": claim.claim.status(),
        "totalPrice": claim.total_price(),
    })
}

/// [`claim_json`] for readers who have not proved ownership: the order
/// email is masked.
pub fn public_claim_json(claim: &ClaimWithItems) -> Value {
    let mut rendered = claim_json(claim);
    rendered["claim"]["email"] = json!(claim.claim.masked_email());
    rendered
}

/// Load a claim the caller proved ownership of by email.
///
/// Invalidated orders are refused before the email is compared.
pub async fn owned_claim(desk: &ClaimDesk, order_id: &str, email: &str) -> Result<ClaimWithItems, AppError> {
    let claim = desk.claims().lookup_by_order_id(order_id).await?;
    if claim.claim.is_invalidated() {
        return Err(ClaimError::AlreadyProcessed("This order has already been claimed".into()).into());
    }
    if !claim.claim.email_matches(email) {
        return Err(ClaimError::EmailMismatch.into());
    }
    Ok(claim)
}

/// POST /api/claims/verify
///
/// Verify order ownership and return the claim with its items.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<Value>, AppError> {
    let claim = state.desk.claims().verify(&body.order_id, &body.email).await?;
    Ok(Json(json!({ "success": true, "data": claim_json(&claim) })))
}

/// GET /api/claims/:order_id
pub async fn get_by_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let claim = state.desk.claims().lookup_by_order_id(&order_id).await?;
    Ok(Json(json!({ "data": public_claim_json(&claim) })))
}

/// GET /api/claims/code/:code
///
/// Only claims materialized in this process are found.
pub async fn get_by_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Value>, AppError> {
    let claim = state.desk.claims().lookup_by_claim_code(&code)?;
    Ok(Json(json!({ "data": public_claim_json(&claim) })))
}

/// POST /api/claims/:order_id/username
///
/// Attach a game username after checking the account exists.
pub async fn set_username(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Json(body): Json<UsernameBody>,
) -> Result<Json<Value>, AppError> {
    owned_claim(&state.desk, &order_id, &body.email).await?;

    let account = state
        .desk
        .accounts()
        .lookup(&body.game_username)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "game account lookup failed");
            AppError::bad_gateway("Game account lookup is temporarily unavailable")
        })?
        .ok_or_else(|| AppError::bad_request("Game account not found"))?;

    let claim = state
        .desk
        .claims()
        .record_game_username(&order_id, &account.username)?;
    Ok(Json(json!({ "data": claim_json(&claim), "account": account })))
}
