use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::routes::claims::owned_claim;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryBody {
    pub order_id: String,
    pub email: String,
    pub game_username: String,
}

/// POST /api/delivery
///
/// Queue in-game delivery for a verified claim, once per order. Delivery
/// itself never fails; a degraded receipt still carries a join URL.
pub async fn deliver(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeliveryBody>,
) -> Result<Json<Value>, AppError> {
    owned_claim(&state.desk, &body.order_id, &body.email).await?;
    state
        .desk
        .claims()
        .record_game_username(&body.order_id, &body.game_username)?;
    let claim = state.desk.claims().begin_delivery(&body.order_id)?;

    let receipt = state.desk.delivery().deliver(&claim, body.game_username.trim()).await;
    Ok(Json(json!({ "success": true, "data": receipt })))
}
