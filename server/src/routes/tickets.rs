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
pub struct TicketBody {
    pub order_id: String,
    pub email: String,
    /// Chat-platform user to invite into the channel.
    #[serde(default)]
    pub chat_user_id: Option<String>,
}

/// POST /api/tickets
///
/// Open the delivery channel for a verified claim.
pub async fn open_ticket(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TicketBody>,
) -> Result<Json<Value>, AppError> {
    let Some(tickets) = state.desk.tickets() else {
        return Err(AppError::unavailable("Chat integration is not configured"));
    };

    let claim = owned_claim(&state.desk, &body.order_id, &body.email).await?;
    if !claim.claim.verified {
        return Err(AppError::bad_request("Verify the order before opening a ticket"));
    }

    let outcome = tickets
        .open_delivery_ticket(&claim, body.chat_user_id.as_deref())
        .await?;
    Ok(Json(json!({
        "success": true,
        "channelId": outcome.channel_id,
        "channelName": outcome.channel_name,
        "created": outcome.created,
        "userAdded": outcome.user_added,
    })))
}
