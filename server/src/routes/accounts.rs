use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/accounts/:username
///
/// Resolve a game username to its account and avatar.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<Value>, AppError> {
    match state.desk.accounts().lookup(&username).await {
        Ok(Some(account)) => Ok(Json(json!({ "exists": true, "data": account }))),
        Ok(None) => Err(AppError::not_found("Game account not found")),
        Err(e) => {
            tracing::warn!(username, error = %e, "game account lookup failed");
            Err(AppError::bad_gateway("Game account lookup is temporarily unavailable"))
        }
    }
}
