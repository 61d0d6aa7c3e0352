mod error;
mod routes;
mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use ryft_claims::config::Settings;
use ryft_claims::ClaimDesk;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use state::AppState;

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/claims/verify", post(routes::claims::verify))
        .route("/api/claims/code/{code}", get(routes::claims::get_by_code))
        .route("/api/claims/{order_id}", get(routes::claims::get_by_order))
        .route("/api/claims/{order_id}/username", post(routes::claims::set_username))
        .route("/api/accounts/{username}", get(routes::accounts::get_account))
        .route("/api/tickets", post(routes::tickets::open_ticket))
        .route("/api/delivery", post(routes::delivery::deliver))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    let desk = ClaimDesk::builder().settings(&settings).build()?;
    tracing::info!(%desk, "claim desk ready");

    let state = Arc::new(AppState { desk });
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
