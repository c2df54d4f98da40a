//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{handlers::*, websocket::ws_handler};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))

        // Games
        .route("/games", post(start_game_handler))
        .route("/games/:id", get(game_handler))
        .route("/games/:id/prizes", get(prizes_handler))
        .route("/games/:id/offer", get(offer_handler))
        .route("/games/:id/boxes", get(boxes_handler))
        .route("/games/:id/boxes/:index", get(box_value_handler))
        .route("/games/:id/eliminate", post(eliminate_handler))
        .route("/games/:id/open", post(open_boxes_handler))
        .route("/games/:id/accept", post(accept_deal_handler))
        .route("/players/:player/games", get(player_games_handler))

        // House funds and token allowances
        .route("/house", get(house_handler))
        .route("/house/deposit", post(deposit_handler))
        .route("/house/withdraw", post(withdraw_handler))
        .route("/allowances/approve", post(approve_handler))

        // External oracle callback
        .route("/oracle/fulfill", post(fulfill_handler))

        // Live event stream
        .route("/ws", get(ws_handler))

        .with_state(state)
}
