//! WebSocket stream of engine events
//!
//! `GET /ws` streams every event as JSON text frames; `GET /ws?game_id=N`
//! narrows the stream to one game.

use super::handlers::AppState;
use crate::{
    feed::event_game,
    games::{GameEvent, GameId},
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsSubscription {
    #[serde(default)]
    pub game_id: Option<GameId>,
}

impl WsSubscription {
    /// Engine-wide events go to every subscriber
    fn wants(&self, event: &GameEvent) -> bool {
        match (self.game_id, event_game(event)) {
            (Some(wanted), Some(game_id)) => wanted == game_id,
            _ => true,
        }
    }
}

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(subscription): Query<WsSubscription>,
) -> Response {
    let rx = state.feed.subscribe();
    ws.on_upgrade(move |socket| handle_connection(socket, rx, subscription))
}

async fn handle_connection(
    socket: WebSocket,
    mut rx: broadcast::Receiver<GameEvent>,
    subscription: WsSubscription,
) {
    info!(game_id = ?subscription.game_id, "WebSocket client connected");
    let (mut sender, mut receiver) = socket.split();

    let receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    let send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !subscription.wants(&event) {
                continue;
            }
            let message = match serde_json::to_string(&event) {
                Ok(text) => Message::Text(text),
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = receive_task => debug!("WebSocket receive task completed"),
        _ = send_task => debug!("WebSocket send task completed"),
    }
    info!("WebSocket client disconnected");
}
