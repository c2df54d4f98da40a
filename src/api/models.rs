//! API Request and Response Models

use crate::games::{
    Amount, BoxIndex, EngineStats, Game, GameEvent, GameId, GameState, PlayerId, RequestId,
    RoundRecord, VrfBundle,
};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Engine-wide counters
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub total_games: u64,
    pub house_balance: Amount,
    pub pending_requests: usize,
    pub oracle: String,
    pub oracle_fee: Amount,
    pub oracle_fees_paid: Amount,
    pub stats: EngineStats,
}

/// Public view of a game; the prize table has its own endpoint
#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub game_id: GameId,
    pub player: PlayerId,
    pub entry_fee: Amount,
    pub state: GameState,
    pub current_round: u8,
    pub player_box: Option<BoxIndex>,
    pub remaining_boxes: Vec<BoxIndex>,
    pub eliminated_boxes: Vec<BoxIndex>,
    pub current_offer: Option<Amount>,
    pub payout: Option<Amount>,
    pub is_active: bool,
    pub pending_request: Option<RequestId>,
    pub rounds: Vec<RoundRecord>,
    pub created_at: u64,
}

impl From<&Game> for GameView {
    fn from(game: &Game) -> Self {
        Self {
            game_id: game.game_id,
            player: game.player.clone(),
            entry_fee: game.entry_fee,
            state: game.state,
            current_round: game.current_round,
            player_box: game.player_box,
            remaining_boxes: game.remaining_boxes.clone(),
            eliminated_boxes: game.eliminated_boxes.clone(),
            current_offer: game.current_offer(),
            payout: game.payout,
            is_active: game.is_active,
            pending_request: game.pending_request,
            rounds: game.rounds.clone(),
            created_at: game.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartGameRequest {
    pub entry_fee: Amount,
    #[serde(default)]
    pub oracle_payment: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartGameResponse {
    pub game_id: GameId,
    pub game: GameView,
    pub events: Vec<GameEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EliminateRequest {
    #[serde(default)]
    pub oracle_payment: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenBoxesRequest {
    pub boxes: Vec<BoxIndex>,
}

/// Result of an elimination call, whether randomness was requested or boxes were picked
#[derive(Debug, Clone, Serialize)]
pub struct RoundResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    pub game: GameView,
    pub events: Vec<GameEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptDealResponse {
    pub game_id: GameId,
    pub payout: Amount,
    pub events: Vec<GameEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrizesResponse {
    pub game_id: GameId,
    pub prize_pool: Vec<Amount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferResponse {
    pub game_id: GameId,
    pub state: GameState,
    pub offer: Option<Amount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxesResponse {
    pub game_id: GameId,
    pub player_box: Option<BoxIndex>,
    pub remaining_boxes: Vec<BoxIndex>,
    pub eliminated_boxes: Vec<BoxIndex>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxValueResponse {
    pub game_id: GameId,
    pub index: BoxIndex,
    pub value: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerGamesResponse {
    pub player: PlayerId,
    pub game_ids: Vec<GameId>,
    pub winnings: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct HouseResponse {
    pub owner: PlayerId,
    pub balance: Amount,
    pub total_in: Amount,
    pub total_out: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmountRequest {
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct HouseFundsResponse {
    pub balance: Amount,
    pub events: Vec<GameEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllowanceResponse {
    pub player: PlayerId,
    pub allowance: Amount,
}

/// Callback body for an external oracle
#[derive(Debug, Clone, Deserialize)]
pub struct FulfillRequest {
    pub request_id: RequestId,
    /// Hex-encoded 32-byte value
    pub randomness: String,
    #[serde(default)]
    pub proof: Option<VrfBundle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FulfillResponse {
    pub request_id: RequestId,
    pub events: Vec<GameEvent>,
}
