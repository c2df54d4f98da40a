//! Request Handlers
//!
//! Every handler takes the engine lock for the duration of one engine call,
//! so operations are applied one at a time in arrival order.

use super::{errors::ApiError, middleware::{RequestId, CALLER_HEADER}, models::*};
use crate::{
    errors::DealResult,
    feed::EventFeed,
    fulfillment::SharedEngine,
    games::{BoxIndex, Fulfillment, GameEngine, GameEvent, GameId, PlayerId, Randomness},
    store::StoreWriter,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub engine: SharedEngine,
    pub writer: Option<StoreWriter>,
    pub feed: EventFeed,
    pub version: String,
}

impl AppState {
    pub fn new(engine: SharedEngine, writer: Option<StoreWriter>, feed: EventFeed) -> Self {
        Self {
            engine,
            writer,
            feed,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Queue the engine's changed records; the write happens off the lock
    fn persist(&self, engine: &mut GameEngine) {
        if let Some(writer) = &self.writer {
            writer.persist(engine);
        }
    }
}

fn caller_from(headers: &HeaderMap, request_id: &RequestId) -> Result<PlayerId, ApiError> {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PlayerId::from)
        .ok_or_else(|| {
            ApiError::unauthenticated(
                request_id.0.clone(),
                format!("Missing {} header", CALLER_HEADER),
            )
        })
}

/// Drain what the operation emitted, publish it and queue the changed records
fn settle<T>(
    state: &AppState,
    engine: &mut GameEngine,
    request_id: &RequestId,
    result: DealResult<T>,
) -> Result<(T, Vec<GameEvent>), ApiError> {
    let events = engine.drain_events();
    state.persist(engine);
    state.feed.publish(events.clone());
    result
        .map(|value| (value, events))
        .map_err(|e| ApiError::engine(request_id.0.clone(), e))
}

fn engine_error(request_id: &RequestId) -> impl Fn(crate::errors::DealError) -> ApiError + '_ {
    move |e| ApiError::engine(request_id.0.clone(), e)
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// GET /stats
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let engine = state.engine.lock().await;
    Json(StatsResponse {
        total_games: engine.total_games(),
        house_balance: engine.house_balance(),
        pending_requests: engine.pending_requests(),
        oracle: engine.oracle_name().to_string(),
        oracle_fee: engine.oracle_fee(),
        oracle_fees_paid: engine.oracle_fees_paid(),
        stats: engine.stats().clone(),
    })
}

/// POST /games
pub async fn start_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<StartGameRequest>,
) -> Result<Json<StartGameResponse>, ApiError> {
    let caller = caller_from(&headers, &request_id)?;
    let mut engine = state.engine.lock().await;
    let result = engine.start_game(&caller, body.entry_fee, body.oracle_payment);
    let (game_id, events) = settle(&state, &mut engine, &request_id, result)?;
    let game = engine.game(game_id).map_err(engine_error(&request_id))?;

    Ok(Json(StartGameResponse {
        game_id,
        game: GameView::from(game),
        events,
    }))
}

/// GET /games/:id
pub async fn game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
) -> Result<Json<GameView>, ApiError> {
    let engine = state.engine.lock().await;
    let game = engine.game(game_id).map_err(engine_error(&request_id))?;
    Ok(Json(GameView::from(game)))
}

/// GET /games/:id/prizes
pub async fn prizes_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
) -> Result<Json<PrizesResponse>, ApiError> {
    let engine = state.engine.lock().await;
    let prize_pool = engine
        .prize_pool(game_id)
        .map_err(engine_error(&request_id))?
        .to_vec();
    Ok(Json(PrizesResponse { game_id, prize_pool }))
}

/// GET /games/:id/offer
pub async fn offer_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
) -> Result<Json<OfferResponse>, ApiError> {
    let engine = state.engine.lock().await;
    let game = engine.game(game_id).map_err(engine_error(&request_id))?;
    Ok(Json(OfferResponse {
        game_id,
        state: game.state,
        offer: game.current_offer(),
    }))
}

/// GET /games/:id/boxes
pub async fn boxes_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
) -> Result<Json<BoxesResponse>, ApiError> {
    let engine = state.engine.lock().await;
    let game = engine.game(game_id).map_err(engine_error(&request_id))?;
    Ok(Json(BoxesResponse {
        game_id,
        player_box: game.player_box,
        remaining_boxes: game.remaining_boxes.clone(),
        eliminated_boxes: game.eliminated_boxes.clone(),
    }))
}

/// GET /games/:id/boxes/:index
pub async fn box_value_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path((game_id, index)): Path<(GameId, BoxIndex)>,
) -> Result<Json<BoxValueResponse>, ApiError> {
    let engine = state.engine.lock().await;
    let value = engine
        .box_value(game_id, index)
        .map_err(engine_error(&request_id))?;
    Ok(Json(BoxValueResponse {
        game_id,
        index,
        value,
    }))
}

/// POST /games/:id/eliminate
pub async fn eliminate_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
    headers: HeaderMap,
    Json(body): Json<EliminateRequest>,
) -> Result<Json<RoundResponse>, ApiError> {
    let caller = caller_from(&headers, &request_id)?;
    let mut engine = state.engine.lock().await;
    let result = engine.eliminate(&caller, game_id, body.oracle_payment);
    let (oracle_request, events) = settle(&state, &mut engine, &request_id, result)?;
    let game = engine.game(game_id).map_err(engine_error(&request_id))?;

    Ok(Json(RoundResponse {
        request_id: Some(oracle_request),
        game: GameView::from(game),
        events,
    }))
}

/// POST /games/:id/open
pub async fn open_boxes_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
    headers: HeaderMap,
    Json(body): Json<OpenBoxesRequest>,
) -> Result<Json<RoundResponse>, ApiError> {
    let caller = caller_from(&headers, &request_id)?;
    let mut engine = state.engine.lock().await;
    let result = engine.eliminate_selected(&caller, game_id, &body.boxes);
    let ((), events) = settle(&state, &mut engine, &request_id, result)?;
    let game = engine.game(game_id).map_err(engine_error(&request_id))?;

    Ok(Json(RoundResponse {
        request_id: None,
        game: GameView::from(game),
        events,
    }))
}

/// POST /games/:id/accept
pub async fn accept_deal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
    headers: HeaderMap,
) -> Result<Json<AcceptDealResponse>, ApiError> {
    let caller = caller_from(&headers, &request_id)?;
    let mut engine = state.engine.lock().await;
    let result = engine.accept_deal(&caller, game_id);
    let (payout, events) = settle(&state, &mut engine, &request_id, result)?;

    Ok(Json(AcceptDealResponse {
        game_id,
        payout,
        events,
    }))
}

/// GET /players/:player/games
pub async fn player_games_handler(
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
) -> Json<PlayerGamesResponse> {
    let player = PlayerId::new(player);
    let engine = state.engine.lock().await;
    Json(PlayerGamesResponse {
        game_ids: engine.player_games(&player).to_vec(),
        winnings: engine.player_winnings(&player),
        player,
    })
}

/// GET /house
pub async fn house_handler(State(state): State<Arc<AppState>>) -> Json<HouseResponse> {
    let engine = state.engine.lock().await;
    let ledger = engine.ledger();
    Json(HouseResponse {
        owner: ledger.owner().clone(),
        balance: ledger.balance(),
        total_in: ledger.total_in(),
        total_out: ledger.total_out(),
    })
}

/// POST /house/deposit
pub async fn deposit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AmountRequest>,
) -> Result<Json<HouseFundsResponse>, ApiError> {
    let caller = caller_from(&headers, &request_id)?;
    let mut engine = state.engine.lock().await;
    let result = engine.deposit_house_funds(&caller, body.amount);
    let (balance, events) = settle(&state, &mut engine, &request_id, result)?;
    Ok(Json(HouseFundsResponse { balance, events }))
}

/// POST /house/withdraw
pub async fn withdraw_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AmountRequest>,
) -> Result<Json<HouseFundsResponse>, ApiError> {
    let caller = caller_from(&headers, &request_id)?;
    let mut engine = state.engine.lock().await;
    let result = engine.withdraw_house_funds(&caller, body.amount);
    let (balance, events) = settle(&state, &mut engine, &request_id, result)?;
    Ok(Json(HouseFundsResponse { balance, events }))
}

/// POST /allowances/approve
pub async fn approve_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AmountRequest>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let caller = caller_from(&headers, &request_id)?;
    let mut engine = state.engine.lock().await;
    engine.approve(&caller, body.amount);
    state.persist(&mut engine);
    Ok(Json(AllowanceResponse {
        allowance: engine.allowance(&caller),
        player: caller,
    }))
}

/// POST /oracle/fulfill
pub async fn fulfill_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<FulfillRequest>,
) -> Result<Json<FulfillResponse>, ApiError> {
    let caller = caller_from(&headers, &request_id)?;
    let randomness = Randomness::from_hex(&body.randomness)
        .map_err(|e| ApiError::bad_request(request_id.0.clone(), e))?;

    // Proof binding (key, request input, output) is checked by the engine
    let fulfillment = Fulfillment {
        request_id: body.request_id,
        randomness,
        proof: body.proof,
    };

    let mut engine = state.engine.lock().await;
    let result = engine.fulfill_as(&caller, fulfillment);
    let ((), events) = settle(&state, &mut engine, &request_id, result)?;
    Ok(Json(FulfillResponse {
        request_id: body.request_id,
        events,
    }))
}
