//! Game engine: per-game state machine over a shared house ledger
//!
//! Every public operation validates completely before touching state, so a
//! failed call leaves the engine exactly as it was. Round progression that
//! depends on randomness lives in the fulfillment handler; the request side
//! only records the pending request. That keeps the engine correct whether
//! the oracle answers inside `request` or much later.

use crate::config::{DealConfig, EntryFeeMode};
use crate::errors::{
    AuthorizationError, DealError, DealResult, OracleError, ResourceError, StateError,
    ValidationError,
};
use crate::games::ledger::{AllowanceBook, HouseLedger};
use crate::games::offer::calculate_offer;
use crate::games::oracles::VrfOracle;
use crate::games::pending_requests::{PendingRequest, PendingRequests};
use crate::games::prize_pool::{PrizeLadder, MAX_ENTRY_FEE};
use crate::games::randomness::{
    pick_eliminations, pick_player_box, Fulfillment, OracleTicket, RandomnessOracle, RequestSeed,
};
use crate::games::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Deployment rules the engine enforces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    pub house_percentage: u8,
    pub prize_ladder: PrizeLadder,
    pub entry_fee_mode: EntryFeeMode,
    /// Fixed fee, or the minimum in custom mode
    pub entry_fee: Amount,
    pub denomination: Denomination,
    pub owner: PlayerId,
    pub oracle_operator: PlayerId,
}

impl GameSettings {
    pub fn from_config(config: &DealConfig) -> Self {
        Self {
            house_percentage: config.game.house_percentage,
            prize_ladder: config.game.prize_ladder,
            entry_fee_mode: config.game.entry_fee_mode,
            entry_fee: config.game.entry_fee_amount(),
            denomination: config.game.denomination(),
            owner: config.game.owner_id(),
            oracle_operator: PlayerId::new(config.oracle.operator.clone()),
        }
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self::from_config(&DealConfig::default())
    }
}

/// Everything the engine owns apart from the oracle backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    /// Dense arena: `games[id]` is game `id`
    pub games: Vec<Game>,
    pub player_games: BTreeMap<PlayerId, Vec<GameId>>,
    pub pending: PendingRequests,
    pub ledger: HouseLedger,
    pub allowances: AllowanceBook,
    pub settlements: Vec<Settlement>,
    pub stats: EngineStats,
    /// Folded into request seeds so repeated requests never share one
    pub request_nonce: u64,
    pub oracle_fees_paid: Amount,
    /// One past the highest sequence number the oracle has issued
    pub next_request_id: RequestId,
}

impl EngineSnapshot {
    fn empty(owner: PlayerId) -> Self {
        Self {
            games: Vec::new(),
            player_games: BTreeMap::new(),
            pending: PendingRequests::new(),
            ledger: HouseLedger::new(owner),
            allowances: AllowanceBook::default(),
            settlements: Vec::new(),
            stats: EngineStats::default(),
            request_nonce: 0,
            oracle_fees_paid: 0,
            next_request_id: 1,
        }
    }

    fn meta(&self) -> EngineMeta {
        EngineMeta {
            stats: self.stats.clone(),
            request_nonce: self.request_nonce,
            oracle_fees_paid: self.oracle_fees_paid,
            next_request_id: self.next_request_id,
        }
    }
}

/// Engine-wide counters stored as one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMeta {
    pub stats: EngineStats,
    pub request_nonce: u64,
    pub oracle_fees_paid: Amount,
    pub next_request_id: RequestId,
}

/// Records changed since the last [`GameEngine::take_changes`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineChanges {
    pub games: Vec<Game>,
    /// `None` once the request has been consumed
    pub pending: Vec<(RequestId, Option<PendingRequest>)>,
    /// New settlements with their position in the settlement log
    pub settlements: Vec<(u64, Settlement)>,
    pub ledger: Option<HouseLedger>,
    pub allowances: Option<AllowanceBook>,
    pub meta: EngineMeta,
}

#[derive(Debug, Default)]
struct ChangeSet {
    games: BTreeSet<GameId>,
    requests: BTreeSet<RequestId>,
    settlements_from: Option<usize>,
    ledger: bool,
    allowances: bool,
    meta: bool,
}

impl ChangeSet {
    fn is_empty(&self) -> bool {
        self.games.is_empty()
            && self.requests.is_empty()
            && self.settlements_from.is_none()
            && !self.ledger
            && !self.allowances
            && !self.meta
    }
}

/// Result of resolving a round before it is committed
enum RoundOutcome {
    Offer(Amount),
    Final(Amount),
}

pub struct GameEngine {
    settings: GameSettings,
    state: EngineSnapshot,
    oracle: Box<dyn RandomnessOracle>,
    events: Vec<GameEvent>,
    changes: ChangeSet,
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

impl GameEngine {
    pub fn new(settings: GameSettings, oracle: Box<dyn RandomnessOracle>) -> Self {
        let state = EngineSnapshot::empty(settings.owner.clone());
        Self {
            settings,
            state,
            oracle,
            events: Vec::new(),
            changes: ChangeSet::default(),
        }
    }

    /// Rebuild from persisted state, re-registering outstanding requests with the backend
    pub fn from_snapshot(
        settings: GameSettings,
        mut oracle: Box<dyn RandomnessOracle>,
        snapshot: EngineSnapshot,
    ) -> Self {
        oracle.resume_sequence(snapshot.next_request_id);
        for (request_id, request) in snapshot.pending.iter() {
            oracle.resume(*request_id, request.seed);
        }
        info!(
            games = snapshot.games.len(),
            pending = snapshot.pending.pending_count(),
            oracle = oracle.name(),
            "Engine restored from snapshot"
        );
        Self {
            settings,
            state: snapshot,
            oracle,
            events: Vec::new(),
            changes: ChangeSet::default(),
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.clone()
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    pub fn oracle_fee(&self) -> Amount {
        self.oracle.fee()
    }

    /// Events emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Changed records since the last call, or `None` if nothing changed
    pub fn take_changes(&mut self) -> Option<EngineChanges> {
        if self.changes.is_empty() {
            return None;
        }
        let changes = std::mem::take(&mut self.changes);
        let state = &self.state;

        let games = changes
            .games
            .iter()
            .filter_map(|&id| state.games.get(usize::try_from(id).ok()?).cloned())
            .collect();
        let pending = changes
            .requests
            .iter()
            .map(|&id| (id, state.pending.get(id).cloned()))
            .collect();
        let settlements = changes
            .settlements_from
            .map(|from| {
                state.settlements[from..]
                    .iter()
                    .enumerate()
                    .map(|(offset, s)| ((from + offset) as u64, s.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Some(EngineChanges {
            games,
            pending,
            settlements,
            ledger: changes.ledger.then(|| state.ledger.clone()),
            allowances: changes.allowances.then(|| state.allowances.clone()),
            meta: state.meta(),
        })
    }

    // ------------------------------------------------------------------
    // Player operations
    // ------------------------------------------------------------------

    /// Deposit the entry fee, open a game and request the player's box
    pub fn start_game(
        &mut self,
        player: &PlayerId,
        entry_fee: Amount,
        oracle_payment: Amount,
    ) -> DealResult<GameId> {
        self.validate_entry_fee(entry_fee)?;
        self.validate_oracle_payment(oracle_payment)?;
        if self.settings.denomination.requires_allowance() {
            self.state.allowances.ensure_covers(player, entry_fee)?;
        }

        let game_id = self.state.games.len() as GameId;
        let seed = RequestSeed::derive(
            game_id,
            RequestPurpose::AssignPlayerBox,
            0,
            self.state.request_nonce,
        );
        let ticket = self.oracle.request(seed)?;
        let request_id = ticket.request_id();

        // Commit
        if self.settings.denomination.requires_allowance() {
            self.state.allowances.consume(player, entry_fee)?;
        }
        self.state.ledger.credit(entry_fee);
        self.changes.ledger = true;
        self.changes.allowances |= self.settings.denomination.requires_allowance();
        self.record_request(game_id, request_id, RequestPurpose::AssignPlayerBox, seed);

        let prize_pool = self.settings.prize_ladder.generate(entry_fee);
        let mut game = Game::new(game_id, player.clone(), entry_fee, prize_pool, now_millis());
        game.pending_request = Some(request_id);
        self.state.games.push(game);
        self.state
            .player_games
            .entry(player.clone())
            .or_default()
            .push(game_id);
        self.changes.games.insert(game_id);
        self.state.stats.games_started += 1;

        info!(game_id, player = %player, entry_fee = %entry_fee, "Game started");
        self.events.push(GameEvent::GameStarted {
            game_id,
            player: player.clone(),
            entry_fee,
        });
        self.events.push(GameEvent::RandomnessRequested {
            game_id,
            request_id,
            purpose: RequestPurpose::AssignPlayerBox,
            fee: self.oracle.fee(),
        });

        self.deliver_ticket(ticket);
        Ok(game_id)
    }

    /// Ask the oracle to open the next batch of boxes.
    ///
    /// Calling this while an offer stands declines the offer.
    pub fn eliminate(
        &mut self,
        caller: &PlayerId,
        game_id: GameId,
        oracle_payment: Amount,
    ) -> DealResult<RequestId> {
        let index = self.game_index(game_id)?;
        self.ensure_can_eliminate(caller, &self.state.games[index])?;
        self.validate_oracle_payment(oracle_payment)?;

        let game = &self.state.games[index];
        let declined = game.current_offer();
        let seed = RequestSeed::derive(
            game_id,
            RequestPurpose::EliminateRound,
            game.current_round + 1,
            self.state.request_nonce,
        );
        let ticket = self.oracle.request(seed)?;
        let request_id = ticket.request_id();

        // Commit
        self.record_request(game_id, request_id, RequestPurpose::EliminateRound, seed);
        self.state.games[index].pending_request = Some(request_id);
        self.changes.games.insert(game_id);

        debug!(game_id, request_id, "Elimination round requested");
        self.events.push(GameEvent::RandomnessRequested {
            game_id,
            request_id,
            purpose: RequestPurpose::EliminateRound,
            fee: self.oracle.fee(),
        });
        if let Some(offer) = declined {
            info!(game_id, offer = %offer, "Offer declined");
            self.events.push(GameEvent::OfferDeclined { game_id, offer });
        }

        self.deliver_ticket(ticket);
        Ok(request_id)
    }

    /// Open boxes the player picked for this round, no randomness needed
    pub fn eliminate_selected(
        &mut self,
        caller: &PlayerId,
        game_id: GameId,
        boxes: &[BoxIndex],
    ) -> DealResult<()> {
        let index = self.game_index(game_id)?;
        let game = &self.state.games[index];
        self.ensure_can_eliminate(caller, game)?;

        let expected = game.next_batch_size();
        if boxes.len() != expected {
            return Err(ValidationError::WrongBatchSize {
                expected,
                actual: boxes.len(),
            }
            .into());
        }
        let mut seen = HashSet::new();
        for &b in boxes {
            if usize::from(b) >= TOTAL_BOXES {
                return Err(ValidationError::InvalidBoxIndex(b).into());
            }
            if game.player_box == Some(b) {
                return Err(ValidationError::PlayerBoxSelected(b).into());
            }
            if game.eliminated_boxes.contains(&b) {
                return Err(ValidationError::BoxAlreadyEliminated(b).into());
            }
            if !seen.insert(b) {
                return Err(ValidationError::DuplicateBox(b).into());
            }
        }

        let declined = game.current_offer();
        self.complete_round(index, boxes.to_vec(), None, declined)
    }

    /// Take the standing offer and end the game
    pub fn accept_deal(&mut self, caller: &PlayerId, game_id: GameId) -> DealResult<Amount> {
        let index = self.game_index(game_id)?;
        let game = &self.state.games[index];
        if &game.player != caller {
            return Err(AuthorizationError::NotYourGame { game_id }.into());
        }
        if game.state != GameState::OfferMade || !game.is_active {
            return Err(StateError::InvalidGameState {
                game_id,
                state: game.state,
            }
            .into());
        }
        if let Some(request_id) = game.pending_request {
            return Err(StateError::RequestPending { game_id, request_id }.into());
        }
        let offer = game.last_offer.ok_or(StateError::NoStandingOffer(game_id))?;
        if let Err(err) = self.state.ledger.ensure_covers(offer) {
            warn!(game_id, offer = %offer, balance = %self.state.ledger.balance(), "House cannot cover offer");
            return Err(err);
        }

        // Commit
        self.state.ledger.debit(offer)?;
        self.changes.ledger = true;
        self.changes.games.insert(game_id);
        let game = &mut self.state.games[index];
        game.state = GameState::DealTaken;
        game.is_active = false;
        game.last_offer = None;
        game.payout = Some(offer);
        let player = game.player.clone();

        self.record_settlement(Settlement {
            game_id,
            player: player.clone(),
            amount: offer,
            kind: SettlementKind::DealAccepted,
            settled_at: now_millis(),
        });
        self.state.stats.deals_accepted += 1;
        info!(game_id, player = %player, payout = %offer, "Deal accepted");
        self.events.push(GameEvent::DealAccepted {
            game_id,
            player,
            payout: offer,
        });
        Ok(offer)
    }

    // ------------------------------------------------------------------
    // Oracle side
    // ------------------------------------------------------------------

    /// Apply one oracle delivery. Unknown or already consumed requests are rejected
    /// without touching any game.
    pub fn fulfill(&mut self, fulfillment: Fulfillment) -> DealResult<()> {
        let request_id = fulfillment.request_id;
        let Some(pending) = self.state.pending.get(request_id).cloned() else {
            return Err(self.reject_fulfillment(request_id));
        };

        let result = match pending.purpose {
            RequestPurpose::AssignPlayerBox => self.apply_box_assignment(pending.game_id, &fulfillment),
            RequestPurpose::EliminateRound => self.apply_elimination(pending.game_id, &fulfillment),
        };

        match result {
            Ok(()) => {
                self.state.pending.complete(request_id);
                self.changes.requests.insert(request_id);
                self.state.stats.fulfillments_applied += 1;
                Ok(())
            }
            Err(DealError::Resource(ResourceError::HouseInsufficientFunds { required, available })) => {
                warn!(
                    game_id = pending.game_id,
                    request_id,
                    required = %required,
                    available = %available,
                    "Final payout not covered, parking fulfillment"
                );
                self.state.pending.park(fulfillment);
                self.changes.requests.insert(request_id);
                self.changes.meta = true;
                self.state.stats.fulfillments_deferred += 1;
                self.events.push(GameEvent::FulfillmentDeferred {
                    game_id: pending.game_id,
                    request_id,
                    required,
                    available,
                });
                Err(ResourceError::HouseInsufficientFunds { required, available }.into())
            }
            Err(err) => {
                warn!(request_id, error = %err, "Fulfillment could not be applied");
                Err(err)
            }
        }
    }

    /// External callback path: only the configured operator may deliver, and an
    /// attached proof must come from this backend's key for this exact request
    pub fn fulfill_as(&mut self, caller: &PlayerId, fulfillment: Fulfillment) -> DealResult<()> {
        if caller != &self.settings.oracle_operator {
            return Err(AuthorizationError::NotOracleOperator.into());
        }
        if fulfillment.proof.is_some() {
            let request_id = fulfillment.request_id;
            let Some(pending) = self.state.pending.get(request_id) else {
                return Err(self.reject_fulfillment(request_id));
            };
            let seed = pending.seed;
            if let Err(err) = self.check_proof(&fulfillment, &seed) {
                warn!(request_id, error = %err, "Rejected fulfillment proof");
                return Err(err);
            }
        }
        self.fulfill(fulfillment)
    }

    /// Pull whatever the backend has ready and apply it; returns how many applied
    pub fn poll_oracle(&mut self) -> usize {
        let ready = self.oracle.drain_ready();
        let mut applied = 0;
        for fulfillment in ready {
            if self.deliver(fulfillment) {
                applied += 1;
            }
        }
        applied
    }

    /// Re-apply deliveries that were parked for lack of house funds
    pub fn retry_parked(&mut self) -> usize {
        let parked = self.state.pending.parked();
        let mut applied = 0;
        for fulfillment in parked {
            if self.fulfill(fulfillment).is_ok() {
                applied += 1;
            }
        }
        applied
    }

    // ------------------------------------------------------------------
    // House operations
    // ------------------------------------------------------------------

    pub fn deposit_house_funds(&mut self, caller: &PlayerId, amount: Amount) -> DealResult<Amount> {
        let balance = self.state.ledger.deposit(caller, amount)?;
        self.changes.ledger = true;
        self.events.push(GameEvent::HouseFundsDeposited { amount, balance });
        let resumed = self.retry_parked();
        if resumed > 0 {
            info!(resumed, "Parked fulfillments applied after deposit");
        }
        Ok(self.state.ledger.balance())
    }

    pub fn withdraw_house_funds(&mut self, caller: &PlayerId, amount: Amount) -> DealResult<Amount> {
        let balance = self.state.ledger.withdraw(caller, amount)?;
        self.changes.ledger = true;
        self.events.push(GameEvent::HouseFundsWithdrawn { amount, balance });
        Ok(balance)
    }

    /// Token deployments: let the engine pull up to `amount` from the player
    pub fn approve(&mut self, player: &PlayerId, amount: Amount) {
        self.state.allowances.approve(player, amount);
        self.changes.allowances = true;
        debug!(player = %player, amount = %amount, "Allowance approved");
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn game(&self, game_id: GameId) -> DealResult<&Game> {
        let index = self.game_index(game_id)?;
        Ok(&self.state.games[index])
    }

    pub fn prize_pool(&self, game_id: GameId) -> DealResult<&[Amount]> {
        Ok(&self.game(game_id)?.prize_pool)
    }

    /// Prize table a new game would get for this fee
    pub fn preview_prize_pool(&self, entry_fee: Amount) -> Vec<Amount> {
        self.settings.prize_ladder.generate(entry_fee)
    }

    pub fn current_offer(&self, game_id: GameId) -> DealResult<Option<Amount>> {
        Ok(self.game(game_id)?.current_offer())
    }

    pub fn remaining_boxes(&self, game_id: GameId) -> DealResult<&[BoxIndex]> {
        Ok(&self.game(game_id)?.remaining_boxes)
    }

    pub fn eliminated_boxes(&self, game_id: GameId) -> DealResult<&[BoxIndex]> {
        Ok(&self.game(game_id)?.eliminated_boxes)
    }

    pub fn box_value(&self, game_id: GameId, index: BoxIndex) -> DealResult<Amount> {
        let game = self.game(game_id)?;
        game.prize_pool
            .get(usize::from(index))
            .copied()
            .ok_or_else(|| ValidationError::InvalidBoxIndex(index).into())
    }

    pub fn house_balance(&self) -> Amount {
        self.state.ledger.balance()
    }

    pub fn ledger(&self) -> &HouseLedger {
        &self.state.ledger
    }

    pub fn total_games(&self) -> u64 {
        self.state.games.len() as u64
    }

    pub fn player_games(&self, player: &PlayerId) -> &[GameId] {
        self.state
            .player_games
            .get(player)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn settlements_for(&self, player: &PlayerId) -> Vec<&Settlement> {
        self.state
            .settlements
            .iter()
            .filter(|s| &s.player == player)
            .collect()
    }

    pub fn player_winnings(&self, player: &PlayerId) -> Amount {
        self.settlements_for(player).iter().map(|s| s.amount).sum()
    }

    pub fn allowance(&self, player: &PlayerId) -> Amount {
        self.state.allowances.allowance(player)
    }

    pub fn pending_requests(&self) -> usize {
        self.state.pending.pending_count()
    }

    /// Outstanding request by oracle sequence number
    pub fn pending_request(&self, request_id: RequestId) -> Option<&PendingRequest> {
        self.state.pending.get(request_id)
    }

    pub fn oracle_public_key(&self) -> Option<String> {
        self.oracle.public_key()
    }

    pub fn oracle_fees_paid(&self) -> Amount {
        self.state.oracle_fees_paid
    }

    pub fn stats(&self) -> &EngineStats {
        &self.state.stats
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn game_index(&self, game_id: GameId) -> DealResult<usize> {
        let index = usize::try_from(game_id).map_err(|_| ValidationError::GameNotFound(game_id))?;
        if index >= self.state.games.len() {
            return Err(ValidationError::GameNotFound(game_id).into());
        }
        Ok(index)
    }

    fn validate_entry_fee(&self, entry_fee: Amount) -> DealResult<()> {
        if entry_fee == 0 {
            return Err(ValidationError::ZeroEntryFee.into());
        }
        if entry_fee > MAX_ENTRY_FEE {
            return Err(ValidationError::EntryFeeTooHigh(entry_fee).into());
        }
        match self.settings.entry_fee_mode {
            EntryFeeMode::Fixed if entry_fee != self.settings.entry_fee => {
                Err(ValidationError::EntryFeeMismatch {
                    expected: self.settings.entry_fee,
                    actual: entry_fee,
                }
                .into())
            }
            EntryFeeMode::Custom if entry_fee < self.settings.entry_fee => {
                Err(ValidationError::EntryFeeTooLow {
                    minimum: self.settings.entry_fee,
                    actual: entry_fee,
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    fn validate_oracle_payment(&self, provided: Amount) -> DealResult<()> {
        let required = self.oracle.fee();
        if provided < required {
            return Err(ValidationError::InsufficientOracleFee { required, provided }.into());
        }
        Ok(())
    }

    fn ensure_can_eliminate(&self, caller: &PlayerId, game: &Game) -> DealResult<()> {
        let game_id = game.game_id;
        if &game.player != caller {
            return Err(AuthorizationError::NotYourGame { game_id }.into());
        }
        if !game.is_active || !game.state.can_eliminate() || game.current_round >= TOTAL_ROUNDS {
            return Err(StateError::InvalidGameState {
                game_id,
                state: game.state,
            }
            .into());
        }
        if let Some(request_id) = game.pending_request {
            return Err(StateError::RequestPending { game_id, request_id }.into());
        }
        if game.player_box.is_none() {
            return Err(StateError::PlayerBoxUnassigned(game_id).into());
        }
        Ok(())
    }

    fn record_request(
        &mut self,
        game_id: GameId,
        request_id: RequestId,
        purpose: RequestPurpose,
        seed: RequestSeed,
    ) {
        self.state.request_nonce += 1;
        self.state.next_request_id = self.state.next_request_id.max(request_id + 1);
        self.state.oracle_fees_paid = self.state.oracle_fees_paid.saturating_add(self.oracle.fee());
        self.changes.requests.insert(request_id);
        self.changes.meta = true;
        self.state.pending.add_pending(
            request_id,
            PendingRequest {
                game_id,
                purpose,
                seed,
                submitted_at: now_millis(),
                parked: None,
            },
        );
    }

    fn record_settlement(&mut self, settlement: Settlement) {
        let position = self.state.settlements.len();
        let from = self.changes.settlements_from.map_or(position, |from| from.min(position));
        self.changes.settlements_from = Some(from);
        self.state.settlements.push(settlement);
    }

    /// Tie a delivered proof to this backend's key, this request's input and
    /// the randomness being applied
    fn check_proof(&self, fulfillment: &Fulfillment, seed: &RequestSeed) -> DealResult<()> {
        let Some(bundle) = &fulfillment.proof else {
            return Ok(());
        };
        let invalid =
            |reason: &str| -> DealError { ValidationError::InvalidProof(reason.to_string()).into() };

        let expected_key = self
            .oracle
            .public_key()
            .ok_or_else(|| invalid("backend does not sign its randomness"))?;
        if bundle.public_key != expected_key {
            return Err(invalid("signed by a key other than the oracle's"));
        }
        if bundle.input != VrfOracle::input_message(fulfillment.request_id, seed) {
            return Err(invalid("signed input does not belong to this request"));
        }
        if bundle.output != fulfillment.randomness.to_hex() {
            return Err(invalid("output does not match the delivered randomness"));
        }
        match VrfOracle::verify(bundle) {
            Ok(true) => Ok(()),
            Ok(false) => Err(invalid("signature does not verify")),
            Err(reason) => Err(ValidationError::InvalidProof(reason).into()),
        }
    }

    fn deliver_ticket(&mut self, ticket: OracleTicket) {
        if let OracleTicket::Immediate(fulfillment) = ticket {
            self.deliver(fulfillment);
        }
    }

    /// Apply a delivery we produced or pulled ourselves; failures are logged, not returned
    fn deliver(&mut self, fulfillment: Fulfillment) -> bool {
        match self.fulfill(fulfillment) {
            Ok(()) => true,
            Err(err) if err.is_retryable() => false,
            Err(err) => {
                warn!(error = %err, "Oracle delivery dropped");
                false
            }
        }
    }

    fn reject_fulfillment(&mut self, request_id: RequestId) -> DealError {
        let err: DealError = OracleError::UnknownRequest(request_id).into();
        warn!(request_id, "Rejected fulfillment for unknown or consumed request");
        self.state.stats.fulfillments_rejected += 1;
        self.changes.meta = true;
        self.events.push(GameEvent::FulfillmentRejected {
            request_id,
            reason: err.to_string(),
        });
        err
    }

    /// The game must still be waiting on exactly this request
    fn awaiting_index(&self, game_id: GameId, request_id: RequestId) -> DealResult<usize> {
        let index = self.game_index(game_id)?;
        if self.state.games[index].pending_request != Some(request_id) {
            return Err(OracleError::UnknownRequest(request_id).into());
        }
        Ok(index)
    }

    fn apply_box_assignment(&mut self, game_id: GameId, fulfillment: &Fulfillment) -> DealResult<()> {
        let index = self.awaiting_index(game_id, fulfillment.request_id)?;
        let player_box = pick_player_box(&fulfillment.randomness);

        let game = &mut self.state.games[index];
        game.player_box = Some(player_box);
        game.remaining_boxes.retain(|&b| b != player_box);
        game.pending_request = None;
        let player = game.player.clone();
        self.changes.games.insert(game_id);

        debug!(game_id, player_box, "Player box assigned");
        self.events.push(GameEvent::PlayerBoxAssigned {
            game_id,
            player,
            player_box,
        });
        Ok(())
    }

    fn apply_elimination(&mut self, game_id: GameId, fulfillment: &Fulfillment) -> DealResult<()> {
        let index = self.awaiting_index(game_id, fulfillment.request_id)?;
        let game = &self.state.games[index];
        let picked = pick_eliminations(
            &fulfillment.randomness,
            &game.remaining_boxes,
            game.next_batch_size(),
        );
        self.complete_round(index, picked, Some(fulfillment), None)
    }

    /// Move `picked` out of play, then either make an offer or settle the final round
    fn complete_round(
        &mut self,
        index: usize,
        picked: Vec<BoxIndex>,
        source: Option<&Fulfillment>,
        declined: Option<Amount>,
    ) -> DealResult<()> {
        let game = &self.state.games[index];
        let game_id = game.game_id;
        let round = game.current_round + 1;
        let player_value = game
            .player_box_value()
            .ok_or(StateError::PlayerBoxUnassigned(game_id))?;
        let remaining: Vec<BoxIndex> = game
            .remaining_boxes
            .iter()
            .copied()
            .filter(|b| !picked.contains(b))
            .collect();

        let outcome = if round >= TOTAL_ROUNDS {
            self.state.ledger.ensure_covers(player_value)?;
            RoundOutcome::Final(player_value)
        } else {
            let values: Vec<Amount> = remaining
                .iter()
                .map(|&b| game.prize_pool[usize::from(b)])
                .collect();
            RoundOutcome::Offer(calculate_offer(
                &values,
                player_value,
                self.settings.house_percentage,
            ))
        };

        // Commit
        if let RoundOutcome::Final(payout) = outcome {
            self.state.ledger.debit(payout)?;
            self.changes.ledger = true;
        }
        self.changes.games.insert(game_id);
        self.changes.meta = true;
        if let Some(offer) = declined {
            self.events.push(GameEvent::OfferDeclined { game_id, offer });
        }

        let game = &mut self.state.games[index];
        game.eliminated_boxes.extend_from_slice(&picked);
        game.remaining_boxes = remaining;
        game.current_round = round;
        game.pending_request = None;
        let player = game.player.clone();

        let offer = match outcome {
            RoundOutcome::Offer(offer) => {
                game.state = GameState::OfferMade;
                game.last_offer = Some(offer);
                Some(offer)
            }
            RoundOutcome::Final(payout) => {
                game.state = GameState::GameCompleted;
                game.is_active = false;
                game.last_offer = None;
                game.payout = Some(payout);
                None
            }
        };
        game.rounds.push(RoundRecord {
            round,
            eliminated: picked.clone(),
            offer,
            randomness: source.map(|f| f.randomness.to_hex()),
            proof: source.and_then(|f| f.proof.clone()),
        });

        self.state.stats.rounds_completed += 1;
        debug!(game_id, round, eliminated = ?picked, "Round completed");
        self.events.push(GameEvent::RoundCompleted {
            game_id,
            round,
            eliminated: picked,
            offer,
        });

        if let RoundOutcome::Final(payout) = outcome {
            self.record_settlement(Settlement {
                game_id,
                player: player.clone(),
                amount: payout,
                kind: SettlementKind::GameCompleted,
                settled_at: now_millis(),
            });
            self.state.stats.games_completed += 1;
            info!(game_id, player = %player, payout = %payout, "Game completed");
            self.events.push(GameEvent::GameCompleted {
                game_id,
                player,
                payout,
            });
        } else if let Some(offer) = offer {
            info!(game_id, round, offer = %offer, "Banker offer made");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::oracles::{InstantOracle, VrfOracle};
    use crate::games::randomness::Randomness;

    const FEE: Amount = 10_000;

    fn settings() -> GameSettings {
        GameSettings {
            entry_fee: FEE,
            ..GameSettings::default()
        }
    }

    fn house() -> PlayerId {
        PlayerId::from("house")
    }

    fn alice() -> PlayerId {
        PlayerId::from("alice")
    }

    fn funded_engine() -> GameEngine {
        let mut engine = GameEngine::new(settings(), Box::new(InstantOracle::new(1, 0)));
        engine.deposit_house_funds(&house(), 10_000_000).unwrap();
        engine
    }

    #[test]
    fn test_start_assigns_box_with_instant_oracle() {
        let mut engine = funded_engine();
        let game_id = engine.start_game(&alice(), FEE, 0).unwrap();
        let game = engine.game(game_id).unwrap();

        assert_eq!(game.state, GameState::Playing);
        assert!(game.player_box.is_some());
        assert_eq!(game.remaining_boxes.len(), 25);
        assert!(game.pending_request.is_none());
        assert!(game.boxes_partitioned());
        assert_eq!(engine.house_balance(), 10_000_000 + FEE);
        assert_eq!(engine.pending_requests(), 0);
    }

    #[test]
    fn test_entry_fee_policy() {
        let mut engine = funded_engine();
        assert_eq!(
            engine.start_game(&alice(), 0, 0),
            Err(ValidationError::ZeroEntryFee.into())
        );
        assert_eq!(
            engine.start_game(&alice(), FEE + 1, 0),
            Err(ValidationError::EntryFeeMismatch {
                expected: FEE,
                actual: FEE + 1
            }
            .into())
        );
        assert_eq!(engine.total_games(), 0);
    }

    #[test]
    fn test_oracle_fee_required() {
        let mut engine = GameEngine::new(settings(), Box::new(InstantOracle::new(1, 25)));
        assert_eq!(
            engine.start_game(&alice(), FEE, 24),
            Err(ValidationError::InsufficientOracleFee {
                required: 25,
                provided: 24
            }
            .into())
        );
        engine.start_game(&alice(), FEE, 25).unwrap();
        assert_eq!(engine.oracle_fees_paid(), 25);
    }

    #[test]
    fn test_deferred_oracle_parks_game_until_fulfilled() {
        let mut engine = GameEngine::new(settings(), Box::new(VrfOracle::new_random(0)));
        let game_id = engine.start_game(&alice(), FEE, 0).unwrap();
        let game = engine.game(game_id).unwrap();
        assert!(game.player_box.is_none());
        assert_eq!(game.remaining_boxes.len(), TOTAL_BOXES);
        assert!(game.boxes_partitioned());

        let err = engine.eliminate(&alice(), game_id, 0).unwrap_err();
        assert!(matches!(err, DealError::State(StateError::RequestPending { .. })));

        assert_eq!(engine.poll_oracle(), 1);
        let game = engine.game(game_id).unwrap();
        assert!(game.player_box.is_some());
        assert_eq!(game.remaining_boxes.len(), 25);
    }

    #[test]
    fn test_duplicate_fulfillment_has_no_effect() {
        let mut engine = GameEngine::new(settings(), Box::new(VrfOracle::new_random(0)));
        let game_id = engine.start_game(&alice(), FEE, 0).unwrap();
        let request_id = engine.game(game_id).unwrap().pending_request.unwrap();

        let delivery = Fulfillment::new(request_id, Randomness([9; 32]));
        engine.fulfill(delivery.clone()).unwrap();
        let after_first = engine.game(game_id).unwrap().clone();

        assert_eq!(
            engine.fulfill(delivery),
            Err(OracleError::UnknownRequest(request_id).into())
        );
        assert_eq!(engine.game(game_id).unwrap(), &after_first);
        assert_eq!(engine.stats().fulfillments_rejected, 1);
    }

    #[test]
    fn test_selected_elimination_validation() {
        let mut engine = funded_engine();
        let game_id = engine.start_game(&alice(), FEE, 0).unwrap();
        let game = engine.game(game_id).unwrap().clone();
        let player_box = game.player_box.unwrap();
        let others: Vec<BoxIndex> = game.remaining_boxes.clone();

        assert_eq!(
            engine.eliminate_selected(&alice(), game_id, &others[..5]),
            Err(ValidationError::WrongBatchSize {
                expected: 6,
                actual: 5
            }
            .into())
        );

        let mut with_player = others[..5].to_vec();
        with_player.push(player_box);
        assert_eq!(
            engine.eliminate_selected(&alice(), game_id, &with_player),
            Err(ValidationError::PlayerBoxSelected(player_box).into())
        );

        let mut duplicated = others[..5].to_vec();
        duplicated.push(others[0]);
        assert_eq!(
            engine.eliminate_selected(&alice(), game_id, &duplicated),
            Err(ValidationError::DuplicateBox(others[0]).into())
        );

        let mut out_of_range = others[..5].to_vec();
        out_of_range.push(26);
        assert_eq!(
            engine.eliminate_selected(&alice(), game_id, &out_of_range),
            Err(ValidationError::InvalidBoxIndex(26).into())
        );
        assert_eq!(engine.game(game_id).unwrap(), &game);

        engine
            .eliminate_selected(&alice(), game_id, &others[..6])
            .unwrap();
        let game = engine.game(game_id).unwrap();
        assert_eq!(game.eliminated_boxes, others[..6].to_vec());
        assert_eq!(game.state, GameState::OfferMade);

        let mut again = game.remaining_boxes[..4].to_vec();
        again.push(others[0]);
        assert_eq!(
            engine.eliminate_selected(&alice(), game_id, &again),
            Err(ValidationError::BoxAlreadyEliminated(others[0]).into())
        );
    }

    #[test]
    fn test_offer_recomputed_from_remaining_boxes() {
        let mut engine = funded_engine();
        let game_id = engine.start_game(&alice(), FEE, 0).unwrap();
        engine.eliminate(&alice(), game_id, 0).unwrap();

        let game = engine.game(game_id).unwrap();
        let values: Vec<Amount> = game
            .remaining_boxes
            .iter()
            .map(|&b| game.prize_pool[usize::from(b)])
            .collect();
        let expected = calculate_offer(&values, game.player_box_value().unwrap(), 75);
        assert_eq!(game.current_offer(), Some(expected));
        assert_eq!(game.rounds.len(), 1);
        assert!(game.rounds[0].randomness.is_some());
    }

    #[test]
    fn test_final_round_parks_until_house_funded() {
        let mut engine = GameEngine::new(settings(), Box::new(InstantOracle::new(4, 0)));
        let game_id = engine.start_game(&alice(), FEE, 0).unwrap();
        for _ in 0..5 {
            engine.eliminate(&alice(), game_id, 0).unwrap();
        }
        // Empty the house so the final payout cannot be covered
        let balance = engine.house_balance();
        let player_value = engine.game(game_id).unwrap().player_box_value().unwrap();
        engine.withdraw_house_funds(&house(), balance).unwrap();

        let request_id = engine.eliminate(&alice(), game_id, 0).unwrap();
        let game = engine.game(game_id).unwrap();
        assert_eq!(game.pending_request, Some(request_id));
        assert_eq!(game.current_round, 5);
        assert_eq!(engine.stats().fulfillments_deferred, 1);

        engine.deposit_house_funds(&house(), player_value).unwrap();
        let game = engine.game(game_id).unwrap();
        assert_eq!(game.state, GameState::GameCompleted);
        assert_eq!(game.payout, Some(player_value));
        assert_eq!(engine.house_balance(), 0);
        assert_eq!(engine.pending_requests(), 0);
    }

    #[test]
    fn test_fulfillment_requires_operator_on_callback_path() {
        let mut engine = GameEngine::new(settings(), Box::new(VrfOracle::new_random(0)));
        let game_id = engine.start_game(&alice(), FEE, 0).unwrap();
        let request_id = engine.game(game_id).unwrap().pending_request.unwrap();
        let delivery = Fulfillment::new(request_id, Randomness([2; 32]));

        assert_eq!(
            engine.fulfill_as(&alice(), delivery.clone()),
            Err(AuthorizationError::NotOracleOperator.into())
        );
        engine
            .fulfill_as(&PlayerId::from("oracle"), delivery)
            .unwrap();
        assert!(engine.game(game_id).unwrap().player_box.is_some());
    }

    #[test]
    fn test_snapshot_restore_resumes_pending_requests() {
        let mut engine = GameEngine::new(settings(), Box::new(VrfOracle::new_random(0)));
        let game_id = engine.start_game(&alice(), FEE, 0).unwrap();
        let snapshot = engine.snapshot();

        let mut restored =
            GameEngine::from_snapshot(settings(), Box::new(VrfOracle::new_random(0)), snapshot);
        assert_eq!(restored.pending_requests(), 1);
        assert_eq!(restored.poll_oracle(), 1);
        assert!(restored.game(game_id).unwrap().player_box.is_some());
    }

    #[test]
    fn test_restore_never_reissues_consumed_request_ids() {
        let mut engine = GameEngine::new(settings(), Box::new(VrfOracle::new_random(0)));
        let first = engine.start_game(&alice(), FEE, 0).unwrap();
        let consumed = engine.game(first).unwrap().pending_request.unwrap();
        assert_eq!(engine.poll_oracle(), 1);
        assert_eq!(engine.pending_requests(), 0);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.next_request_id, consumed + 1);
        let mut restored =
            GameEngine::from_snapshot(settings(), Box::new(VrfOracle::new_random(0)), snapshot);
        let second = restored.start_game(&PlayerId::from("bob"), FEE, 0).unwrap();
        let fresh = restored.game(second).unwrap().pending_request.unwrap();
        assert!(fresh > consumed);

        // A late copy of the old delivery cannot land on the new request
        assert_eq!(
            restored.fulfill(Fulfillment::new(consumed, Randomness([5; 32]))),
            Err(OracleError::UnknownRequest(consumed).into())
        );
        assert!(restored.game(second).unwrap().player_box.is_none());
    }

    #[test]
    fn test_callback_proof_must_match_oracle_and_request() {
        const SECRET: [u8; 32] = [7; 32];
        let oracle = || VrfOracle::from_secret(&SECRET, 0).unwrap();
        let operator = PlayerId::from("oracle");
        let mut engine = GameEngine::new(settings(), Box::new(oracle()));
        let game_id = engine.start_game(&alice(), FEE, 0).unwrap();
        let request_id = engine.game(game_id).unwrap().pending_request.unwrap();
        let seed = engine.pending_request(request_id).unwrap().seed;

        // Signed by somebody else
        let foreign = VrfOracle::new_random(0).prove(request_id, &seed);
        assert!(matches!(
            engine.fulfill_as(&operator, foreign),
            Err(DealError::Validation(ValidationError::InvalidProof(_)))
        ));

        // Right key, wrong request input
        let other_seed = RequestSeed::derive(99, RequestPurpose::EliminateRound, 3, 0);
        let misbound = oracle().prove(request_id, &other_seed);
        assert!(matches!(
            engine.fulfill_as(&operator, misbound),
            Err(DealError::Validation(ValidationError::InvalidProof(_)))
        ));

        // Valid proof, but for different randomness than delivered
        let mut swapped = oracle().prove(request_id, &seed);
        swapped.randomness = Randomness([0; 32]);
        assert!(matches!(
            engine.fulfill_as(&operator, swapped),
            Err(DealError::Validation(ValidationError::InvalidProof(_)))
        ));
        assert!(engine.game(game_id).unwrap().player_box.is_none());
        assert_eq!(engine.pending_requests(), 1);

        engine
            .fulfill_as(&operator, oracle().prove(request_id, &seed))
            .unwrap();
        assert!(engine.game(game_id).unwrap().player_box.is_some());
    }

    #[test]
    fn test_proof_for_consumed_request_is_rejected() {
        let mut engine = funded_engine();
        let game_id = engine.start_game(&alice(), FEE, 0).unwrap();
        let request_id = engine.eliminate(&alice(), game_id, 0).unwrap();
        let seed = RequestSeed::derive(game_id, RequestPurpose::EliminateRound, 1, 0);

        // Instant backend already consumed the request
        let delivery = VrfOracle::new_random(0).prove(request_id, &seed);
        assert_eq!(
            engine.fulfill_as(&PlayerId::from("oracle"), delivery),
            Err(OracleError::UnknownRequest(request_id).into())
        );
    }

    #[test]
    fn test_take_changes_reports_only_touched_records() {
        let mut engine = funded_engine();
        let changes = engine.take_changes().unwrap();
        assert!(changes.games.is_empty());
        assert!(changes.ledger.is_some());
        assert!(engine.take_changes().is_none());

        let a = engine.start_game(&alice(), FEE, 0).unwrap();
        let b = engine.start_game(&PlayerId::from("bob"), FEE, 0).unwrap();
        engine.take_changes().unwrap();

        engine.eliminate(&alice(), a, 0).unwrap();
        engine.accept_deal(&alice(), a).unwrap();
        let changes = engine.take_changes().unwrap();
        assert_eq!(changes.games.len(), 1);
        assert_eq!(changes.games[0].game_id, a);
        assert_eq!(changes.games[0].state, GameState::DealTaken);
        assert_ne!(changes.games[0].game_id, b);
        // Instant requests are consumed in the same operation
        assert_eq!(changes.pending.len(), 1);
        assert!(changes.pending[0].1.is_none());
        assert_eq!(changes.settlements.len(), 1);
        assert_eq!(changes.settlements[0].0, 0);
        assert_eq!(changes.meta.stats.deals_accepted, 1);

        // A rejected delivery still changes the counters
        assert!(engine.fulfill(Fulfillment::new(999, Randomness([1; 32]))).is_err());
        let changes = engine.take_changes().unwrap();
        assert!(changes.games.is_empty());
        assert_eq!(changes.meta.stats.fulfillments_rejected, 1);
    }

    #[test]
    fn test_events_drained() {
        let mut engine = funded_engine();
        engine.drain_events();
        engine.start_game(&alice(), FEE, 0).unwrap();
        let events = engine.drain_events();
        assert!(matches!(events[0], GameEvent::GameStarted { .. }));
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::PlayerBoxAssigned { .. })));
        assert!(engine.drain_events().is_empty());
    }
}
