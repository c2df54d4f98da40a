use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in base units of the deposit currency
pub type Amount = u128;

/// Dense, monotonically increasing game identifier
pub type GameId = u64;

/// Oracle-issued sequence number correlating a request with its fulfillment
pub type RequestId = u64;

/// Index into the 26-slot prize table
pub type BoxIndex = u8;

/// Number of boxes in every game
pub const TOTAL_BOXES: usize = 26;

/// Boxes opened per round; after the last round the game resolves itself
pub const ROUND_ELIMINATIONS: [usize; 6] = [6, 5, 4, 3, 2, 1];

/// Number of scheduled elimination rounds
pub const TOTAL_ROUNDS: u8 = ROUND_ELIMINATIONS.len() as u8;

/// Boxes scheduled for the given 1-based round (0 once the schedule is exhausted)
pub fn scheduled_eliminations(round: u8) -> usize {
    match round {
        1..=TOTAL_ROUNDS => ROUND_ELIMINATIONS[usize::from(round) - 1],
        _ => 0,
    }
}

/// Total boxes eliminated once `round` rounds are complete
pub fn eliminated_through(round: u8) -> usize {
    let rounds = usize::from(round).min(ROUND_ELIMINATIONS.len());
    ROUND_ELIMINATIONS[..rounds].iter().sum()
}

/// Player identity as supplied by the (external) identity layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Game lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Playing,
    OfferMade,
    DealTaken,
    GameCompleted,
}

impl GameState {
    /// States from which another elimination round may be requested
    pub fn can_eliminate(self) -> bool {
        matches!(self, GameState::Playing | GameState::OfferMade)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, GameState::DealTaken | GameState::GameCompleted)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameState::Playing => write!(f, "playing"),
            GameState::OfferMade => write!(f, "offer_made"),
            GameState::DealTaken => write!(f, "deal_taken"),
            GameState::GameCompleted => write!(f, "game_completed"),
        }
    }
}

/// Why a randomness request was made
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestPurpose {
    AssignPlayerBox,
    EliminateRound,
}

impl fmt::Display for RequestPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestPurpose::AssignPlayerBox => write!(f, "assign_player_box"),
            RequestPurpose::EliminateRound => write!(f, "eliminate_round"),
        }
    }
}

/// Deposit currency of the deployment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Denomination {
    /// Entry fees and payouts move in the chain's native currency
    Native,
    /// Entry fees are pulled from a pre-authorized fungible-token allowance
    Token { symbol: String },
}

impl Denomination {
    pub fn requires_allowance(&self) -> bool {
        matches!(self, Denomination::Token { .. })
    }
}

/// VRF bundle containing cryptographic proof
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VrfBundle {
    /// Hex-encoded VRF output (32 bytes)
    pub output: String,
    /// Hex-encoded VRF proof (64-byte schnorrkel signature)
    pub proof: String,
    /// Hex-encoded public key (32 bytes)
    pub public_key: String,
    /// Input message used for VRF
    pub input: String,
}

/// Outcome of one elimination round, kept for auditing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundRecord {
    pub round: u8,
    pub eliminated: Vec<BoxIndex>,
    /// Offer made after the round; `None` for the final round
    pub offer: Option<Amount>,
    /// Hex-encoded randomness used, `None` when the player picked the boxes
    pub randomness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<VrfBundle>,
}

/// One play session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Game {
    pub game_id: GameId,
    pub player: PlayerId,
    pub entry_fee: Amount,
    /// Prize table generated at start; constant for the game's lifetime
    pub prize_pool: Vec<Amount>,
    /// Hidden box, assigned once by the first randomness fulfillment
    pub player_box: Option<BoxIndex>,
    pub state: GameState,
    pub current_round: u8,
    pub eliminated_boxes: Vec<BoxIndex>,
    pub remaining_boxes: Vec<BoxIndex>,
    /// Standing banker offer; only meaningful while `state == OfferMade`
    pub last_offer: Option<Amount>,
    /// Amount paid out once the game is over
    pub payout: Option<Amount>,
    pub is_active: bool,
    pub pending_request: Option<RequestId>,
    pub rounds: Vec<RoundRecord>,
    pub created_at: u64,
}

impl Game {
    pub(crate) fn new(
        game_id: GameId,
        player: PlayerId,
        entry_fee: Amount,
        prize_pool: Vec<Amount>,
        created_at: u64,
    ) -> Self {
        Self {
            game_id,
            player,
            entry_fee,
            prize_pool,
            player_box: None,
            state: GameState::Playing,
            current_round: 0,
            eliminated_boxes: Vec::new(),
            remaining_boxes: (0..TOTAL_BOXES as BoxIndex).collect(),
            last_offer: None,
            payout: None,
            is_active: true,
            pending_request: None,
            rounds: Vec::new(),
            created_at,
        }
    }

    /// Current banker offer, if one is standing
    pub fn current_offer(&self) -> Option<Amount> {
        match self.state {
            GameState::OfferMade => self.last_offer,
            _ => None,
        }
    }

    /// Value hidden in the player's box, once assigned
    pub fn player_box_value(&self) -> Option<Amount> {
        self.player_box
            .and_then(|index| self.prize_pool.get(usize::from(index)).copied())
    }

    /// Boxes the next round will open
    pub fn next_batch_size(&self) -> usize {
        scheduled_eliminations(self.current_round + 1).min(self.remaining_boxes.len())
    }

    /// Every index is in exactly one of eliminated, remaining or the player's box
    pub fn boxes_partitioned(&self) -> bool {
        let mut seen = [false; TOTAL_BOXES];
        let all = self
            .eliminated_boxes
            .iter()
            .chain(self.remaining_boxes.iter())
            .chain(self.player_box.iter());
        let mut count = 0;
        for &index in all {
            let slot = usize::from(index);
            if slot >= TOTAL_BOXES || seen[slot] {
                return false;
            }
            seen[slot] = true;
            count += 1;
        }
        count == TOTAL_BOXES
    }
}

/// Why a settlement was paid
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    DealAccepted,
    GameCompleted,
}

/// Payout record handed to the value-transfer layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settlement {
    pub game_id: GameId,
    pub player: PlayerId,
    pub amount: Amount,
    pub kind: SettlementKind,
    pub settled_at: u64,
}

/// Events emitted by the engine, drained by callers after each operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    GameStarted {
        game_id: GameId,
        player: PlayerId,
        entry_fee: Amount,
    },
    PlayerBoxAssigned {
        game_id: GameId,
        player: PlayerId,
        player_box: BoxIndex,
    },
    RandomnessRequested {
        game_id: GameId,
        request_id: RequestId,
        purpose: RequestPurpose,
        fee: Amount,
    },
    OfferDeclined {
        game_id: GameId,
        offer: Amount,
    },
    RoundCompleted {
        game_id: GameId,
        round: u8,
        eliminated: Vec<BoxIndex>,
        offer: Option<Amount>,
    },
    DealAccepted {
        game_id: GameId,
        player: PlayerId,
        payout: Amount,
    },
    GameCompleted {
        game_id: GameId,
        player: PlayerId,
        payout: Amount,
    },
    FulfillmentDeferred {
        game_id: GameId,
        request_id: RequestId,
        required: Amount,
        available: Amount,
    },
    FulfillmentRejected {
        request_id: RequestId,
        reason: String,
    },
    HouseFundsDeposited {
        amount: Amount,
        balance: Amount,
    },
    HouseFundsWithdrawn {
        amount: Amount,
        balance: Amount,
    },
}

/// Counters for monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStats {
    pub games_started: u64,
    pub rounds_completed: u64,
    pub deals_accepted: u64,
    pub games_completed: u64,
    pub fulfillments_applied: u64,
    pub fulfillments_rejected: u64,
    pub fulfillments_deferred: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_prefix_sums() {
        assert_eq!(eliminated_through(0), 0);
        assert_eq!(eliminated_through(1), 6);
        assert_eq!(eliminated_through(2), 11);
        assert_eq!(eliminated_through(6), 21);
        assert_eq!(eliminated_through(9), 21);
        assert_eq!(scheduled_eliminations(0), 0);
        assert_eq!(scheduled_eliminations(3), 4);
        assert_eq!(scheduled_eliminations(7), 0);
    }

    #[test]
    fn test_new_game_holds_every_box() {
        let game = Game::new(0, PlayerId::from("alice"), 100, vec![1; TOTAL_BOXES], 0);
        assert_eq!(game.remaining_boxes.len(), TOTAL_BOXES);
        assert!(game.boxes_partitioned());
        assert_eq!(game.current_offer(), None);
        assert_eq!(game.next_batch_size(), 6);
    }

    #[test]
    fn test_partition_detects_overlap() {
        let mut game = Game::new(0, PlayerId::from("alice"), 100, vec![1; TOTAL_BOXES], 0);
        game.player_box = Some(3);
        assert!(!game.boxes_partitioned());
        game.remaining_boxes.retain(|&b| b != 3);
        assert!(game.boxes_partitioned());
    }

    #[test]
    fn test_state_display_matches_serde() {
        let json = serde_json::to_string(&GameState::OfferMade).unwrap();
        assert_eq!(json, format!("\"{}\"", GameState::OfferMade));
    }
}
