//! Error types for the deal-or-no-deal game engine
//!
//! Every failure is local and recoverable by the caller. Errors are grouped by
//! class so callers (and the HTTP layer) can decide whether to retry, top up
//! funds or give up.

use crate::games::types::{Amount, BoxIndex, GameId, GameState, RequestId};
use thiserror::Error;

/// Root error type for all engine operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DealError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Input rejected before any state was touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Entry fee must be greater than zero")]
    ZeroEntryFee,

    #[error("Entry fee must be exactly {expected}, got {actual}")]
    EntryFeeMismatch { expected: Amount, actual: Amount },

    #[error("Entry fee {actual} is below the minimum of {minimum}")]
    EntryFeeTooLow { minimum: Amount, actual: Amount },

    #[error("Entry fee {0} exceeds the supported maximum")]
    EntryFeeTooHigh(Amount),

    #[error("Oracle fee of {required} required, {provided} provided")]
    InsufficientOracleFee { required: Amount, provided: Amount },

    #[error("Allowance of {available} does not cover {required}")]
    InsufficientAllowance { required: Amount, available: Amount },

    #[error("Round requires exactly {expected} boxes, got {actual}")]
    WrongBatchSize { expected: usize, actual: usize },

    #[error("Box {0} already eliminated")]
    BoxAlreadyEliminated(BoxIndex),

    #[error("Box {0} is the player's box")]
    PlayerBoxSelected(BoxIndex),

    #[error("Box {0} selected more than once")]
    DuplicateBox(BoxIndex),

    #[error("Invalid box index {0}")]
    InvalidBoxIndex(BoxIndex),

    #[error("Game {0} not found")]
    GameNotFound(GameId),

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Withdrawal of {requested} exceeds the house balance of {available}")]
    WithdrawExceedsBalance { requested: Amount, available: Amount },

    #[error("Invalid VRF proof: {0}")]
    InvalidProof(String),
}

/// Caller is not allowed to perform the operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("Not your game (game {game_id})")]
    NotYourGame { game_id: GameId },

    #[error("Caller is not the house owner")]
    NotOwner,

    #[error("Caller is not the oracle operator")]
    NotOracleOperator,
}

/// Operation is not valid for the game's current state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Invalid game state: game {game_id} is {state}")]
    InvalidGameState { game_id: GameId, state: GameState },

    #[error("No standing offer for game {0}")]
    NoStandingOffer(GameId),

    #[error("Game {game_id} is waiting on randomness request {request_id}")]
    RequestPending { game_id: GameId, request_id: RequestId },

    #[error("Player box for game {0} has not been assigned yet")]
    PlayerBoxUnassigned(GameId),
}

/// Shared resources cannot cover the operation; safe to retry later
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("House insufficient funds: {required} required, {available} available")]
    HouseInsufficientFunds { required: Amount, available: Amount },
}

/// Randomness delivery problems
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("Unknown or already consumed randomness request {0}")]
    UnknownRequest(RequestId),
}

/// Configuration and validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue { field: String, value: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Snapshot persistence errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

impl DealError {
    /// Only resource shortfalls clear up on their own (after a top-up)
    pub fn is_retryable(&self) -> bool {
        matches!(self, DealError::Resource(_))
    }

    /// Stable machine-readable code for the error class
    pub fn code(&self) -> &'static str {
        match self {
            DealError::Validation(ValidationError::GameNotFound(_)) => "NOT_FOUND",
            DealError::Validation(_) => "VALIDATION_ERROR",
            DealError::Authorization(_) => "UNAUTHORIZED",
            DealError::State(_) => "INVALID_STATE",
            DealError::Resource(_) => "INSUFFICIENT_FUNDS",
            DealError::Oracle(_) => "ORACLE_ERROR",
            DealError::Configuration(_) => "CONFIGURATION_ERROR",
            DealError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

// Convenience type alias for Results
pub type DealResult<T> = Result<T, DealError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = DealError::from(AuthorizationError::NotYourGame { game_id: 7 });
        assert!(err.to_string().contains("Authorization error"));
        assert!(err.to_string().contains("Not your game"));
    }

    #[test]
    fn test_resource_error_details() {
        let err = ResourceError::HouseInsufficientFunds {
            required: 500,
            available: 20,
        };
        assert!(err.to_string().contains("500 required"));
        assert!(err.to_string().contains("20 available"));
    }

    #[test]
    fn test_only_resource_errors_are_retryable() {
        let funds: DealError = ResourceError::HouseInsufficientFunds {
            required: 1,
            available: 0,
        }
        .into();
        assert!(funds.is_retryable());

        let state: DealError = StateError::NoStandingOffer(1).into();
        assert!(!state.is_retryable());
        assert!(!DealError::from(OracleError::UnknownRequest(3)).is_retryable());
    }

    #[test]
    fn test_error_source() {
        let err = DealError::from(ValidationError::ZeroEntryFee);
        assert!(err.source().is_some());
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(
            DealError::from(ValidationError::GameNotFound(9)).code(),
            "NOT_FOUND"
        );
    }
}
