pub mod engine;
pub mod ledger;
pub mod offer;
pub mod oracles;
pub mod pending_requests;
pub mod prize_pool;
pub mod randomness;
pub mod types;

pub use engine::{EngineChanges, EngineMeta, EngineSnapshot, GameEngine, GameSettings};
pub use ledger::{AllowanceBook, HouseLedger};
pub use offer::calculate_offer;
pub use oracles::{build_oracle, InstantOracle, VrfOracle};
pub use pending_requests::{PendingRequest, PendingRequests};
pub use prize_pool::{generate_prize_pool, PrizeLadder};
pub use randomness::{Fulfillment, OracleTicket, Randomness, RandomnessOracle, RequestSeed};
pub use types::*;
