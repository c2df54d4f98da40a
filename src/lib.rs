//! Deal or No Deal game engine
//!
//! A fixed 26-box prize table per game, an elimination schedule of
//! 6-5-4-3-2-1 boxes, banker offers derived from the expected value of the
//! boxes still in play, and a single house balance that backs every payout.
//! Box draws come from a pluggable randomness oracle that may answer
//! immediately or later.

pub mod api;
pub mod config;
pub mod errors;
pub mod feed;
pub mod fulfillment;
pub mod games;
pub mod storage;
pub mod store;

pub use config::{ConfigLoader, DealConfig};
pub use errors::{DealError, DealResult};
pub use games::{GameEngine, GameSettings};
