//! Prize table generation
//!
//! Box values are a fixed multiplier ladder applied to the entry fee.
//! Multipliers are expressed in units of 1/10,000 so the smallest box can
//! hold a ten-thousandth of the fee without floating point.

use crate::games::types::{Amount, TOTAL_BOXES};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Multiplier denominator: a multiplier of 10,000 returns the entry fee
pub const MULTIPLIER_SCALE: Amount = 10_000;

/// 1/10,000x up to 10x
const STANDARD_MULTIPLIERS: [u64; TOTAL_BOXES] = [
    1, 10, 50, 100, 250, 500, 750, 1_000, 2_000, 3_000, 4_000, 5_000, 7_500, 10_000, 12_500,
    15_000, 20_000, 25_000, 30_000, 40_000, 50_000, 60_000, 70_000, 80_000, 90_000, 100_000,
];

/// 1/10,000x up to 1000x
const HIGH_STAKES_MULTIPLIERS: [u64; TOTAL_BOXES] = [
    1, 10, 50, 100, 250, 500, 750, 1_000, 2_000, 3_000, 4_000, 5_000, 7_500, 10_000, 50_000,
    100_000, 250_000, 500_000, 750_000, 1_000_000, 2_000_000, 3_000_000, 4_000_000, 5_000_000,
    7_500_000, 10_000_000,
];

/// Largest entry fee accepted; keeps `fee * multiplier` well inside u128
pub const MAX_ENTRY_FEE: Amount = u64::MAX as Amount;

/// Deployment-wide choice of multiplier ladder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrizeLadder {
    #[default]
    Standard,
    HighStakes,
}

impl PrizeLadder {
    pub fn multipliers(self) -> &'static [u64; TOTAL_BOXES] {
        match self {
            PrizeLadder::Standard => &STANDARD_MULTIPLIERS,
            PrizeLadder::HighStakes => &HIGH_STAKES_MULTIPLIERS,
        }
    }

    /// Build the 26 box values for an entry fee
    pub fn generate(self, entry_fee: Amount) -> Vec<Amount> {
        generate_prize_pool(entry_fee, self.multipliers())
    }
}

impl fmt::Display for PrizeLadder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrizeLadder::Standard => write!(f, "standard"),
            PrizeLadder::HighStakes => write!(f, "high_stakes"),
        }
    }
}

/// Apply a multiplier ladder to an entry fee, truncating toward zero.
///
/// Callers cap the fee at [`MAX_ENTRY_FEE`]; above that the product saturates.
pub fn generate_prize_pool(entry_fee: Amount, multipliers: &[u64; TOTAL_BOXES]) -> Vec<Amount> {
    multipliers
        .iter()
        .map(|&m| entry_fee.saturating_mul(Amount::from(m)) / MULTIPLIER_SCALE)
        .collect()
}
