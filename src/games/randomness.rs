//! Randomness gateway contract
//!
//! The engine only talks to [`RandomnessOracle`]. A backend may answer a
//! request on the spot (synchronous) or hand the answer back later through
//! [`RandomnessOracle::drain_ready`] or an external callback. Either way the
//! engine applies the answer through the same fulfillment path.

use crate::errors::DealResult;
use crate::games::types::{Amount, BoxIndex, GameId, RequestId, RequestPurpose, VrfBundle, TOTAL_BOXES};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 32 bytes of oracle entropy
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Randomness(pub [u8; 32]);

impl Randomness {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, String> {
        let bytes = hex::decode(value).map_err(|e| format!("Invalid randomness hex: {}", e))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "Randomness must be 32 bytes".to_string())?;
        Ok(Self(array))
    }

    /// Deterministic generator keyed by this value
    pub fn rng(&self) -> ChaCha20Rng {
        ChaCha20Rng::from_seed(self.0)
    }
}

impl fmt::Debug for Randomness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Randomness({})", self.to_hex())
    }
}

/// Seed handed to the oracle for a request
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSeed(pub [u8; 32]);

impl RequestSeed {
    /// Bind a request to its game, purpose and round so no two requests share a seed
    pub fn derive(game_id: GameId, purpose: RequestPurpose, round: u8, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(game_id.to_be_bytes());
        hasher.update(purpose.to_string().as_bytes());
        hasher.update([round]);
        hasher.update(nonce.to_be_bytes());
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for RequestSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestSeed({})", self.to_hex())
    }
}

/// One delivery from the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub request_id: RequestId,
    pub randomness: Randomness,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<VrfBundle>,
}

impl Fulfillment {
    pub fn new(request_id: RequestId, randomness: Randomness) -> Self {
        Self {
            request_id,
            randomness,
            proof: None,
        }
    }
}

/// Answer to a request submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleTicket {
    /// Backend already produced the value; apply it now
    Immediate(Fulfillment),
    /// Value will arrive later under this sequence number
    Deferred(RequestId),
}

impl OracleTicket {
    pub fn request_id(&self) -> RequestId {
        match self {
            OracleTicket::Immediate(f) => f.request_id,
            OracleTicket::Deferred(id) => *id,
        }
    }
}

/// Pluggable randomness source
pub trait RandomnessOracle: Send {
    /// Backend name for logs and status
    fn name(&self) -> &'static str;

    /// Fee quoted per request
    fn fee(&self) -> Amount;

    /// Submit a request. Must not have side effects if it fails.
    fn request(&mut self, seed: RequestSeed) -> DealResult<OracleTicket>;

    /// Fulfillments produced since the last call (deferred backends only)
    fn drain_ready(&mut self) -> Vec<Fulfillment> {
        Vec::new()
    }

    /// Re-register an outstanding request after a restart
    fn resume(&mut self, _request_id: RequestId, _seed: RequestSeed) {}

    /// Never issue a sequence number below `next` again. Called on restore so
    /// ids consumed before a restart stay consumed.
    fn resume_sequence(&mut self, _next: RequestId) {}

    /// Hex public key that signs this backend's proofs, if it produces any
    fn public_key(&self) -> Option<String> {
        None
    }
}

/// Draw the player's hidden box
pub fn pick_player_box(randomness: &Randomness) -> BoxIndex {
    randomness.rng().gen_range(0..TOTAL_BOXES) as BoxIndex
}

/// Draw `count` boxes out of `remaining` without replacement, in draw order
pub fn pick_eliminations(
    randomness: &Randomness,
    remaining: &[BoxIndex],
    count: usize,
) -> Vec<BoxIndex> {
    let mut pool = remaining.to_vec();
    let mut rng = randomness.rng();
    let count = count.min(pool.len());
    let mut picked = Vec::with_capacity(count);
    for _ in 0..count {
        let slot = rng.gen_range(0..pool.len());
        picked.push(pool.remove(slot));
    }
    picked
}
