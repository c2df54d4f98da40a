//! Randomness oracle backends
//!
//! `InstantOracle` answers every request immediately from a local
//! deterministic source. `VrfOracle` queues requests and answers them later
//! with a schnorrkel signature whose hash is the random value, so every draw
//! can be checked against the oracle's public key.

use crate::config::{OracleBackend, OracleConfig};
use crate::errors::{ConfigurationError, DealResult};
use crate::games::randomness::{Fulfillment, OracleTicket, Randomness, RandomnessOracle, RequestSeed};
use crate::games::types::{Amount, RequestId, VrfBundle};
use schnorrkel::{context::SigningContext, ExpansionMode, Keypair, MiniSecretKey, PublicKey, Signature};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

const VRF_SIGNING_CONTEXT: &[u8] = b"dealornot";

/// Synchronous local source: fulfills inside `request`
pub struct InstantOracle {
    entropy: [u8; 32],
    fee: Amount,
    next_request_id: RequestId,
}

impl InstantOracle {
    pub fn new(seed: u64, fee: Amount) -> Self {
        let entropy: [u8; 32] = Sha256::digest(seed.to_be_bytes()).into();
        Self {
            entropy,
            fee,
            next_request_id: 1,
        }
    }

    fn derive(&self, request_id: RequestId, seed: &RequestSeed) -> Randomness {
        let mut hasher = Sha256::new();
        hasher.update(self.entropy);
        hasher.update(request_id.to_be_bytes());
        hasher.update(seed.0);
        Randomness(hasher.finalize().into())
    }
}

impl RandomnessOracle for InstantOracle {
    fn name(&self) -> &'static str {
        "instant"
    }

    fn fee(&self) -> Amount {
        self.fee
    }

    fn request(&mut self, seed: RequestSeed) -> DealResult<OracleTicket> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let randomness = self.derive(request_id, &seed);
        debug!(request_id, "Instant oracle fulfilled request");
        Ok(OracleTicket::Immediate(Fulfillment::new(request_id, randomness)))
    }

    fn resume(&mut self, request_id: RequestId, _seed: RequestSeed) {
        self.next_request_id = self.next_request_id.max(request_id + 1);
    }

    fn resume_sequence(&mut self, next: RequestId) {
        self.next_request_id = self.next_request_id.max(next);
    }
}

/// Asynchronous VRF-backed source: fulfills when drained
pub struct VrfOracle {
    keypair: Arc<Keypair>,
    fee: Amount,
    next_request_id: RequestId,
    queue: VecDeque<(RequestId, RequestSeed)>,
}

impl VrfOracle {
    /// Create a new VRF oracle with a keypair
    pub fn new(keypair: Keypair, fee: Amount) -> Self {
        Self {
            keypair: Arc::new(keypair),
            fee,
            next_request_id: 1,
            queue: VecDeque::new(),
        }
    }

    /// Create a new VRF oracle with a random keypair (for testing)
    pub fn new_random(fee: Amount) -> Self {
        use rand_core::OsRng;
        let keypair = Keypair::generate_with(OsRng);
        Self::new(keypair, fee)
    }

    /// Build from a 32-byte mini secret key
    pub fn from_secret(secret: &[u8; 32], fee: Amount) -> DealResult<Self> {
        let mini = MiniSecretKey::from_bytes(secret).map_err(|e| ConfigurationError::InvalidValue {
            field: "oracle.vrf_secret".to_string(),
            value: "<redacted>".to_string(),
            reason: format!("{:?}", e),
        })?;
        Ok(Self::new(mini.expand_to_keypair(ExpansionMode::Ed25519), fee))
    }

    /// Requests waiting for delivery
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Get the public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }

    /// Message a proof for this request must sign
    pub fn input_message(request_id: RequestId, seed: &RequestSeed) -> String {
        format!("{}:{}", request_id, seed.to_hex())
    }

    /// Sign the request input; the output is the hash of the signature
    pub fn prove(&self, request_id: RequestId, seed: &RequestSeed) -> Fulfillment {
        let input = Self::input_message(request_id, seed);
        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(input.as_bytes()));
        let signature_bytes = signature.to_bytes();
        let output: [u8; 32] = Sha256::digest(signature_bytes).into();

        Fulfillment {
            request_id,
            randomness: Randomness(output),
            proof: Some(VrfBundle {
                output: hex::encode(output),
                proof: hex::encode(signature_bytes),
                public_key: self.public_key_hex(),
                input,
            }),
        }
    }

    /// Verify a VRF proof (public verification function)
    pub fn verify(bundle: &VrfBundle) -> Result<bool, String> {
        let output = hex::decode(&bundle.output)
            .map_err(|e| format!("Invalid VRF output hex: {}", e))?;
        let proof = hex::decode(&bundle.proof)
            .map_err(|e| format!("Invalid VRF proof hex: {}", e))?;
        let public_key_bytes = hex::decode(&bundle.public_key)
            .map_err(|e| format!("Invalid public key hex: {}", e))?;

        let public_key = PublicKey::from_bytes(&public_key_bytes)
            .map_err(|e| format!("Invalid public key: {:?}", e))?;
        let signature =
            Signature::from_bytes(&proof).map_err(|e| format!("Invalid signature: {:?}", e))?;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        if public_key
            .verify(ctx.bytes(bundle.input.as_bytes()), &signature)
            .is_err()
        {
            return Ok(false);
        }

        let computed = Sha256::digest(&proof);
        Ok(computed.as_slice() == output.as_slice())
    }
}

impl RandomnessOracle for VrfOracle {
    fn name(&self) -> &'static str {
        "vrf"
    }

    fn fee(&self) -> Amount {
        self.fee
    }

    fn request(&mut self, seed: RequestSeed) -> DealResult<OracleTicket> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.queue.push_back((request_id, seed));
        debug!(request_id, queued = self.queue.len(), "VRF request queued");
        Ok(OracleTicket::Deferred(request_id))
    }

    fn drain_ready(&mut self) -> Vec<Fulfillment> {
        let queued: Vec<_> = self.queue.drain(..).collect();
        queued
            .iter()
            .map(|(request_id, seed)| self.prove(*request_id, seed))
            .collect()
    }

    fn resume(&mut self, request_id: RequestId, seed: RequestSeed) {
        self.next_request_id = self.next_request_id.max(request_id + 1);
        if !self.queue.iter().any(|(id, _)| *id == request_id) {
            self.queue.push_back((request_id, seed));
        }
    }

    fn resume_sequence(&mut self, next: RequestId) {
        self.next_request_id = self.next_request_id.max(next);
    }

    fn public_key(&self) -> Option<String> {
        Some(self.public_key_hex())
    }
}

/// Construct the backend named in the configuration
pub fn build_oracle(config: &OracleConfig) -> DealResult<Box<dyn RandomnessOracle>> {
    let fee = Amount::from(config.fee);
    match config.backend {
        OracleBackend::Instant => Ok(Box::new(InstantOracle::new(config.seed, fee))),
        OracleBackend::Vrf => {
            if config.vrf_secret.is_empty() {
                return Ok(Box::new(VrfOracle::new_random(fee)));
            }
            let bytes = hex::decode(&config.vrf_secret).map_err(|e| {
                ConfigurationError::InvalidValue {
                    field: "oracle.vrf_secret".to_string(),
                    value: "<redacted>".to_string(),
                    reason: e.to_string(),
                }
            })?;
            let secret: [u8; 32] = bytes.try_into().map_err(|_| ConfigurationError::InvalidValue {
                field: "oracle.vrf_secret".to_string(),
                value: "<redacted>".to_string(),
                reason: "must be 32 bytes".to_string(),
            })?;
            Ok(Box::new(VrfOracle::from_secret(&secret, fee)?))
        }
    }
}
