use crate::games::randomness::{Fulfillment, RequestSeed};
use crate::games::types::{GameId, RequestId, RequestPurpose};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outstanding randomness request waiting for its fulfillment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub game_id: GameId,
    pub purpose: RequestPurpose,
    pub seed: RequestSeed,
    pub submitted_at: u64,
    /// Delivered value that could not be applied yet (house short of funds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parked: Option<Fulfillment>,
}

/// Sequence number -> (game, purpose), each entry consumed exactly once
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequests {
    pending: BTreeMap<RequestId, PendingRequest>,
}

impl PendingRequests {
    /// Create a new pending request table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request; returns false if the id is already outstanding
    pub fn add_pending(&mut self, request_id: RequestId, request: PendingRequest) -> bool {
        if self.pending.contains_key(&request_id) {
            return false;
        }
        self.pending.insert(request_id, request);
        true
    }

    pub fn get(&self, request_id: RequestId) -> Option<&PendingRequest> {
        self.pending.get(&request_id)
    }

    /// Consume a request once its fulfillment has been applied
    pub fn complete(&mut self, request_id: RequestId) -> Option<PendingRequest> {
        self.pending.remove(&request_id)
    }

    /// Keep a delivered value for a later retry
    pub fn park(&mut self, fulfillment: Fulfillment) -> bool {
        match self.pending.get_mut(&fulfillment.request_id) {
            Some(request) => {
                request.parked = Some(fulfillment);
                true
            }
            None => false,
        }
    }

    /// Parked fulfillments, oldest request first
    pub fn parked(&self) -> Vec<Fulfillment> {
        self.pending
            .values()
            .filter_map(|request| request.parked.clone())
            .collect()
    }

    /// Get number of pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a request is pending
    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RequestId, &PendingRequest)> {
        self.pending.iter()
    }
}
