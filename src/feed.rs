//! Live fan-out of engine events.
//!
//! Whoever drains the engine (an HTTP handler or the fulfillment worker)
//! publishes here, so events produced in the background reach subscribers
//! instead of the next unrelated caller.

use crate::games::{GameEvent, GameId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::broadcast;
use tracing::debug;

const FEED_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventFeed {
    tx: broadcast::Sender<GameEvent>,
    published: Arc<AtomicU64>,
}

impl EventFeed {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(FEED_CAPACITY);
        Self {
            tx,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publish(&self, events: Vec<GameEvent>) {
        for event in events {
            self.published.fetch_add(1, Ordering::Relaxed);
            if self.tx.send(event).is_err() {
                debug!("No feed subscribers for engine event");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.tx.subscribe()
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Events published since start, delivered or not
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Game an event belongs to; engine-wide events return `None`
pub fn event_game(event: &GameEvent) -> Option<GameId> {
    match event {
        GameEvent::GameStarted { game_id, .. }
        | GameEvent::PlayerBoxAssigned { game_id, .. }
        | GameEvent::RandomnessRequested { game_id, .. }
        | GameEvent::OfferDeclined { game_id, .. }
        | GameEvent::RoundCompleted { game_id, .. }
        | GameEvent::DealAccepted { game_id, .. }
        | GameEvent::GameCompleted { game_id, .. }
        | GameEvent::FulfillmentDeferred { game_id, .. } => Some(*game_id),
        GameEvent::FulfillmentRejected { .. }
        | GameEvent::HouseFundsDeposited { .. }
        | GameEvent::HouseFundsWithdrawn { .. } => None,
    }
}
