//! Background delivery of deferred randomness.
//!
//! Deferred oracle backends queue requests; nothing happens to the waiting
//! games until someone drains the queue. This worker does that on a fixed
//! tick so games progress even if no HTTP request arrives. Every pass drains
//! the engine's events onto the feed and queues whatever records changed.

use crate::{feed::EventFeed, games::GameEngine, store::StoreWriter};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;

/// Engine shared between the HTTP layer and the worker
pub type SharedEngine = Arc<Mutex<GameEngine>>;

pub struct FulfillmentWorker {
    engine: SharedEngine,
    writer: Option<StoreWriter>,
    feed: EventFeed,
    interval: Duration,
    running: Arc<AtomicBool>,
    delivered: AtomicU64,
}

impl FulfillmentWorker {
    pub fn spawn(
        engine: SharedEngine,
        writer: Option<StoreWriter>,
        feed: EventFeed,
        interval: Duration,
    ) -> Arc<Self> {
        let worker = Arc::new(Self {
            engine,
            writer,
            feed,
            interval: interval.max(Duration::from_millis(1)),
            running: Arc::new(AtomicBool::new(true)),
            delivered: AtomicU64::new(0),
        });

        worker.clone().spawn_task();
        worker
    }

    fn spawn_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            while self.running.load(Ordering::SeqCst) {
                tick.tick().await;
                self.run_once().await;
            }
            tracing::debug!("Fulfillment worker stopped");
        });
    }

    /// Drain the oracle once; returns how many fulfillments were applied.
    ///
    /// Rejections and deferrals change state without applying anything, so
    /// events and changed records are flushed on every pass.
    pub async fn run_once(&self) -> usize {
        let mut engine = self.engine.lock().await;
        let applied = engine.poll_oracle();
        let events = engine.drain_events();
        if let Some(writer) = &self.writer {
            writer.persist(&mut engine);
        }
        drop(engine);

        if applied > 0 {
            self.delivered.fetch_add(applied as u64, Ordering::SeqCst);
            tracing::debug!(applied, "Oracle fulfillments delivered");
        }
        if !events.is_empty() {
            self.feed.publish(events);
        }
        applied
    }

    /// Total fulfillments this worker has applied
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
