//! Engine records persisted in RocksDB.
//!
//! Each game, pending request and settlement is its own key, so a commit
//! only rewrites what an operation touched. Keys end in a big-endian id,
//! which makes a prefix scan return records in id order.

use crate::{
    errors::{DealResult, StorageError},
    games::{
        AllowanceBook, EngineChanges, EngineMeta, EngineSnapshot, Game, HouseLedger, PendingRequest,
        PendingRequests, PlayerId, Settlement,
    },
    storage::OptimizedStorage,
};
use rocksdb::WriteBatch;
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::BTreeMap, path::Path};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const GAME_PREFIX: &[u8] = b"game:";
const PENDING_PREFIX: &[u8] = b"pending:";
const SETTLEMENT_PREFIX: &[u8] = b"settlement:";
const LEDGER_KEY: &[u8] = b"engine:ledger";
const ALLOWANCES_KEY: &[u8] = b"engine:allowances";
const META_KEY: &[u8] = b"engine:meta";

fn record_key(prefix: &[u8], id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn encode<T: Serialize>(what: &str, value: &T) -> DealResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| StorageError::WriteFailed(format!("Failed to encode {}: {}", what, e)).into())
}

fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> DealResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::CorruptedData(format!("Failed to decode {}: {}", what, e)).into())
}

fn read_failed(e: rocksdb::Error) -> StorageError {
    StorageError::ReadFailed(e.to_string())
}

#[derive(Clone)]
pub struct GameStore {
    storage: OptimizedStorage,
}

impl GameStore {
    pub fn open<P: AsRef<Path>>(path: P) -> DealResult<Self> {
        let path = path.as_ref();
        let storage = OptimizedStorage::new(path)
            .map_err(|e| StorageError::ReadFailed(format!("{}: {}", path.display(), e)))?;
        Ok(Self { storage })
    }

    /// Write one operation's changed records in a single batch
    pub fn commit(&self, changes: &EngineChanges) -> DealResult<()> {
        let mut batch = WriteBatch::default();

        for game in &changes.games {
            batch.put(record_key(GAME_PREFIX, game.game_id), encode("game", game)?);
        }
        for (request_id, request) in &changes.pending {
            let key = record_key(PENDING_PREFIX, *request_id);
            match request {
                Some(request) => batch.put(key, encode("pending request", request)?),
                None => batch.delete(key),
            }
        }
        for (position, settlement) in &changes.settlements {
            batch.put(
                record_key(SETTLEMENT_PREFIX, *position),
                encode("settlement", settlement)?,
            );
        }
        if let Some(ledger) = &changes.ledger {
            batch.put(LEDGER_KEY, encode("ledger", ledger)?);
        }
        if let Some(allowances) = &changes.allowances {
            batch.put(ALLOWANCES_KEY, encode("allowances", allowances)?);
        }
        batch.put(META_KEY, encode("engine meta", &changes.meta)?);

        self.storage
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        debug!(
            games = changes.games.len(),
            pending = changes.pending.len(),
            settlements = changes.settlements.len(),
            "Engine changes committed"
        );
        Ok(())
    }

    /// Rebuild the engine state, or `None` when nothing has been stored yet
    pub fn load(&self, owner: &PlayerId) -> DealResult<Option<EngineSnapshot>> {
        let Some(meta) = self.storage.get(META_KEY).map_err(read_failed)? else {
            debug!("No stored engine state");
            return Ok(None);
        };
        let meta: EngineMeta = decode("engine meta", &meta)?;

        let mut games = Vec::new();
        let mut player_games: BTreeMap<PlayerId, Vec<u64>> = BTreeMap::new();
        for (_, value) in self.storage.scan_prefix(GAME_PREFIX).map_err(read_failed)? {
            let game: Game = decode("game", &value)?;
            if game.game_id != games.len() as u64 {
                return Err(StorageError::CorruptedData(format!(
                    "Game records are not contiguous: expected {}, found {}",
                    games.len(),
                    game.game_id
                ))
                .into());
            }
            player_games
                .entry(game.player.clone())
                .or_default()
                .push(game.game_id);
            games.push(game);
        }

        let mut pending = PendingRequests::new();
        for (key, value) in self.storage.scan_prefix(PENDING_PREFIX).map_err(read_failed)? {
            let id_bytes: [u8; 8] = key[PENDING_PREFIX.len()..]
                .try_into()
                .map_err(|_| StorageError::CorruptedData("Malformed pending request key".to_string()))?;
            let request: PendingRequest = decode("pending request", &value)?;
            pending.add_pending(u64::from_be_bytes(id_bytes), request);
        }

        let settlements = self
            .storage
            .scan_prefix(SETTLEMENT_PREFIX)
            .map_err(read_failed)?
            .iter()
            .map(|(_, value)| decode::<Settlement>("settlement", value))
            .collect::<DealResult<Vec<_>>>()?;

        let ledger = match self.storage.get(LEDGER_KEY).map_err(read_failed)? {
            Some(bytes) => decode::<HouseLedger>("ledger", &bytes)?,
            None => HouseLedger::new(owner.clone()),
        };
        let allowances = match self.storage.get(ALLOWANCES_KEY).map_err(read_failed)? {
            Some(bytes) => decode::<AllowanceBook>("allowances", &bytes)?,
            None => AllowanceBook::default(),
        };

        info!(
            games = games.len(),
            pending = pending.pending_count(),
            settlements = settlements.len(),
            "Engine state loaded"
        );
        Ok(Some(EngineSnapshot {
            games,
            player_games,
            pending,
            ledger,
            allowances,
            settlements,
            stats: meta.stats,
            request_nonce: meta.request_nonce,
            oracle_fees_paid: meta.oracle_fees_paid,
            next_request_id: meta.next_request_id,
        }))
    }
}

enum WriteCommand {
    Commit(Box<EngineChanges>),
    Flush(oneshot::Sender<()>),
}

/// Ordered background writer. Changes are queued under the engine lock and
/// committed off the async workers in the same order.
#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl StoreWriter {
    pub fn spawn(store: GameStore) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteCommand>();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    WriteCommand::Commit(changes) => {
                        let store = store.clone();
                        match tokio::task::spawn_blocking(move || store.commit(&changes)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => warn!("Failed to persist engine changes: {}", e),
                            Err(e) => warn!("Store writer task failed: {}", e),
                        }
                    }
                    WriteCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("Store writer stopped");
        });
        Self { tx }
    }

    /// Queue whatever the engine changed since the last call
    pub fn persist(&self, engine: &mut crate::games::GameEngine) {
        if let Some(changes) = engine.take_changes() {
            if self.tx.send(WriteCommand::Commit(Box::new(changes))).is_err() {
                warn!("Store writer is gone; engine changes not persisted");
            }
        }
    }

    /// Wait until everything queued so far is on disk
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}
