//! Session persistence hook.
//!
//! Player records are saved whenever a disconnected session is reaped and
//! looked up again on `LOGIN`. The trait keeps the storage pluggable; the
//! in-process [`MemoryStore`] is the only implementation shipped, so tokens
//! survive reconnects within one server run but not across restarts. A
//! disk-backed store slots in behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;

use log::warn;
use serde::{Deserialize, Serialize};

/// Durable state of one registered player, keyed by token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    pub token: String,
    pub currency: i64,
}

/// Simple keyed blob store. `table` namespaces the keys the way a database
/// table would.
pub trait StateStore: Send + Sync {
    fn save(&self, table: &str, key: &str, data: Vec<u8>);
    fn load(&self, table: &str, key: &str) -> Option<Vec<u8>>;
}

/// In-process store backed by a map. Contents are lost on shutdown.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn save(&self, table: &str, key: &str, data: Vec<u8>) {
        let mut entries = self.entries.lock().expect("store mutex poisoned");
        entries.insert((table.to_string(), key.to_string()), data);
    }

    fn load(&self, table: &str, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().expect("store mutex poisoned");
        entries.get(&(table.to_string(), key.to_string())).cloned()
    }
}

/// Table name under which player records are filed.
pub const PLAYER_TABLE: &str = "Player";

pub fn save_player(store: &dyn StateStore, record: &PlayerRecord) {
    match bincode::serialize(record) {
        Ok(data) => store.save(PLAYER_TABLE, &record.token, data),
        Err(e) => warn!("failed to encode record for {}: {}", record.name, e),
    }
}

pub fn load_player(store: &dyn StateStore, token: &str) -> Option<PlayerRecord> {
    let data = store.load(PLAYER_TABLE, token)?;
    match bincode::deserialize(&data) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("corrupt record under token {}: {}", token, e);
            None
        }
    }
}
