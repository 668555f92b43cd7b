//! Storage backends for committed state snapshots

use crate::crypto::Hash;
use crate::error::{LedgerError, Result};
use crate::state::StateSnapshot;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Arc;

/// Abstraction for persistence backends. Snapshots are content-addressed by their
/// root hash; saving one is the commit operation.
pub trait Persistence: Send + Sync {
    /// Stores `snapshot` and returns its root hash.
    fn save_snapshot(&self, snapshot: &StateSnapshot) -> Result<Hash>;
    fn load_snapshot(&self, root: &Hash) -> Result<Option<StateSnapshot>>;
    fn save_latest_root(&self, root: &Hash) -> Result<()>;
    fn load_latest_root(&self) -> Result<Option<Hash>>;
    /// Hash of the block whose post-state is the latest committed root.
    fn save_latest_block(&self, block_hash: &Hash) -> Result<()>;
    fn load_latest_block(&self) -> Result<Option<Hash>>;
}

fn encode_snapshot(snapshot: &StateSnapshot) -> Result<Vec<u8>> {
    bincode::serialize(snapshot)
        .map_err(|e| LedgerError::DatabaseError(format!("Failed to serialize snapshot: {}", e)))
}

fn decode_snapshot(bytes: &[u8]) -> Result<StateSnapshot> {
    bincode::deserialize(bytes)
        .map_err(|e| LedgerError::DatabaseError(format!("Failed to deserialize snapshot: {}", e)))
}

fn hash_from_bytes(bytes: &[u8]) -> Result<Hash> {
    bytes
        .try_into()
        .map_err(|_| LedgerError::DatabaseError(format!("Stored root has {} bytes", bytes.len())))
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                root BLOB PRIMARY KEY,
                height INTEGER NOT NULL,
                data BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            LedgerError::DatabaseError(format!("Failed to create snapshots table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            LedgerError::DatabaseError(format!("Failed to create metadata table: {}", e))
        })?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn save_metadata_hash(&self, key: &str, hash: &Hash) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, hash.to_vec()],
        )
        .map_err(|e| LedgerError::DatabaseError(format!("Failed to save {}: {}", key, e)))?;
        Ok(())
    }

    fn load_metadata_hash(&self, key: &str) -> Result<Option<Hash>> {
        let conn = self.conn.lock();
        let value: Option<Vec<u8>> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        value.map(|bytes| hash_from_bytes(&bytes)).transpose()
    }
}

impl Persistence for Database {
    fn save_snapshot(&self, snapshot: &StateSnapshot) -> Result<Hash> {
        let root = snapshot.root_hash()?;
        let data = encode_snapshot(snapshot)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO snapshots (root, height, data) VALUES (?1, ?2, ?3)",
            params![root.to_vec(), snapshot.height() as i64, data],
        )
        .map_err(|e| LedgerError::DatabaseError(format!("Failed to save snapshot: {}", e)))?;
        Ok(root)
    }

    fn load_snapshot(&self, root: &Hash) -> Result<Option<StateSnapshot>> {
        let conn = self.conn.lock();
        let data: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM snapshots WHERE root = ?1",
                params![root.to_vec()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to load snapshot: {}", e)))?;
        data.map(|bytes| decode_snapshot(&bytes)).transpose()
    }

    fn save_latest_root(&self, root: &Hash) -> Result<()> {
        self.save_metadata_hash("latest_root", root)
    }

    fn load_latest_root(&self) -> Result<Option<Hash>> {
        self.load_metadata_hash("latest_root")
    }

    fn save_latest_block(&self, block_hash: &Hash) -> Result<()> {
        self.save_metadata_hash("latest_block", block_hash)
    }

    fn load_latest_block(&self) -> Result<Option<Hash>> {
        self.load_metadata_hash("latest_block")
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    snapshots: Arc<RwLock<HashMap<Hash, Vec<u8>>>>,
    latest_root: Arc<RwLock<Option<Hash>>>,
    latest_block: Arc<RwLock<Option<Hash>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_snapshot(&self, snapshot: &StateSnapshot) -> Result<Hash> {
        let root = snapshot.root_hash()?;
        let data = encode_snapshot(snapshot)?;
        self.snapshots.write().entry(root).or_insert(data);
        Ok(root)
    }

    fn load_snapshot(&self, root: &Hash) -> Result<Option<StateSnapshot>> {
        self.snapshots
            .read()
            .get(root)
            .map(|bytes| decode_snapshot(bytes))
            .transpose()
    }

    fn save_latest_root(&self, root: &Hash) -> Result<()> {
        *self.latest_root.write() = Some(*root);
        Ok(())
    }

    fn load_latest_root(&self) -> Result<Option<Hash>> {
        Ok(*self.latest_root.read())
    }

    fn save_latest_block(&self, block_hash: &Hash) -> Result<()> {
        *self.latest_block.write() = Some(*block_hash);
        Ok(())
    }

    fn load_latest_block(&self) -> Result<Option<Hash>> {
        Ok(*self.latest_block.read())
    }
}
