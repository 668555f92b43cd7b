//! Block headers, finality status and an in-memory block tree

use crate::crypto::{sha256, Hash};
use crate::error::{LedgerError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Finality of a block. Ordered so that a status can only be raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    Unfinalized,
    IndirectlyFinalized,
    DirectlyFinalized,
}

impl BlockStatus {
    pub fn is_finalized(&self) -> bool {
        *self != BlockStatus::Unfinalized
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub chain_id: String,
    pub height: u64,
    pub epoch: u64,
    pub parent: Hash,
    pub state_hash: Hash,
    pub status: BlockStatus,
}

impl Block {
    pub fn new(chain_id: &str, height: u64, epoch: u64, parent: Hash, state_hash: Hash) -> Self {
        Block {
            chain_id: chain_id.to_string(),
            height,
            epoch,
            parent,
            state_hash,
            status: BlockStatus::Unfinalized,
        }
    }

    /// Genesis is finalized by definition.
    pub fn genesis(chain_id: &str, state_hash: Hash) -> Self {
        Block {
            status: BlockStatus::DirectlyFinalized,
            ..Block::new(chain_id, 0, 0, [0u8; 32], state_hash)
        }
    }

    /// Hash of the encoded header fields; the status is not part of a block's identity.
    pub fn hash(&self) -> Result<Hash> {
        let header = (
            &self.chain_id,
            self.height,
            self.epoch,
            &self.parent,
            &self.state_hash,
        );
        Ok(sha256(&bincode::serialize(&header)?))
    }
}

/// Read access to the consensus block tree.
pub trait ChainView: Send + Sync {
    fn find_block(&self, hash: &Hash) -> Option<Block>;
}

#[derive(Default)]
struct BlockStoreInner {
    blocks: HashMap<Hash, Block>,
    by_height: BTreeMap<u64, Vec<Hash>>,
}

#[derive(Default)]
pub struct BlockStore {
    inner: RwLock<BlockStoreInner>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block whose parent is already known (or a height-0 block).
    pub fn add_block(&self, block: Block) -> Result<Hash> {
        let hash = block.hash()?;
        let mut inner = self.inner.write();
        if inner.blocks.contains_key(&hash) {
            return Ok(hash);
        }

        if block.height > 0 {
            let parent = inner.blocks.get(&block.parent).ok_or_else(|| {
                LedgerError::BlockNotFound(format!("Parent {} not found", hex::encode(block.parent)))
            })?;
            if block.height != parent.height + 1 {
                return Err(LedgerError::InvalidTx(format!(
                    "Invalid block height. Expected {}, but got {}.",
                    parent.height + 1,
                    block.height
                )));
            }
            if block.chain_id != parent.chain_id {
                return Err(LedgerError::InvalidTx(format!(
                    "Block chain id {} differs from parent chain id {}",
                    block.chain_id, parent.chain_id
                )));
            }
        }

        inner.by_height.entry(block.height).or_default().push(hash);
        inner.blocks.insert(hash, block);
        Ok(hash)
    }

    /// Marks `hash` directly finalized and every not-yet-finalized ancestor indirectly finalized.
    pub fn finalize(&self, hash: &Hash) -> Result<()> {
        let mut inner = self.inner.write();
        let block = inner
            .blocks
            .get_mut(hash)
            .ok_or_else(|| LedgerError::BlockNotFound(hex::encode(hash)))?;
        block.status = block.status.max(BlockStatus::DirectlyFinalized);
        let mut parent = block.parent;
        let mut height = block.height;

        while height > 0 {
            let Some(ancestor) = inner.blocks.get_mut(&parent) else {
                break;
            };
            if ancestor.status.is_finalized() {
                break;
            }
            ancestor.status = BlockStatus::IndirectlyFinalized;
            debug!(block = %hex::encode(parent), height = ancestor.height, "Indirectly finalized");
            parent = ancestor.parent;
            height = ancestor.height;
        }
        Ok(())
    }

    pub fn blocks_at_height(&self, height: u64) -> Vec<Block> {
        let inner = self.inner.read();
        inner
            .by_height
            .get(&height)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| inner.blocks.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn status(&self, hash: &Hash) -> Option<BlockStatus> {
        self.inner.read().blocks.get(hash).map(|b| b.status)
    }
}

impl ChainView for BlockStore {
    fn find_block(&self, hash: &Hash) -> Option<Block> {
        self.inner.read().blocks.get(hash).cloned()
    }
}
