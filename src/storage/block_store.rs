// Persistent block storage on top of sled.
// Blocks live in their own tree keyed by block hash, next to one reserved key
// holding the hash of the current tip.

use crate::core::Block;
use crate::error::{BlockchainError, Result};
use sled::{Db, Tree};
use std::path::Path;

const TIP_BLOCK_HASH_KEY: &str = "tip_block_hash";
const BLOCKS_TREE: &str = "blocks";

#[derive(Clone)]
pub struct BlockStore {
    db: Db,
    blocks: Tree,
}

impl BlockStore {
    pub fn open(path: &Path) -> Result<BlockStore> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;

        Ok(BlockStore { db, blocks })
    }

    /// Hash of the latest committed block, or `None` for an empty store.
    pub fn get_tip(&self) -> Result<Option<Vec<u8>>> {
        let tip = self
            .blocks
            .get(TIP_BLOCK_HASH_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to get tip hash: {e}")))?;
        Ok(tip.map(|bytes| bytes.to_vec()))
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        if let Some(block_bytes) = self
            .blocks
            .get(block_hash)
            .map_err(|e| BlockchainError::Database(format!("Failed to get block: {e}")))?
        {
            let block = Block::deserialize(block_bytes.as_ref())?;
            return Ok(Some(block));
        }
        Ok(None)
    }

    /// Writes the block and moves the tip to it in one sled transaction, then
    /// flushes. Either both land on disk or neither does.
    pub fn commit_block(&self, block: &Block) -> Result<()> {
        let block_hash = block.get_hash();
        let block_data = block.serialize()?;

        self.blocks
            .transaction(|tx_db| {
                tx_db.insert(block_hash, block_data.as_slice())?;
                tx_db.insert(TIP_BLOCK_HASH_KEY, block_hash)?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                BlockchainError::Database(format!("Failed to update blocks tree: {e}"))
            })?;

        self.db
            .flush()
            .map_err(|e| BlockchainError::Database(format!("Failed to flush database: {e}")))?;
        Ok(())
    }
}
