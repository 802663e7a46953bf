use crate::core::{ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize, sha256_digest};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};

pub const BLOCK_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    version: u64,
    pre_block_hash: Vec<u8>, // empty only for genesis
    merkle_root: Vec<u8>,
    nonce: u64,
    difficulty: u64,
    timestamp: u64,
    hash: Vec<u8>,
    transactions: Vec<Transaction>,
}

impl Block {
    /// Seals `transactions` on top of `pre_block_hash` by mining at `difficulty`
    /// target bits.
    pub fn new_block(
        pre_block_hash: &[u8],
        transactions: &[Transaction],
        difficulty: u64,
        workers: usize,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        // I fix the merkle root and timestamp before mining so the header hash
        // commits to both of them.
        let mut block = Block {
            version: BLOCK_VERSION,
            pre_block_hash: pre_block_hash.to_vec(),
            merkle_root: Self::hash_transactions(transactions),
            nonce: 0,
            difficulty,
            timestamp: current_timestamp()?,
            hash: vec![],
            transactions: transactions.to_vec(),
        };

        let (nonce, hash) = ProofOfWork::new_proof_of_work(&block).run(workers)?;
        block.nonce = nonce;
        block.hash = hash;
        info!(
            "Sealed block {} with {} transaction(s)",
            HEXLOWER.encode(block.hash.as_slice()),
            block.transactions.len()
        );

        Ok(block)
    }

    pub fn generate_genesis_block(
        transaction: &Transaction,
        difficulty: u64,
        workers: usize,
    ) -> Result<Block> {
        Block::new_block(&[], std::slice::from_ref(transaction), difficulty, workers)
    }

    /// Single digest over the concatenated transaction ids, in block order.
    pub fn hash_transactions(transactions: &[Transaction]) -> Vec<u8> {
        let mut txhashs = vec![];
        for transaction in transactions {
            txhashs.extend(transaction.get_id());
        }
        sha256_digest(txhashs.as_slice())
    }

    pub fn verify_merkle_root(&self) -> bool {
        Self::hash_transactions(&self.transactions) == self.merkle_root
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_version(&self) -> u64 {
        self.version
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_merkle_root(&self) -> &[u8] {
        self.merkle_root.as_slice()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u64 {
        self.difficulty
    }

    pub fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    #[cfg(test)]
    pub(crate) fn with_difficulty(&self, difficulty: u64) -> Block {
        Block {
            difficulty,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn coinbase(note: &str) -> Transaction {
        let address = Wallet::new().unwrap().get_address();
        Transaction::new_coinbase_tx(&address, note).unwrap()
    }

    #[test]
    fn test_genesis_block() {
        let block = Block::generate_genesis_block(&coinbase("genesis"), 8, 1).unwrap();

        assert!(block.is_genesis());
        assert_eq!(block.get_version(), BLOCK_VERSION);
        assert_eq!(block.get_difficulty(), 8);
        assert_eq!(block.get_hash().len(), 32);
        assert!(block.verify_merkle_root());
        assert!(ProofOfWork::validate(&block));
    }

    #[test]
    fn test_empty_block_rejected() {
        let result = Block::new_block(&[1u8; 32], &[], 8, 1);
        assert!(matches!(result, Err(BlockchainError::InvalidBlock(_))));
    }

    #[test]
    fn test_merkle_root_is_order_sensitive() {
        let first = coinbase("a");
        let second = coinbase("b");

        let forward = Block::hash_transactions(&[first.clone(), second.clone()]);
        let backward = Block::hash_transactions(&[second.clone(), first.clone()]);
        assert_ne!(forward, backward);

        let mut ids = first.get_id().to_vec();
        ids.extend(second.get_id());
        assert_eq!(forward, sha256_digest(&ids));
    }

    #[test]
    fn test_serialization_keeps_stored_hash() {
        let block = Block::new_block(&[7u8; 32], &[coinbase("x"), coinbase("y")], 8, 2).unwrap();
        let decoded = Block::deserialize(&block.serialize().unwrap()).unwrap();

        assert_eq!(decoded, block);
        assert_eq!(decoded.get_hash(), block.get_hash());
        assert!(ProofOfWork::validate(&decoded));
        assert!(!decoded.is_genesis());
    }

    #[test]
    fn test_tampering_breaks_validation() {
        let block = Block::new_block(&[7u8; 32], &[coinbase("x")], 8, 1).unwrap();

        let mut wrong_nonce = block.clone();
        wrong_nonce.nonce += 1;
        assert!(!ProofOfWork::validate(&wrong_nonce));

        let mut wrong_parent = block.clone();
        wrong_parent.pre_block_hash = vec![8u8; 32];
        assert!(!ProofOfWork::validate(&wrong_parent));

        let mut swapped = block;
        swapped.transactions = vec![coinbase("z")];
        assert!(!swapped.verify_merkle_root());
    }
}
