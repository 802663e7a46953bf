// The ledger: a hash-linked chain of blocks in sled plus the cached tip.
// Every append goes through mine_block, which is the only place a block is accepted.

use crate::config::Config;
use crate::core::transaction::PrevTransactions;
use crate::core::{Block, TXOutput, Transaction, BLOCK_REWARD};
use crate::error::{BlockchainError, Result};
use crate::storage::BlockStore;
use crate::wallet::{Wallet, Wallets};
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, RwLock};

const GENESIS_COINBASE_DATA: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<Vec<u8>>>,
    // Held from validation through the tip update, so clones append one at a time
    append_lock: Arc<Mutex<()>>,
    store: BlockStore,
    difficulty: u64,
    mining_workers: usize,
}

impl Blockchain {
    /// Opens the ledger under `config.data_dir`.
    ///
    /// On an empty store this mines a genesis block paying a fresh key pair the
    /// block reward, commits it, and only then registers the key pair in `wallets`.
    /// Later opens only load the tip.
    pub fn open(config: &Config, wallets: &mut Wallets) -> Result<Blockchain> {
        config.validate()?;
        let store = BlockStore::open(&config.blocks_path())?;
        let difficulty = u64::from(config.target_bits);

        let tip_hash = match store.get_tip()? {
            Some(tip) => tip,
            None => {
                // I keep the genesis key pair in memory until the block is on disk,
                // so a failed first open leaves no unfunded wallet behind.
                let genesis_wallet = Wallet::new()?;
                let genesis_address = genesis_wallet.get_address();
                info!("Creating genesis block for address: {genesis_address}");
                let coinbase_tx =
                    Transaction::new_coinbase_tx(&genesis_address, GENESIS_COINBASE_DATA)?;
                let block = Block::generate_genesis_block(
                    &coinbase_tx,
                    difficulty,
                    config.mining_workers,
                )?;
                store.commit_block(&block)?;
                wallets.add_wallet(genesis_wallet)?;
                block.get_hash().to_vec()
            }
        };

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            append_lock: Arc::new(Mutex::new(())),
            store,
            difficulty,
            mining_workers: config.mining_workers,
        })
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        match self.tip_hash.read() {
            Ok(tip) => tip.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = match self.tip_hash.write() {
            Ok(tip) => tip,
            Err(poisoned) => poisoned.into_inner(),
        };
        *tip_hash = new_tip_hash.to_vec();
    }

    pub fn get_difficulty(&self) -> u64 {
        self.difficulty
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        self.store.get_block(block_hash)
    }

    /// Validates `transactions`, mines them into a block on the current tip and
    /// commits it. A rejected batch leaves the chain untouched.
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        // I hold this until the new tip is set. Otherwise two clones could both
        // validate against the same tip and the second commit would orphan the first.
        let _append_guard = match self.append_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Err(e) = self.validate_transactions(transactions) {
            warn!("Rejected block: {e}");
            return Err(e);
        }

        let block = Block::new_block(
            &self.get_tip_hash(),
            transactions,
            self.difficulty,
            self.mining_workers,
        )?;
        self.store.commit_block(&block)?;
        self.set_tip_hash(block.get_hash());

        info!(
            "Successfully mined block: {} (difficulty: {})",
            HEXLOWER.encode(block.get_hash()),
            self.difficulty
        );
        Ok(block)
    }

    fn validate_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let chain = self.scan_chain()?;
        let mut claimed: HashSet<(Vec<u8>, usize)> = HashSet::new();
        let mut batch_ids: HashSet<&[u8]> = HashSet::new();

        for (index, transaction) in transactions.iter().enumerate() {
            let txid_hex = HEXLOWER.encode(transaction.get_id());

            // Every lookup and every spend goes through the id, so I check it first
            if !transaction.has_valid_id()? {
                return Err(BlockchainError::InvalidTransaction(format!(
                    "Transaction {txid_hex} id does not match its contents"
                )));
            }
            if chain.ids.contains(transaction.get_id()) {
                return Err(BlockchainError::InvalidTransaction(format!(
                    "Transaction {txid_hex} is already on chain"
                )));
            }
            if !batch_ids.insert(transaction.get_id()) {
                return Err(BlockchainError::InvalidTransaction(format!(
                    "Transaction {txid_hex} appears twice in the batch"
                )));
            }

            if transaction.is_coinbase() {
                if index > 0 {
                    return Err(BlockchainError::InvalidBlock(format!(
                        "Coinbase transaction {txid_hex} at index {index}"
                    )));
                }
                if transaction.output_value()? != BLOCK_REWARD {
                    return Err(BlockchainError::InvalidTransaction(format!(
                        "Coinbase {txid_hex} does not pay the block reward"
                    )));
                }
                continue;
            }

            if transaction.get_vin().is_empty() {
                return Err(BlockchainError::InvalidTransaction(format!(
                    "Transaction {txid_hex} has no inputs"
                )));
            }

            // Dangling references surface here as TransactionNotFound
            let prev_txs = self.prev_transactions(transaction)?;
            if !transaction.verify(&prev_txs)? {
                return Err(BlockchainError::InvalidTransaction(format!(
                    "Signature verification failed for transaction {txid_hex}"
                )));
            }

            for input in transaction.get_vin() {
                let vout = input.output_index().ok_or_else(|| {
                    BlockchainError::InvalidTransaction(format!(
                        "Transaction {txid_hex} has a negative output index"
                    ))
                })?;
                let output_reference = (input.get_txid().to_vec(), vout);
                if chain.spent.contains(&output_reference) || !claimed.insert(output_reference)
                {
                    return Err(BlockchainError::OutputAlreadySpent {
                        txid: HEXLOWER.encode(input.get_txid()),
                        vout,
                    });
                }
            }

            let input_value = transaction.input_value(&prev_txs)?;
            let output_value = transaction.output_value()?;
            if input_value != output_value {
                return Err(BlockchainError::InvalidTransaction(format!(
                    "Transaction {txid_hex} spends {input_value} but creates {output_value}"
                )));
            }
        }

        Ok(())
    }

    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.store.clone())
    }

    // Walks tip to genesis, and each block's transactions last to first, so every
    // spend is recorded before the transaction it spends from is reached.
    fn scan_unspent<F>(&self, pub_key_hash: &[u8], mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], usize, &TXOutput) -> ControlFlow<()>,
    {
        let mut spent_txos: HashMap<Vec<u8>, HashSet<usize>> = HashMap::new();

        for block in self.iterator() {
            let block = block?;
            for tx in block.get_transactions().iter().rev() {
                for (idx, out) in tx.get_vout().iter().enumerate() {
                    let spent = spent_txos
                        .get(tx.get_id())
                        .is_some_and(|outs| outs.contains(&idx));
                    if spent || !out.is_locked_with_key(pub_key_hash) {
                        continue;
                    }
                    if visit(tx.get_id(), idx, out).is_break() {
                        return Ok(());
                    }
                }

                // I record the spends of every transaction, not just the ones signed
                // with this key, since any owner's output can be claimed only once.
                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    if let Some(vout) = txin.output_index() {
                        spent_txos
                            .entry(txin.get_txid().to_vec())
                            .or_default()
                            .insert(vout);
                    }
                }
            }
        }
        Ok(())
    }

    /// Unspent outputs locked to `pub_key_hash`, newest first.
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let mut utxos = vec![];
        self.scan_unspent(pub_key_hash, |_, _, out| {
            utxos.push(out.clone());
            ControlFlow::Continue(())
        })?;
        Ok(utxos)
    }

    /// Greedily picks unspent outputs until `amount` is covered. The returned total
    /// is less than `amount` when the address cannot cover it.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, Vec<(Vec<u8>, usize)>)> {
        let mut accumulated = 0u64;
        let mut unspent_outputs = vec![];
        // I stop the scan as soon as the amount is covered; older outputs stay untouched
        self.scan_unspent(pub_key_hash, |txid, idx, out| {
            accumulated = accumulated.saturating_add(out.get_value());
            unspent_outputs.push((txid.to_vec(), idx));
            if accumulated >= amount {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        debug!(
            "Selected {} output(s) worth {accumulated} for {amount}",
            unspent_outputs.len()
        );
        Ok((accumulated, unspent_outputs))
    }

    pub fn get_balance(&self, pub_key_hash: &[u8]) -> Result<u64> {
        let utxos = self.find_utxo(pub_key_hash)?;
        Ok(utxos.iter().map(TXOutput::get_value).sum())
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Result<Option<Transaction>> {
        for block in self.iterator() {
            let block = block?;
            for transaction in block.get_transactions() {
                if txid.eq(transaction.get_id()) {
                    return Ok(Some(transaction.clone()));
                }
            }
        }
        Ok(None)
    }

    // Every transaction the inputs of `tx` point at, keyed by id.
    // When I sign or verify I need these to find the key hash each input claims.
    fn prev_transactions(&self, tx: &Transaction) -> Result<PrevTransactions> {
        let mut prev_txs = PrevTransactions::new();
        for vin in tx.get_vin() {
            if prev_txs.contains_key(vin.get_txid()) {
                continue;
            }
            let prev_tx = self.find_transaction(vin.get_txid())?.ok_or_else(|| {
                BlockchainError::TransactionNotFound(HEXLOWER.encode(vin.get_txid()))
            })?;
            prev_txs.insert(vin.get_txid().to_vec(), prev_tx);
        }
        Ok(prev_txs)
    }

    pub fn sign_transaction(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self.prev_transactions(tx)?;
        tx.sign(pkcs8, &prev_txs)
    }

    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.prev_transactions(tx)?;
        tx.verify(&prev_txs)
    }

    // One pass over the whole chain collecting every transaction id and every
    // output some input has already claimed.
    fn scan_chain(&self) -> Result<ChainIndex> {
        let mut index = ChainIndex::default();
        for block in self.iterator() {
            let block = block?;
            for transaction in block.get_transactions() {
                index.ids.insert(transaction.get_id().to_vec());
                if transaction.is_coinbase() {
                    continue;
                }
                for input in transaction.get_vin() {
                    if let Some(vout) = input.output_index() {
                        index.spent.insert((input.get_txid().to_vec(), vout));
                    }
                }
            }
        }
        Ok(index)
    }

    pub fn is_output_spent(&self, txid: &[u8], vout: usize) -> Result<bool> {
        Ok(self.scan_chain()?.spent.contains(&(txid.to_vec(), vout)))
    }
}

#[derive(Default)]
struct ChainIndex {
    ids: HashSet<Vec<u8>>,
    spent: HashSet<(Vec<u8>, usize)>,
}

/// Cursor from the tip back to genesis.
///
/// A block missing from the store ends the walk with a `Database` error.
pub struct BlockchainIterator {
    store: BlockStore,
    current_hash: Vec<u8>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, store: BlockStore) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: tip_hash,
            store,
        }
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_empty() {
            return None;
        }

        let current_hash = std::mem::take(&mut self.current_hash);
        match self.store.get_block(&current_hash) {
            Ok(Some(block)) => {
                self.current_hash = block.get_pre_block_hash().to_vec();
                Some(Ok(block))
            }
            Ok(None) => Some(Err(BlockchainError::Database(format!(
                "Block {} missing from store",
                HEXLOWER.encode(&current_hash)
            )))),
            Err(e) => Some(Err(e)),
        }
    }
}
