//! Test utilities for ledger testing

use crate::config::Config;
use crate::core::{Block, Blockchain, Transaction};
use crate::error::Result;
use crate::wallet::Wallets;
use std::path::Path;
use tempfile::TempDir;

/// Target bits used by every test ledger.
pub const TEST_TARGET_BITS: u32 = 8;

/// A ledger and its wallet registry living in a temporary directory.
pub struct TestLedger {
    pub dir: TempDir,
    pub wallets: Wallets,
    pub blockchain: Blockchain,
    pub genesis_address: String,
}

pub fn test_config(dir: &Path) -> Config {
    Config {
        data_dir: dir.join("data"),
        wallet_file: dir.join("wallet.dat"),
        target_bits: TEST_TARGET_BITS,
        mining_workers: 1,
    }
}

/// Opens a fresh ledger; its genesis reward belongs to `genesis_address`.
pub fn open_ledger() -> TestLedger {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut wallets = Wallets::open(&config.wallet_file).unwrap();
    let blockchain = Blockchain::open(&config, &mut wallets).unwrap();
    let genesis_address = wallets.get_addresses().remove(0);

    TestLedger {
        dir,
        wallets,
        blockchain,
        genesis_address,
    }
}

/// Closes the ledger and opens it again from disk.
pub fn reopen(ledger: TestLedger) -> TestLedger {
    let TestLedger {
        dir,
        wallets,
        blockchain,
        genesis_address,
    } = ledger;
    drop(blockchain);
    drop(wallets);

    let config = test_config(dir.path());
    let mut wallets = Wallets::open(&config.wallet_file).unwrap();
    let blockchain = Blockchain::open(&config, &mut wallets).unwrap();
    TestLedger {
        dir,
        wallets,
        blockchain,
        genesis_address,
    }
}

/// A signed transfer built against the current chain, not yet appended.
pub fn transfer(ledger: &TestLedger, from: &str, to: &str, amount: u64) -> Transaction {
    Transaction::new_utxo_transaction(from, to, amount, &ledger.wallets, &ledger.blockchain)
        .unwrap()
}

/// Appends a block holding a reward for `miner` and a transfer from `from` to `to`.
pub fn send(ledger: &TestLedger, from: &str, to: &str, amount: u64, miner: &str) -> Result<Block> {
    let coinbase = Transaction::new_coinbase_tx(miner, "test block")?;
    let tx = Transaction::new_utxo_transaction(from, to, amount, &ledger.wallets, &ledger.blockchain)?;
    ledger.blockchain.mine_block(&[coinbase, tx])
}
