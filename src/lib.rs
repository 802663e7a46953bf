//! # Ledger Chain - A Single-Process UTXO Ledger
//!
//! An append-only chain of proof-of-work blocks holding signed transactions that
//! move value between Bitcoin-style addresses. One local operator, no network.
//!
//! ## What's Here
//! - **Ledger**: hash-linked blocks in a sled database, appended only through
//!   [`Blockchain::mine_block`], which verifies every transfer first
//! - **UTXO Model**: balances and input selection come from a tip-to-genesis scan
//!   of the chain, there is no separate index
//! - **Proof of Work**: SHA-256 over the block header, optionally searched by
//!   several worker threads
//! - **Wallets**: ECDSA P-256 key pairs and base58check addresses, kept in a
//!   wallet file
//!
//! ## Layout
//! - `core/`: blocks, transactions, mining and the chain itself
//! - `wallet/`: key pairs, address encoding and the wallet registry
//! - `storage/`: the sled-backed block store
//! - `config/`: defaults, `ledger.toml` and `LEDGER_*` overrides
//! - `utils/`: hashing, signing and bincode helpers
//! - `cli/`: argument parsing for the `ledger-chain` binary
//!
//! ## Example
//! ```no_run
//! use ledger_chain::{Blockchain, Config, Transaction, Wallets};
//!
//! # fn main() -> ledger_chain::Result<()> {
//! let config = Config::load()?;
//! let mut wallets = Wallets::open(&config.wallet_file)?;
//! let blockchain = Blockchain::open(&config, &mut wallets)?;
//!
//! let from = wallets.get_addresses().remove(0);
//! let to = wallets.create_wallet()?;
//! let reward = Transaction::new_coinbase_tx(&from, "example")?;
//! let tx = Transaction::new_utxo_transaction(&from, &to, 1_000, &wallets, &blockchain)?;
//! blockchain.mine_block(&[reward, tx])?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testkit;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    Block, Blockchain, BlockchainIterator, ProofOfWork, TXInput, TXOutput, Transaction,
    BLOCK_REWARD, SATOSHIS_PER_COIN,
};
pub use error::{BlockchainError, Result};
pub use storage::BlockStore;
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    convert_address, hash_pub_key, pub_key_hash_from_address, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN,
};
