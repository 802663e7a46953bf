//! Core ledger functionality
//!
//! Blocks, transactions, the proof-of-work miner and the chain itself, including
//! the UTXO scan used for balances and input selection.

pub mod block;
pub mod blockchain;
pub mod monetary;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, BLOCK_VERSION};
pub use blockchain::{Blockchain, BlockchainIterator};
pub use monetary::{BLOCK_REWARD, SATOSHIS_PER_COIN};
pub use proof_of_work::ProofOfWork;
pub use transaction::{PrevTransactions, TXInput, TXOutput, Transaction, COINBASE_VOUT};
