use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::info;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

type Found = Option<(u64, Vec<u8>)>;

const MAX_NONCE: u64 = u64::MAX;
const HASH_BITS: u64 = 256;

pub struct ProofOfWork<'a> {
    block: &'a Block,
    target: BigInt,
}

impl<'a> ProofOfWork<'a> {
    pub fn new_proof_of_work(block: &'a Block) -> ProofOfWork<'a> {
        ProofOfWork {
            block,
            target: Self::target_for(block.get_difficulty()),
        }
    }

    /// `1 << (256 - target_bits)`; more bits means a lower target.
    pub fn target_for(target_bits: u64) -> BigInt {
        let mut target = BigInt::from(1);
        target.shl_assign(HASH_BITS.saturating_sub(target_bits));
        target
    }

    /// Recomputes the header digest at the stored nonce and checks it against both
    /// the block's target and its stored hash.
    pub fn validate(block: &Block) -> bool {
        let difficulty = block.get_difficulty();
        if difficulty == 0 || difficulty >= HASH_BITS {
            return false;
        }

        let pow = ProofOfWork::new_proof_of_work(block);
        let hash = sha256_digest(pow.prepare_data(block.get_nonce()).as_slice());
        pow.meets_target(hash.as_slice()) && hash.as_slice() == block.get_hash()
    }

    fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.block.get_version().to_be_bytes());
        data_bytes.extend(self.block.get_pre_block_hash());
        data_bytes.extend(self.block.get_merkle_root());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes.extend(self.block.get_difficulty().to_be_bytes());
        data_bytes.extend(self.block.get_timestamp().to_be_bytes());
        data_bytes
    }

    // I compare the digest as a big-endian unsigned number against the target
    fn meets_target(&self, hash: &[u8]) -> bool {
        BigInt::from_bytes_be(Sign::Plus, hash) < self.target
    }

    /// Searches for the smallest nonce whose header digest falls below the target.
    ///
    /// With more than one worker each takes a strided slice of the nonce space. A
    /// worker gives up once its next nonce exceeds the best one found so far, so the
    /// result is the same nonce a sequential search would return.
    pub fn run(&self, workers: usize) -> Result<(u64, Vec<u8>)> {
        let workers = workers.max(1);
        info!(
            "Mining the block with {} target bits on {workers} worker(s)",
            self.block.get_difficulty()
        );

        let best = AtomicU64::new(MAX_NONCE);
        let found = if workers == 1 {
            self.search(0, 1, &best)
        } else {
            let best = &best;
            thread::scope(|scope| {
                let handles: Vec<_> = (0..workers as u64)
                    .map(|start| scope.spawn(move || self.search(start, workers as u64, best)))
                    .collect();
                Self::smallest_nonce(handles.into_iter().map(|handle| handle.join()))
            })?
        };

        let (nonce, hash) = found.ok_or_else(|| {
            BlockchainError::Mining("Nonce space exhausted without a valid hash".to_string())
        })?;
        info!("Found nonce {nonce}: {}", HEXLOWER.encode(hash.as_slice()));
        Ok((nonce, hash))
    }

    // I only trust the minimum when every worker came back. A worker that panicked
    // may have owned the smallest nonce, so I fail the whole run instead.
    fn smallest_nonce<I>(results: I) -> Result<Found>
    where
        I: IntoIterator<Item = thread::Result<Found>>,
    {
        let mut smallest: Found = None;
        for result in results {
            let candidate = result.map_err(|_| {
                BlockchainError::Mining("Mining worker panicked".to_string())
            })?;
            if let Some((nonce, hash)) = candidate {
                if smallest.as_ref().map_or(true, |(best, _)| nonce < *best) {
                    smallest = Some((nonce, hash));
                }
            }
        }
        Ok(smallest)
    }

    fn search(&self, start: u64, step: u64, best: &AtomicU64) -> Found {
        let mut nonce = start;
        loop {
            if nonce > best.load(Ordering::Relaxed) {
                return None;
            }

            let hash = sha256_digest(self.prepare_data(nonce).as_slice());
            if self.meets_target(hash.as_slice()) {
                best.fetch_min(nonce, Ordering::Relaxed);
                return Some((nonce, hash));
            }

            nonce = nonce.checked_add(step)?;
        }
    }
}
