use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::{encode_i64, sha256_digest};
use data_encoding::HEXLOWER;
use log::{debug, info};
use num_bigint::BigUint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Highest accepted difficulty. At 256 the target would be 1 and no hash could meet it.
pub const MAX_DIFFICULTY: u32 = 255;

/// Exclusive upper bound of the nonce search
const MAX_NONCE: i64 = i64::MAX;

// Workers poll the stop flags once per this many hashes
const CANCEL_CHECK_INTERVAL: i64 = 1024;

/// Nonce search and validation for a single block.
///
/// The sealing input is `timestamp || pre_block_hash || target || nonce ||
/// sha256(tx ids)`, with integers as 8-byte big-endian. Only the nonce changes
/// between attempts, so the parts before and after it are assembled once.
pub struct ProofOfWork<'a> {
    block: &'a Block,
    target: BigUint,
    prefix: Vec<u8>,
    tx_digest: Vec<u8>,
    nonce_limit: i64,
}

impl<'a> ProofOfWork<'a> {
    pub fn new_proof_of_work(block: &'a Block) -> ProofOfWork<'a> {
        let mut prefix = Vec::new();
        prefix.extend(encode_i64(block.get_timestamp()));
        prefix.extend(block.get_pre_block_hash());
        prefix.extend(block.get_target());
        ProofOfWork {
            block,
            target: BigUint::from_bytes_be(block.get_target()),
            prefix,
            tx_digest: block.hash_transactions(),
            nonce_limit: MAX_NONCE,
        }
    }

    /// `1 << (256 - difficulty)`: each extra bit of difficulty halves the target.
    pub fn derive_target(difficulty: u32) -> Result<BigUint> {
        if difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "Difficulty {difficulty} exceeds maximum {MAX_DIFFICULTY}"
            )));
        }
        Ok(BigUint::from(1u8) << (256 - difficulty))
    }

    /// Lower the exclusive bound of the nonce search
    pub fn with_nonce_limit(mut self, limit: i64) -> Self {
        self.nonce_limit = limit.max(0);
        self
    }

    pub fn get_target(&self) -> &BigUint {
        &self.target
    }

    pub fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.prefix.len() + 8 + self.tx_digest.len());
        data.extend_from_slice(&self.prefix);
        data.extend(encode_i64(nonce));
        data.extend_from_slice(&self.tx_digest);
        data
    }

    pub fn hash_with_nonce(&self, nonce: i64) -> Vec<u8> {
        sha256_digest(&self.prepare_data(nonce))
    }

    fn meets_target(&self, hash: &[u8]) -> bool {
        BigUint::from_bytes_be(hash) < self.target
    }

    /// Validate proof-of-work for a block. One hash regardless of difficulty.
    pub fn validate(block: &Block) -> bool {
        let pow = ProofOfWork::new_proof_of_work(block);
        let hash = pow.hash_with_nonce(block.get_nonce());
        pow.meets_target(&hash)
    }

    /// Search nonces from zero upward; the first one under the target wins.
    pub fn run(&self) -> Result<(i64, Vec<u8>)> {
        self.run_with_cancel(&AtomicBool::new(false))
    }

    pub fn run_with_cancel(&self, cancel: &AtomicBool) -> Result<(i64, Vec<u8>)> {
        self.run_parallel(1, cancel)
    }

    /// Split the nonce space by stride over `workers` threads. Worker `w` tries
    /// `w, w + workers, w + 2 * workers, ...`; whichever hits first wins and the
    /// others stop.
    pub fn run_parallel(&self, workers: usize, cancel: &AtomicBool) -> Result<(i64, Vec<u8>)> {
        let workers = workers.max(1);
        info!(
            "Searching nonce for block on {} with {workers} worker(s), target {}",
            HEXLOWER.encode(self.block.get_pre_block_hash()),
            self.target
        );

        let found = AtomicBool::new(false);
        let winner: Mutex<Option<(i64, Vec<u8>)>> = Mutex::new(None);

        if workers == 1 {
            self.search(0, 1, cancel, &found, &winner);
        } else {
            std::thread::scope(|scope| {
                for start in 0..workers {
                    let (found, winner) = (&found, &winner);
                    scope.spawn(move || {
                        self.search(start as i64, workers as i64, cancel, found, winner)
                    });
                }
            });
        }

        let result = winner
            .into_inner()
            .map_err(|_| BlockchainError::InvalidBlock("Nonce search worker panicked".to_string()))?;
        match result {
            Some((nonce, hash)) => {
                info!("Found nonce {nonce}: {}", HEXLOWER.encode(&hash));
                Ok((nonce, hash))
            }
            None if cancel.load(Ordering::Relaxed) => Err(BlockchainError::MiningCancelled),
            None => Err(BlockchainError::NonceExhausted {
                limit: self.nonce_limit,
            }),
        }
    }

    fn search(
        &self,
        start: i64,
        step: i64,
        cancel: &AtomicBool,
        found: &AtomicBool,
        winner: &Mutex<Option<(i64, Vec<u8>)>>,
    ) {
        let mut nonce = start;
        let mut attempts: i64 = 0;
        while nonce < self.nonce_limit {
            if attempts % CANCEL_CHECK_INTERVAL == 0
                && (cancel.load(Ordering::Relaxed) || found.load(Ordering::Relaxed))
            {
                debug!("Worker starting at {start} stopped after {attempts} attempts");
                return;
            }

            let hash = self.hash_with_nonce(nonce);
            if self.meets_target(&hash) {
                if let Ok(mut slot) = winner.lock() {
                    if slot.is_none() {
                        *slot = Some((nonce, hash));
                    }
                }
                found.store(true, Ordering::Relaxed);
                return;
            }

            attempts += 1;
            nonce = match nonce.checked_add(step) {
                Some(next) => next,
                None => return,
            };
        }
    }
}
