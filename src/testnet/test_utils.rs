//! Test utilities for ledger testing

use crate::config::Config;
use crate::core::{Block, Blockchain, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use tempfile::TempDir;

/// Receives the initial supply in every test ledger
pub const GENESIS_ADDRESS: &str = "alice";

/// Low enough that sealing takes a handful of hashes
pub const TEST_DIFFICULTY: u32 = 4;

pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| BlockchainError::Io(e.to_string()))
}

/// Configuration pointing at `dir` with test difficulty
pub fn test_config(dir: &TempDir) -> Config {
    Config {
        data_dir: dir.path().join("test_ledger"),
        difficulty: TEST_DIFFICULTY,
        ..Config::default()
    }
}

/// Create a ledger with temporary storage; keep the `TempDir` alive for its lifetime
pub fn create_test_blockchain() -> Result<(Blockchain, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let blockchain = Blockchain::create_blockchain(GENESIS_ADDRESS, &test_config(&temp_dir))?;
    Ok((blockchain, temp_dir))
}

/// Build a transfer against the current ledger state and mine it
pub fn send_and_mine(
    blockchain: &Blockchain,
    from: &str,
    to: &str,
    amount: u64,
) -> Result<Block> {
    let utxo_set = UTXOSet::new(blockchain.clone());
    let tx = Transaction::new_utxo_transaction(from, to, amount, &utxo_set)?;
    blockchain.mine_block(&[tx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_blockchain() {
        let (blockchain, _temp_dir) = create_test_blockchain().unwrap();
        assert_eq!(blockchain.get_best_height().unwrap(), 0);
        assert_eq!(blockchain.get_difficulty(), TEST_DIFFICULTY);
    }

    #[test]
    fn test_send_and_mine_extends_chain() {
        let (blockchain, _temp_dir) = create_test_blockchain().unwrap();
        let block = send_and_mine(&blockchain, GENESIS_ADDRESS, "bob", 10).unwrap();
        assert_eq!(blockchain.get_tip_hash().unwrap(), block.get_hash());
        assert_eq!(blockchain.verify_chain().unwrap(), 2);
    }
}
