use crate::core::{ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize, sha256_digest};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

/// A batch of transactions sealed by proof-of-work.
///
/// Created unsealed (empty hash, nonce 0), sealed once by [`Block::mine`], and
/// never modified after that.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Block {
    timestamp: i64,
    hash: Vec<u8>,
    pre_block_hash: Vec<u8>,
    target: Vec<u8>, // big-endian, no leading zeros
    nonce: i64,
    transactions: Vec<Transaction>,
}

impl Block {
    pub fn new_unsealed(
        pre_block_hash: &[u8],
        transactions: &[Transaction],
        difficulty: u32,
    ) -> Result<Block> {
        Self::with_timestamp(current_timestamp()?, pre_block_hash, transactions, difficulty)
    }

    pub fn with_timestamp(
        timestamp: i64,
        pre_block_hash: &[u8],
        transactions: &[Transaction],
        difficulty: u32,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let target = ProofOfWork::derive_target(difficulty)?.to_bytes_be();
        Ok(Block {
            timestamp,
            hash: vec![],
            pre_block_hash: pre_block_hash.to_vec(),
            target,
            nonce: 0,
            transactions: transactions.to_vec(),
        })
    }

    /// Build and seal in one step on the calling thread
    pub fn new_block(
        pre_block_hash: &[u8],
        transactions: &[Transaction],
        difficulty: u32,
    ) -> Result<Block> {
        let mut block = Block::new_unsealed(pre_block_hash, transactions, difficulty)?;
        block.mine(1, &AtomicBool::new(false))?;
        Ok(block)
    }

    pub fn generate_genesis_block(
        transaction: &Transaction,
        genesis_prev_hash: &[u8],
        difficulty: u32,
    ) -> Result<Block> {
        Block::new_block(genesis_prev_hash, std::slice::from_ref(transaction), difficulty)
    }

    /// Find a nonce and set the hash. A block can be sealed only once.
    pub fn mine(&mut self, workers: usize, cancel: &AtomicBool) -> Result<()> {
        if self.is_sealed() {
            return Err(BlockchainError::InvalidBlock(
                "Block is already sealed".to_string(),
            ));
        }

        let (nonce, hash) = {
            let pow = ProofOfWork::new_proof_of_work(self);
            pow.run_parallel(workers, cancel)?
        };
        self.nonce = nonce;
        self.hash = hash;
        info!(
            "Sealed block with {} transaction(s) at nonce {nonce}",
            self.transactions.len()
        );
        Ok(())
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

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_target(&self) -> &[u8] {
        self.target.as_slice()
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub fn is_sealed(&self) -> bool {
        !self.hash.is_empty()
    }

    /// Digest of the transaction ids concatenated in block order
    pub fn hash_transactions(&self) -> Vec<u8> {
        let mut txhashs = vec![];
        for transaction in &self.transactions {
            txhashs.extend(transaction.get_id());
        }
        sha256_digest(txhashs.as_slice())
    }

    /// Hash over the current fields and nonce
    pub fn compute_hash(&self) -> Vec<u8> {
        ProofOfWork::new_proof_of_work(self).hash_with_nonce(self.nonce)
    }

    /// The stored hash is what the fields produce
    pub fn verify_hash(&self) -> bool {
        self.is_sealed() && self.compute_hash() == self.hash
    }

    #[cfg(test)]
    pub(crate) fn set_nonce_for_test(&mut self, nonce: i64) {
        self.nonce = nonce;
    }

    #[cfg(test)]
    pub(crate) fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TXInput, TXOutput};

    fn base() -> Transaction {
        Transaction::new_base_tx("alice", 1000)
    }

    #[test]
    fn test_unsealed_block_state() {
        let block = Block::new_unsealed(b"genesis", &[base()], 4).unwrap();
        assert!(!block.is_sealed());
        assert!(block.get_hash().is_empty());
        assert_eq!(block.get_nonce(), 0);
        assert!(!block.verify_hash());
    }

    #[test]
    fn test_empty_block_rejected() {
        let result = Block::new_unsealed(b"genesis", &[], 4);
        assert!(matches!(result, Err(BlockchainError::InvalidBlock(_))));
    }

    #[test]
    fn test_sealed_block_hash_is_reproducible() {
        let block = Block::new_block(b"genesis", &[base()], 6).unwrap();
        assert!(block.is_sealed());
        assert_eq!(block.get_hash().len(), 32);
        assert!(block.verify_hash());
        assert!(ProofOfWork::validate(&block));
    }

    #[test]
    fn test_block_cannot_be_resealed() {
        let mut block = Block::new_block(b"genesis", &[base()], 4).unwrap();
        let result = block.mine(1, &AtomicBool::new(false));
        assert!(matches!(result, Err(BlockchainError::InvalidBlock(_))));
    }

    #[test]
    fn test_round_trip_unsealed_and_sealed() {
        let unsealed = Block::new_unsealed(&[], &[base()], 4).unwrap();
        let decoded = Block::deserialize(&unsealed.serialize().unwrap()).unwrap();
        assert_eq!(unsealed, decoded);
        assert!(decoded.get_hash().is_empty());
        assert!(decoded.get_pre_block_hash().is_empty());

        let sealed = Block::new_block(b"genesis", &[base()], 4).unwrap();
        let decoded = Block::deserialize(&sealed.serialize().unwrap()).unwrap();
        assert_eq!(sealed, decoded);
        assert!(decoded.verify_hash());
    }

    #[test]
    fn test_tampered_transaction_id_breaks_hash() {
        let mut block = Block::new_block(b"genesis", &[base()], 4).unwrap();
        let stored = block.get_hash().to_vec();

        let tx = block.transactions_mut().remove(0);
        let mut id = tx.get_id().to_vec();
        id[0] ^= 0x01;
        block.transactions_mut().push(tx.with_id(id));

        assert_ne!(block.compute_hash(), stored);
        assert!(!block.verify_hash());
    }

    #[test]
    fn test_transaction_order_is_part_of_identity() {
        let spend = Transaction::new(
            vec![TXInput::new(b"x", 0, "alice")],
            vec![TXOutput::new(1, "bob")],
        )
        .unwrap();
        let a = Block::with_timestamp(7, b"p", &[base(), spend.clone()], 4).unwrap();
        let b = Block::with_timestamp(7, b"p", &[spend, base()], 4).unwrap();
        assert_ne!(a.hash_transactions(), b.hash_transactions());
        assert_ne!(a.compute_hash(), b.compute_hash());
    }
}
