//! Core ledger functionality
//!
//! Blocks, transactions, proof-of-work sealing and the append-only ledger store.

pub mod block;
pub mod blockchain;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator};
pub use proof_of_work::{ProofOfWork, MAX_DIFFICULTY};
pub use transaction::{OutPoint, TXInput, TXOutput, Transaction, BASE_TX_ID, NO_SOURCE_INDEX};
