//! # pow-ledger
//!
//! An append-only, hash-linked ledger of value transfers. Blocks are admitted
//! by proof-of-work and balances are resolved from unspent transaction outputs.
//!
//! ## Layout
//! - `core/`: blocks, transactions, nonce search and the sled-backed ledger store
//! - `storage/`: UTXO resolution over the stored chain
//! - `config/`: ledger parameters from TOML and the environment
//! - `utils/`: SHA-256, the canonical hash encoding and the record codec
//! - `cli/`: command-line interface
//!
//! ## Flow
//! `Transaction::new_utxo_transaction` asks `UTXOSet` for spendable outputs,
//! `Blockchain::mine_block` seals a block holding the result on the current
//! head, and `Blockchain::append` persists it and moves the head.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, Blockchain, BlockchainIterator, OutPoint, ProofOfWork, TXInput, TXOutput, Transaction,
};
pub use error::{BlockchainError, Result};
pub use storage::{UTXOSet, UnspentOutput};
pub use utils::{current_timestamp, sha256_digest};
