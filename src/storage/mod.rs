//! Derived ledger state
//!
//! Unspent outputs are recomputed from the chain on every query.

pub mod utxo_set;

pub use utxo_set::{UTXOSet, UnspentOutput};
