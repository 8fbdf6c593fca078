// Value transfers: inputs consume earlier outputs, outputs assign value to an address.
// A transaction's id is a digest of its inputs and outputs, fixed once at construction.

use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use crate::utils::{sha256_digest, HashEncoder};
use log::debug;
use serde::{Deserialize, Serialize};

/// Id of the base transaction. A fixed marker rather than a digest.
pub const BASE_TX_ID: &[u8] = b"ledger-base-transaction";

/// `out_idx` carried by the single input of the base transaction
pub const NO_SOURCE_INDEX: i64 = -1;

/// A reference to one output of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Vec<u8>,
    pub index: usize,
}

impl OutPoint {
    pub fn new(txid: &[u8], index: usize) -> OutPoint {
        OutPoint {
            txid: txid.to_vec(),
            index,
        }
    }
}

// "I spend output #out_idx of transaction txid, and it was mine (from_address)"
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXInput {
    txid: Vec<u8>,
    out_idx: i64,
    from_address: String,
}

impl TXInput {
    pub fn new(txid: &[u8], out_idx: i64, from_address: &str) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            out_idx,
            from_address: from_address.to_string(),
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_out_idx(&self) -> i64 {
        self.out_idx
    }

    pub fn get_from_address(&self) -> &str {
        self.from_address.as_str()
    }

    pub fn from_address_matches(&self, address: &str) -> bool {
        self.from_address == address
    }

    /// The output this input consumes, or `None` for the base input
    pub fn outpoint(&self) -> Option<OutPoint> {
        usize::try_from(self.out_idx)
            .ok()
            .map(|index| OutPoint::new(&self.txid, index))
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXOutput {
    value: u64,
    to_address: String,
}

impl TXOutput {
    pub fn new(value: u64, to_address: &str) -> TXOutput {
        TXOutput {
            value,
            to_address: to_address.to_string(),
        }
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_to_address(&self) -> &str {
        self.to_address.as_str()
    }

    pub fn is_locked_to(&self, address: &str) -> bool {
        self.to_address == address
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Build a transaction from finished inputs and outputs; the id is computed last.
    pub fn new(vin: Vec<TXInput>, vout: Vec<TXOutput>) -> Result<Transaction> {
        if vin.is_empty() {
            return Err(BlockchainError::Transaction(
                "Transaction must have at least one input".to_string(),
            ));
        }
        if vout.is_empty() {
            return Err(BlockchainError::Transaction(
                "Transaction must have at least one output".to_string(),
            ));
        }

        let mut tx = Transaction {
            id: vec![],
            vin,
            vout,
        };
        tx.id = tx.compute_id();
        Ok(tx)
    }

    /// The transaction that creates the initial supply at genesis
    pub fn new_base_tx(to: &str, initial_supply: u64) -> Transaction {
        Transaction {
            id: BASE_TX_ID.to_vec(),
            vin: vec![TXInput::new(&[], NO_SOURCE_INDEX, "")],
            vout: vec![TXOutput::new(initial_supply, to)],
        }
    }

    /// Spend `amount` from `from` to `to` using outputs the UTXO set resolves.
    /// Any surplus goes back to `from` as a second output.
    pub fn new_utxo_transaction(
        from: &str,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Amount must be positive".to_string(),
            ));
        }

        let (accumulated, valid_outputs) = utxo_set.find_spendable_outputs(from, amount)?;
        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = Vec::with_capacity(valid_outputs.len());
        for outpoint in &valid_outputs {
            let out_idx = i64::try_from(outpoint.index).map_err(|_| {
                BlockchainError::Transaction(format!(
                    "Output index {} out of range",
                    outpoint.index
                ))
            })?;
            inputs.push(TXInput::new(&outpoint.txid, out_idx, from));
        }

        let mut outputs = vec![TXOutput::new(amount, to)];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TXOutput::new(change, from));
        }

        debug!(
            "Built transaction {from} -> {to}: amount {amount}, change {change}, {} inputs",
            inputs.len()
        );
        Transaction::new(inputs, outputs)
    }

    /// Digest of the canonical encoding of inputs then outputs. The id field
    /// itself is not part of the preimage.
    pub fn compute_id(&self) -> Vec<u8> {
        let mut enc = HashEncoder::new();
        enc.put_len(self.vin.len());
        for input in &self.vin {
            enc.put_bytes(&input.txid)
                .put_i64(input.out_idx)
                .put_str(&input.from_address);
        }
        enc.put_len(self.vout.len());
        for output in &self.vout {
            enc.put_u64(output.value).put_str(&output.to_address);
        }
        sha256_digest(&enc.finish())
    }

    pub fn is_base(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].out_idx == NO_SOURCE_INDEX
    }

    /// True when the stored id is the one this transaction should carry
    pub fn has_valid_id(&self) -> bool {
        if self.is_base() {
            self.id == BASE_TX_ID
        } else {
            self.id == self.compute_id()
        }
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn output_total(&self) -> Result<u64> {
        self.vout.iter().try_fold(0u64, |acc, out| {
            acc.checked_add(out.value).ok_or_else(|| {
                BlockchainError::Transaction("Output total overflows u64".to_string())
            })
        })
    }

    /// Overwrite the id without recomputing it
    #[cfg(test)]
    pub(crate) fn with_id(mut self, id: Vec<u8>) -> Transaction {
        self.id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> Transaction {
        Transaction::new(
            vec![TXInput::new(BASE_TX_ID, 0, "alice")],
            vec![TXOutput::new(400, "bob"), TXOutput::new(600, "alice")],
        )
        .unwrap()
    }

    #[test]
    fn test_base_transaction_shape() {
        let tx = Transaction::new_base_tx("alice", 1000);
        assert!(tx.is_base());
        assert_eq!(tx.get_id(), BASE_TX_ID);
        assert_eq!(tx.get_vout().len(), 1);
        assert_eq!(tx.get_vout()[0].get_value(), 1000);
        assert!(tx.get_vout()[0].is_locked_to("alice"));
        assert!(tx.get_vin()[0].outpoint().is_none());
        assert!(tx.has_valid_id());
    }

    #[test]
    fn test_regular_transaction_is_not_base() {
        let tx = transfer();
        assert!(!tx.is_base());
        assert_eq!(tx.get_id().len(), 32);
        assert!(tx.has_valid_id());
    }

    #[test]
    fn test_single_input_with_real_index_is_not_base() {
        let tx = Transaction::new(
            vec![TXInput::new(&[1u8; 32], 0, "alice")],
            vec![TXOutput::new(1, "bob")],
        )
        .unwrap();
        assert!(!tx.is_base());
    }

    #[test]
    fn test_compute_id_is_idempotent() {
        let tx = transfer();
        assert_eq!(tx.compute_id(), tx.compute_id());
        assert_eq!(tx.compute_id(), tx.get_id());
    }

    #[test]
    fn test_id_excludes_id_field() {
        let tx = transfer();
        let relabelled = tx.clone().with_id(b"something else".to_vec());
        assert_eq!(tx.compute_id(), relabelled.compute_id());
        assert!(!relabelled.has_valid_id());
    }

    #[test]
    fn test_id_depends_on_output_order() {
        let swapped = Transaction::new(
            vec![TXInput::new(BASE_TX_ID, 0, "alice")],
            vec![TXOutput::new(600, "alice"), TXOutput::new(400, "bob")],
        )
        .unwrap();
        assert_ne!(transfer().get_id(), swapped.get_id());
    }

    #[test]
    fn test_empty_sides_rejected() {
        assert!(Transaction::new(vec![], vec![TXOutput::new(1, "bob")]).is_err());
        assert!(Transaction::new(vec![TXInput::new(&[1], 0, "a")], vec![]).is_err());
    }

    #[test]
    fn test_output_total() {
        assert_eq!(transfer().output_total().unwrap(), 1000);

        let overflow = Transaction::new(
            vec![TXInput::new(&[1], 0, "a")],
            vec![TXOutput::new(u64::MAX, "b"), TXOutput::new(1, "c")],
        )
        .unwrap();
        assert!(overflow.output_total().is_err());
    }
}
