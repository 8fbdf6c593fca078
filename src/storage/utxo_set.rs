use crate::core::{Blockchain, OutPoint, TXOutput};
use crate::error::{BlockchainError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An output nobody has spent yet, with its location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub output: TXOutput,
}

/// Resolves unspent outputs by walking the ledger. Nothing is cached; every
/// query sees the chain as of its own walk.
pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    /// Outputs paying `address` that no newer input from `address` consumes.
    ///
    /// The walk runs newest block first and, inside a block, last transaction
    /// first. A spend always comes after the output it spends, so by the time
    /// an output is reached every spend of it has been recorded.
    pub fn find_unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        let _guard = self.blockchain.read_guard()?;
        let mut spent: HashSet<OutPoint> = HashSet::new();
        let mut unspent = vec![];

        for block in self.blockchain.iterator()? {
            let block = block?;
            for tx in block.get_transactions().iter().rev() {
                for (idx, out) in tx.get_vout().iter().enumerate() {
                    if !out.is_locked_to(address) {
                        continue;
                    }
                    let outpoint = OutPoint::new(tx.get_id(), idx);
                    if spent.contains(&outpoint) {
                        continue;
                    }
                    unspent.push(UnspentOutput {
                        outpoint,
                        output: out.clone(),
                    });
                }

                // the base input points at nothing
                if tx.is_base() {
                    continue;
                }
                for input in tx.get_vin() {
                    if input.from_address_matches(address) {
                        if let Some(outpoint) = input.outpoint() {
                            spent.insert(outpoint);
                        }
                    }
                }
            }
        }

        debug!("{} unspent output(s) for {address}", unspent.len());
        Ok(unspent)
    }

    /// Pick unspent outputs of `address` until they cover `amount`.
    ///
    /// Takes at most one output per source transaction. When funds run short
    /// the partial sum comes back; callers treat `sum < amount` as failure.
    pub fn find_spendable_outputs(&self, address: &str, amount: u64) -> Result<(u64, Vec<OutPoint>)> {
        let mut accumulated: u64 = 0;
        let mut chosen = vec![];
        let mut used_txids: HashSet<Vec<u8>> = HashSet::new();

        for utxo in self.find_unspent_outputs(address)? {
            if accumulated >= amount {
                break;
            }
            if !used_txids.insert(utxo.outpoint.txid.clone()) {
                continue;
            }
            accumulated = accumulated.checked_add(utxo.output.get_value()).ok_or_else(|| {
                BlockchainError::Transaction("Accumulated value overflows u64".to_string())
            })?;
            chosen.push(utxo.outpoint);
        }
        Ok((accumulated, chosen))
    }

    pub fn get_balance(&self, address: &str) -> Result<u64> {
        self.find_unspent_outputs(address)?
            .iter()
            .try_fold(0u64, |acc, utxo| acc.checked_add(utxo.output.get_value()))
            .ok_or_else(|| BlockchainError::Transaction("Balance overflows u64".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Block, TXInput, Transaction, BASE_TX_ID};
    use crate::testnet::test_utils::{create_test_blockchain, send_and_mine, GENESIS_ADDRESS};

    #[test]
    fn test_genesis_output_is_spendable() {
        let (blockchain, _dir) = create_test_blockchain().unwrap();
        let utxo_set = UTXOSet::new(blockchain);

        let (sum, outs) = utxo_set.find_spendable_outputs(GENESIS_ADDRESS, 400).unwrap();
        assert_eq!(sum, 1000);
        assert_eq!(outs, vec![OutPoint::new(BASE_TX_ID, 0)]);
        assert_eq!(utxo_set.get_balance(GENESIS_ADDRESS).unwrap(), 1000);
        assert_eq!(utxo_set.get_balance("nobody").unwrap(), 0);
    }

    #[test]
    fn test_spent_output_disappears() {
        let (blockchain, _dir) = create_test_blockchain().unwrap();
        let block = send_and_mine(&blockchain, GENESIS_ADDRESS, "bob", 400).unwrap();
        let txid = block.get_transactions()[0].get_id().to_vec();
        let utxo_set = UTXOSet::new(blockchain);

        let alice = utxo_set.find_unspent_outputs(GENESIS_ADDRESS).unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].outpoint, OutPoint::new(&txid, 1));
        assert_eq!(alice[0].output.get_value(), 600);

        let bob = utxo_set.find_unspent_outputs("bob").unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].outpoint, OutPoint::new(&txid, 0));
        assert_eq!(bob[0].output.get_value(), 400);
    }

    #[test]
    fn test_insufficient_funds_partial_sum() {
        let (blockchain, _dir) = create_test_blockchain().unwrap();
        let utxo_set = UTXOSet::new(blockchain);
        let (sum, outs) = utxo_set.find_spendable_outputs(GENESIS_ADDRESS, 5000).unwrap();
        assert_eq!(sum, 1000);
        assert_eq!(outs.len(), 1);
    }

    #[test]
    fn test_spend_in_same_block_is_seen() {
        let (blockchain, _dir) = create_test_blockchain().unwrap();
        let first = Transaction::new(
            vec![TXInput::new(BASE_TX_ID, 0, GENESIS_ADDRESS)],
            vec![TXOutput::new(400, "bob"), TXOutput::new(600, GENESIS_ADDRESS)],
        )
        .unwrap();
        let second = Transaction::new(
            vec![TXInput::new(first.get_id(), 0, "bob")],
            vec![TXOutput::new(100, "carol"), TXOutput::new(300, "bob")],
        )
        .unwrap();

        // append directly: mine_block would verify `second` against the chain
        // before `first` is on it
        let tip = blockchain.get_tip_hash().unwrap();
        let block = Block::new_block(&tip, &[first, second.clone()], blockchain.get_difficulty())
            .unwrap();
        blockchain.append(&block).unwrap();

        let utxo_set = UTXOSet::new(blockchain);
        let bob = utxo_set.find_unspent_outputs("bob").unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].outpoint, OutPoint::new(second.get_id(), 1));
        assert_eq!(utxo_set.get_balance("carol").unwrap(), 100);
    }

    #[test]
    fn test_one_output_per_transaction_selected() {
        let (blockchain, _dir) = create_test_blockchain().unwrap();
        let split = Transaction::new(
            vec![TXInput::new(BASE_TX_ID, 0, GENESIS_ADDRESS)],
            vec![TXOutput::new(300, "bob"), TXOutput::new(700, "bob")],
        )
        .unwrap();
        blockchain.mine_block(&[split]).unwrap();
        let utxo_set = UTXOSet::new(blockchain);

        assert_eq!(utxo_set.find_unspent_outputs("bob").unwrap().len(), 2);
        assert_eq!(utxo_set.get_balance("bob").unwrap(), 1000);

        let (sum, outs) = utxo_set.find_spendable_outputs("bob", 1000).unwrap();
        assert_eq!(outs.len(), 1);
        assert_eq!(sum, 300);
    }
}
