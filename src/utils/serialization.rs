// Record codec for everything the ledger persists.
// bincode 2 standard config; field order in the structs is the wire order.
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Decode a record, rejecting trailing bytes so that a truncated or padded
/// value never passes as valid.
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, read) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    if read != bytes.len() {
        return Err(BlockchainError::Serialization(format!(
            "Deserialization left {} trailing bytes",
            bytes.len() - read
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TXInput, TXOutput, Transaction};

    #[test]
    fn test_transaction_round_trip() {
        let tx = Transaction::new(
            vec![TXInput::new(&[7u8; 32], 0, "alice")],
            vec![TXOutput::new(400, "bob"), TXOutput::new(600, "alice")],
        )
        .unwrap();

        let bytes = serialize(&tx).expect("Serialization should work");
        let decoded: Transaction = deserialize(&bytes).expect("Deserialization should work");
        assert_eq!(tx, decoded);
    }

    #[test]
    fn test_zero_length_fields_survive() {
        let input = TXInput::new(&[], -1, "");
        let bytes = serialize(&input).unwrap();
        let decoded: TXInput = deserialize(&bytes).unwrap();
        assert_eq!(input, decoded);
        assert!(decoded.get_txid().is_empty());
        assert_eq!(decoded.get_from_address(), "");
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = serialize(&TXOutput::new(5, "bob")).unwrap();
        bytes.push(0);
        let result: Result<TXOutput> = deserialize(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let invalid_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<Transaction> = deserialize(&invalid_bytes);
        assert!(result.is_err());
    }
}
