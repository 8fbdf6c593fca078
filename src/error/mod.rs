//! Error handling for the ledger
//!
//! Every fallible operation returns [`Result`]. Nothing in the library exits
//! the process; `main` is the only place an error turns into an exit code.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

#[derive(Debug, Clone, PartialEq)]
pub enum BlockchainError {
    /// Append attempted against a head that has moved on.
    /// Both hashes are lowercase hex.
    StaleHead { head: String, block_prev: String },
    /// The sender's unspent outputs don't cover the requested amount
    InsufficientFunds { required: u64, available: u64 },
    /// Nonce search ran past its bound without meeting the target
    NonceExhausted { limit: i64 },
    /// Nonce search was stopped through its cancellation flag
    MiningCancelled,
    /// Stored bytes failed to decode, or a block's hash doesn't match its contents
    CorruptRecord(String),
    /// Block validation errors
    InvalidBlock(String),
    /// Transaction validation errors
    Transaction(String),
    /// Database-related errors
    Database(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::StaleHead { head, block_prev } => write!(
                f,
                "Stale head: ledger head is {head} but block extends {block_prev}"
            ),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::NonceExhausted { limit } => {
                write!(f, "No valid nonce found below {limit}")
            }
            BlockchainError::MiningCancelled => write!(f, "Mining cancelled"),
            BlockchainError::CorruptRecord(msg) => write!(f, "Corrupt record: {msg}"),
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_head_message_names_both_hashes() {
        let err = BlockchainError::StaleHead {
            head: "aa".to_string(),
            block_prev: "bb".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aa"));
        assert!(msg.contains("bb"));
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = BlockchainError::InsufficientFunds {
            required: 601,
            available: 600,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: required 601, available 600"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BlockchainError = io.into();
        assert!(matches!(err, BlockchainError::Io(_)));
    }
}
