//! Utility functions and helpers
//!
//! Hashing, the canonical hash encoding, and the record codec used by the
//! ledger store.

pub mod crypto;
pub mod encoding;
pub mod serialization;

pub use crypto::{current_timestamp, sha256_digest, HASH_LEN};
pub use encoding::{encode_i64, HashEncoder};
pub use serialization::{deserialize, serialize};
