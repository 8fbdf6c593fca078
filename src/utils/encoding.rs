//! Canonical byte encoding for hashing
//!
//! Transaction ids and block hashes are digests over bytes produced here, so
//! the layout is part of the ledger format:
//!
//! - integers are fixed width and **big-endian** (`i64`/`u64` take 8 bytes)
//! - variable-length byte strings carry a big-endian `u64` length prefix
//! - sequences carry a big-endian `u64` element count
//!
//! Changing any of these rules changes every id and hash on the ledger.

/// Append-only buffer that writes values in the canonical layout
#[derive(Debug, Default)]
pub struct HashEncoder {
    buf: Vec<u8>,
}

impl HashEncoder {
    pub fn new() -> HashEncoder {
        HashEncoder { buf: Vec::new() }
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Length-prefixed byte string
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_u64(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn put_str(&mut self, s: &str) -> &mut Self {
        self.put_bytes(s.as_bytes())
    }

    /// Element count prefix for a sequence that follows
    pub fn put_len(&mut self, len: usize) -> &mut Self {
        self.put_u64(len as u64)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Fixed-width big-endian encoding of an `i64`
pub fn encode_i64(value: i64) -> [u8; 8] {
    value.to_be_bytes()
}
