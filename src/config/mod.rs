//! Configuration management
//!
//! Ledger parameters (storage location, PoW difficulty, initial supply) come
//! from a TOML file and `LEDGER_*` environment variables.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};
