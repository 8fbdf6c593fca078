use crate::core::proof_of_work::MAX_DIFFICULTY;
use crate::error::{BlockchainError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Process-wide configuration: `LEDGER_CONFIG` file (if set) plus env overrides.
/// A bad file or variable stays an error here; nothing falls back to defaults.
/// The ledger itself never reads this; callers pass a `Config` explicitly.
pub static GLOBAL_CONFIG: Lazy<Result<Config>> = Lazy::new(Config::from_env);

const CONFIG_PATH_KEY: &str = "LEDGER_CONFIG";
const DATA_DIR_KEY: &str = "LEDGER_DATA_DIR";
const DIFFICULTY_KEY: &str = "LEDGER_DIFFICULTY";
const MINING_THREADS_KEY: &str = "LEDGER_MINING_THREADS";

const DEFAULT_DATA_DIR: &str = "./tmp/blocks";
const DEFAULT_DIFFICULTY: u32 = 12;
const DEFAULT_INITIAL_SUPPLY: u64 = 1000;
const DEFAULT_GENESIS_PREV_HASH: &str = "genesis";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory of the sled database
    pub data_dir: PathBuf,
    /// Leading zero bits required of a block hash
    pub difficulty: u32,
    /// Value of the single output of the base transaction
    pub initial_supply: u64,
    /// Stands in for the predecessor hash of the genesis block
    pub genesis_prev_hash: String,
    /// Threads used for nonce search
    pub mining_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            difficulty: DEFAULT_DIFFICULTY,
            initial_supply: DEFAULT_INITIAL_SUPPLY,
            genesis_prev_hash: DEFAULT_GENESIS_PREV_HASH.to_string(),
            mining_threads: 1,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path).map_err(|e| {
            BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Defaults, or the file named by `LEDGER_CONFIG`, then env overrides
    pub fn from_env() -> Result<Config> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match lookup(CONFIG_PATH_KEY) {
            Some(path) => Config::load(Path::new(&path))?,
            None => Config::default(),
        };
        base.with_overrides(lookup)
    }

    /// Apply `LEDGER_*` overrides looked up through `lookup`
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(bits) = lookup(DIFFICULTY_KEY) {
            self.difficulty = bits.parse().map_err(|e| {
                BlockchainError::Config(format!("{DIFFICULTY_KEY}={bits} is not a number: {e}"))
            })?;
        }
        if let Some(threads) = lookup(MINING_THREADS_KEY) {
            self.mining_threads = threads.parse().map_err(|e| {
                BlockchainError::Config(format!(
                    "{MINING_THREADS_KEY}={threads} is not a number: {e}"
                ))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "difficulty must be at most {MAX_DIFFICULTY}, got {}",
                self.difficulty
            )));
        }
        if self.mining_threads == 0 {
            return Err(BlockchainError::Config(
                "mining_threads must be at least 1".to_string(),
            ));
        }
        if self.genesis_prev_hash.is_empty() {
            return Err(BlockchainError::Config(
                "genesis_prev_hash must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn genesis_prev_hash_bytes(&self) -> &[u8] {
        self.genesis_prev_hash.as_bytes()
    }
}
