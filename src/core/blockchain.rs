// The ledger store: blocks keyed by hash in a sled tree, plus the head pointer.
// Blocks are only ever appended on top of the current head and read back newest-first.

use crate::config::Config;
use crate::core::{Block, OutPoint, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Tree};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock, RwLockReadGuard};

const TIP_BLOCK_HASH_KEY: &str = "lh"; // hash of the head block
const GENESIS_PREV_HASH_KEY: &str = "ogprevhash"; // pre_block_hash of genesis
const DIFFICULTY_KEY: &str = "difficulty"; // u32 big-endian, fixed at creation
const BLOCKS_TREE: &str = "blocks";

/// Handle to one ledger. Clones share the same database, head and lock.
#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<Vec<u8>>>,
    // write side: append; read side: multi-block reads that must not see a half-applied append
    ledger_lock: Arc<RwLock<()>>,
    og_prev_hash: Vec<u8>,
    db: Db,
    blocks: Tree,
    db_path: PathBuf,
    difficulty: u32,
    mining_threads: usize,
}

impl Blockchain {
    /// Create a new ledger whose genesis pays the initial supply to `genesis_address`.
    /// Fails if a ledger already exists at `config.data_dir`.
    pub fn create_blockchain(genesis_address: &str, config: &Config) -> Result<Blockchain> {
        config.validate()?;
        let (db, blocks) = Self::open_db(&config.data_dir)?;

        if blocks.get(TIP_BLOCK_HASH_KEY)?.is_some() {
            return Err(BlockchainError::Database(format!(
                "Blockchain already exists at {}",
                config.data_dir.display()
            )));
        }

        info!("Creating genesis block for address: {genesis_address}");
        let base_tx = Transaction::new_base_tx(genesis_address, config.initial_supply);
        let mut genesis = Block::new_unsealed(
            config.genesis_prev_hash_bytes(),
            std::slice::from_ref(&base_tx),
            config.difficulty,
        )?;
        genesis.mine(config.mining_threads, &AtomicBool::new(false))?;

        let genesis_data = genesis.serialize()?;
        blocks
            .transaction(|tx_db| {
                tx_db.insert(genesis.get_hash(), genesis_data.as_slice())?;
                tx_db.insert(TIP_BLOCK_HASH_KEY, genesis.get_hash())?;
                tx_db.insert(GENESIS_PREV_HASH_KEY, genesis.get_pre_block_hash())?;
                tx_db.insert(DIFFICULTY_KEY, &config.difficulty.to_be_bytes()[..])?;
                Ok(())
            })
            .map_err(|e: TransactionError| {
                BlockchainError::Database(format!("Failed to write genesis block: {e}"))
            })?;
        blocks.flush()?;
        info!("Genesis block {}", HEXLOWER.encode(genesis.get_hash()));

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(genesis.get_hash().to_vec())),
            ledger_lock: Arc::new(RwLock::new(())),
            og_prev_hash: genesis.get_pre_block_hash().to_vec(),
            db,
            blocks,
            db_path: config.data_dir.clone(),
            difficulty: config.difficulty,
            mining_threads: config.mining_threads,
        })
    }

    /// Open an existing ledger
    pub fn open(config: &Config) -> Result<Blockchain> {
        config.validate()?;
        let (db, blocks) = Self::open_db(&config.data_dir)?;

        let tip_hash = blocks.get(TIP_BLOCK_HASH_KEY)?.ok_or_else(|| {
            BlockchainError::Database(format!(
                "No existing blockchain found at {}. Create one first.",
                config.data_dir.display()
            ))
        })?;
        let og_prev_hash = blocks.get(GENESIS_PREV_HASH_KEY)?.ok_or_else(|| {
            BlockchainError::CorruptRecord("Genesis predecessor hash is missing".to_string())
        })?;
        let stored_difficulty = blocks
            .get(DIFFICULTY_KEY)?
            .and_then(|bytes| <[u8; 4]>::try_from(&bytes[..]).ok())
            .map(u32::from_be_bytes)
            .ok_or_else(|| {
                BlockchainError::CorruptRecord("Ledger difficulty is missing".to_string())
            })?;
        if stored_difficulty != config.difficulty {
            return Err(BlockchainError::Config(format!(
                "Ledger at {} was created with difficulty {stored_difficulty}, configured {}",
                config.data_dir.display(),
                config.difficulty
            )));
        }
        debug!("Opened ledger with head {}", HEXLOWER.encode(&tip_hash));

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash.to_vec())),
            ledger_lock: Arc::new(RwLock::new(())),
            og_prev_hash: og_prev_hash.to_vec(),
            db,
            blocks,
            db_path: config.data_dir.clone(),
            difficulty: config.difficulty,
            mining_threads: config.mining_threads,
        })
    }

    fn open_db(path: &Path) -> Result<(Db, Tree)> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        Ok((db, blocks))
    }

    pub fn get_db(&self) -> &Db {
        &self.db
    }

    pub fn get_db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_tip_hash(&self) -> Result<Vec<u8>> {
        self.tip_hash
            .read()
            .map(|tip| tip.clone())
            .map_err(|_| BlockchainError::Database("Head pointer lock poisoned".to_string()))
    }

    /// Predecessor hash recorded for the genesis block
    pub fn get_og_prev_hash(&self) -> &[u8] {
        self.og_prev_hash.as_slice()
    }

    /// Shared guard held by readers that walk the whole chain
    pub fn read_guard(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.ledger_lock
            .read()
            .map_err(|_| BlockchainError::Database("Ledger lock poisoned".to_string()))
    }

    /// Persist a sealed block on top of the current head.
    ///
    /// The head check and both writes happen in one sled transaction, so a
    /// rejected block leaves the ledger exactly as it was.
    pub fn append(&self, block: &Block) -> Result<()> {
        if !block.verify_hash() {
            return Err(BlockchainError::InvalidBlock(
                "Block is unsealed or its hash does not match its contents".to_string(),
            ));
        }
        if !ProofOfWork::validate(block) {
            return Err(BlockchainError::InvalidBlock(
                "Block hash does not meet its target".to_string(),
            ));
        }
        let expected_target = ProofOfWork::derive_target(self.difficulty)?.to_bytes_be();
        if block.get_target() != expected_target.as_slice() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block target does not match difficulty {}",
                self.difficulty
            )));
        }

        let block_data = block.serialize()?;
        let _guard = self
            .ledger_lock
            .write()
            .map_err(|_| BlockchainError::Database("Ledger lock poisoned".to_string()))?;

        self.blocks
            .transaction(|tx_db| {
                let head = tx_db.get(TIP_BLOCK_HASH_KEY)?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(BlockchainError::CorruptRecord(
                        "Head pointer is missing".to_string(),
                    ))
                })?;
                if &head[..] != block.get_pre_block_hash() {
                    return Err(ConflictableTransactionError::Abort(
                        BlockchainError::StaleHead {
                            head: HEXLOWER.encode(&head),
                            block_prev: HEXLOWER.encode(block.get_pre_block_hash()),
                        },
                    ));
                }
                tx_db.insert(block.get_hash(), block_data.as_slice())?;
                tx_db.insert(TIP_BLOCK_HASH_KEY, block.get_hash())?;
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => {
                    BlockchainError::Database(format!("Failed to append block: {e}"))
                }
            })?;
        self.blocks.flush()?;

        let mut tip = self
            .tip_hash
            .write()
            .map_err(|_| BlockchainError::Database("Head pointer lock poisoned".to_string()))?;
        *tip = block.get_hash().to_vec();
        info!("Appended block {}", HEXLOWER.encode(block.get_hash()));
        Ok(())
    }

    /// Verify, seal and append a block holding `transactions`
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        self.mine_block_with_cancel(transactions, &AtomicBool::new(false))
    }

    pub fn mine_block_with_cancel(
        &self,
        transactions: &[Transaction],
        cancel: &AtomicBool,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }
        for (i, transaction) in transactions.iter().enumerate() {
            self.verify_transaction(transaction).map_err(|e| {
                BlockchainError::Transaction(format!("Invalid transaction at index {i}: {e}"))
            })?;
        }
        Self::check_for_double_spending(transactions)?;

        let mut block =
            Block::new_unsealed(&self.get_tip_hash()?, transactions, self.difficulty)?;
        block.mine(self.mining_threads, cancel)?;
        self.append(&block)?;
        Ok(block)
    }

    /// Walk from head back to genesis
    pub fn iterator(&self) -> Result<BlockchainIterator> {
        Ok(BlockchainIterator::new(
            self.get_tip_hash()?,
            self.og_prev_hash.clone(),
            self.blocks.clone(),
        ))
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        match self.blocks.get(block_hash)? {
            Some(bytes) => load_block(block_hash, bytes.as_ref()).map(Some),
            None => Ok(None),
        }
    }

    /// Height of the head, genesis being 0
    pub fn get_best_height(&self) -> Result<usize> {
        let _guard = self.read_guard()?;
        let mut count = 0usize;
        for block in self.iterator()? {
            block?;
            count += 1;
        }
        Ok(count.saturating_sub(1))
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Result<Option<Transaction>> {
        let _guard = self.read_guard()?;
        for block in self.iterator()? {
            let block = block?;
            for transaction in block.get_transactions() {
                if txid.eq(transaction.get_id()) {
                    return Ok(Some(transaction.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Check a non-base transaction against the ledger: its id is genuine,
    /// every input names an existing, unspent output owned by the input's
    /// sender, and inputs cover outputs.
    pub fn verify_transaction(&self, transaction: &Transaction) -> Result<()> {
        if transaction.is_base() {
            return Err(BlockchainError::Transaction(
                "Base transactions are only valid at genesis".to_string(),
            ));
        }
        if !transaction.has_valid_id() {
            return Err(BlockchainError::Transaction(
                "Transaction id does not match its contents".to_string(),
            ));
        }

        let mut wanted: HashSet<OutPoint> = HashSet::new();
        for input in transaction.get_vin() {
            let outpoint = input.outpoint().ok_or_else(|| {
                BlockchainError::Transaction(format!(
                    "Input has invalid output index {}",
                    input.get_out_idx()
                ))
            })?;
            if !wanted.insert(outpoint.clone()) {
                return Err(BlockchainError::Transaction(format!(
                    "Output {}:{} spent twice by one transaction",
                    HEXLOWER.encode(&outpoint.txid),
                    outpoint.index
                )));
            }
        }
        let wanted_txids: HashSet<&[u8]> = wanted.iter().map(|o| o.txid.as_slice()).collect();

        // One walk: collect the source transactions and any earlier spends.
        let mut sources: HashMap<Vec<u8>, Transaction> = HashMap::new();
        {
            let _guard = self.read_guard()?;
            for block in self.iterator()? {
                let block = block?;
                for tx in block.get_transactions() {
                    if wanted_txids.contains(tx.get_id()) {
                        sources.insert(tx.get_id().to_vec(), tx.clone());
                    }
                    if tx.is_base() {
                        continue;
                    }
                    for input in tx.get_vin() {
                        if let Some(spent) = input.outpoint() {
                            if wanted.contains(&spent) {
                                return Err(BlockchainError::Transaction(format!(
                                    "Input already spent: {}:{}",
                                    HEXLOWER.encode(&spent.txid),
                                    spent.index
                                )));
                            }
                        }
                    }
                }
            }
        }

        let mut input_total: u64 = 0;
        for input in transaction.get_vin() {
            let source = sources.get(input.get_txid()).ok_or_else(|| {
                BlockchainError::Transaction(format!(
                    "Referenced transaction not found: {}",
                    HEXLOWER.encode(input.get_txid())
                ))
            })?;
            let output = usize::try_from(input.get_out_idx())
                .ok()
                .and_then(|idx| source.get_vout().get(idx))
                .ok_or_else(|| {
                    BlockchainError::Transaction(format!(
                        "Invalid output index {} for {}",
                        input.get_out_idx(),
                        HEXLOWER.encode(input.get_txid())
                    ))
                })?;
            if !output.is_locked_to(input.get_from_address()) {
                return Err(BlockchainError::Transaction(format!(
                    "Output {}:{} does not belong to {}",
                    HEXLOWER.encode(input.get_txid()),
                    input.get_out_idx(),
                    input.get_from_address()
                )));
            }
            input_total = input_total.checked_add(output.get_value()).ok_or_else(|| {
                BlockchainError::Transaction("Input total overflows u64".to_string())
            })?;
        }

        let output_total = transaction.output_total()?;
        if input_total < output_total {
            return Err(BlockchainError::Transaction(format!(
                "Outputs ({output_total}) exceed inputs ({input_total})"
            )));
        }
        Ok(())
    }

    // The same output may not be consumed by two transactions in one candidate block
    fn check_for_double_spending(transactions: &[Transaction]) -> Result<()> {
        let mut spent_outputs: HashSet<OutPoint> = HashSet::new();

        for (tx_index, transaction) in transactions.iter().enumerate() {
            if transaction.is_base() {
                continue;
            }
            for input in transaction.get_vin() {
                if let Some(outpoint) = input.outpoint() {
                    if spent_outputs.contains(&outpoint) {
                        return Err(BlockchainError::Transaction(format!(
                            "Double-spending detected in transaction {}: output {}:{} already spent in this block",
                            tx_index,
                            HEXLOWER.encode(&outpoint.txid),
                            outpoint.index
                        )));
                    }
                    spent_outputs.insert(outpoint);
                }
            }
        }
        Ok(())
    }

    /// Walk the whole chain checking every hash, PoW, target and transaction id.
    /// Returns the number of blocks.
    pub fn verify_chain(&self) -> Result<usize> {
        let expected_target = ProofOfWork::derive_target(self.difficulty)?.to_bytes_be();
        let _guard = self.read_guard()?;
        let mut count = 0usize;
        let mut last_prev: Option<Vec<u8>> = None;
        // the iterator has already checked hashes and transaction ids
        for block in self.iterator()? {
            let block = block?;
            if !ProofOfWork::validate(&block) {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Block {} fails proof-of-work",
                    HEXLOWER.encode(block.get_hash())
                )));
            }
            if block.get_target() != expected_target.as_slice() {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Block {} target does not match difficulty {}",
                    HEXLOWER.encode(block.get_hash()),
                    self.difficulty
                )));
            }
            last_prev = Some(block.get_pre_block_hash().to_vec());
            count += 1;
        }
        if last_prev.as_deref() != Some(self.og_prev_hash.as_slice()) {
            warn!("Chain walk did not end at the recorded genesis");
            return Err(BlockchainError::CorruptRecord(
                "Chain does not end at genesis".to_string(),
            ));
        }
        Ok(count)
    }
}

// Decode a stored block and check it is the block its key names, down to
// every transaction body matching its id
fn load_block(key: &[u8], bytes: &[u8]) -> Result<Block> {
    let block = Block::deserialize(bytes).map_err(|e| {
        BlockchainError::CorruptRecord(format!(
            "Block {} failed to decode: {e}",
            HEXLOWER.encode(key)
        ))
    })?;
    if block.get_hash() != key || !block.verify_hash() {
        return Err(BlockchainError::CorruptRecord(format!(
            "Block {} does not hash to its key",
            HEXLOWER.encode(key)
        )));
    }
    if let Some(tx) = block.get_transactions().iter().find(|tx| !tx.has_valid_id()) {
        return Err(BlockchainError::CorruptRecord(format!(
            "Transaction {} in block {} does not match its id",
            HEXLOWER.encode(tx.get_id()),
            HEXLOWER.encode(key)
        )));
    }
    Ok(block)
}

/// Newest-to-oldest walk over the ledger.
///
/// Ends after genesis. On a missing or corrupt block it yields one error and
/// then ends, so nothing past a broken link is ever returned.
pub struct BlockchainIterator {
    blocks: Tree,
    current_hash: Option<Vec<u8>>,
    og_prev_hash: Vec<u8>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, og_prev_hash: Vec<u8>, blocks: Tree) -> BlockchainIterator {
        BlockchainIterator {
            blocks,
            current_hash: Some(tip_hash),
            og_prev_hash,
        }
    }

    fn load(&self, hash: &[u8]) -> Result<Block> {
        let data = self.blocks.get(hash)?.ok_or_else(|| {
            BlockchainError::CorruptRecord(format!(
                "Block {} is referenced but missing",
                HEXLOWER.encode(hash)
            ))
        })?;
        load_block(hash, data.as_ref())
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current_hash.take()?;
        match self.load(&hash) {
            Ok(block) => {
                if block.get_pre_block_hash() != self.og_prev_hash.as_slice() {
                    self.current_hash = Some(block.get_pre_block_hash().to_vec());
                }
                Some(Ok(block))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
