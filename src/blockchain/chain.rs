use chrono::{Duration, Utc};
use log::{info, warn};
use thiserror::Error;

use std::collections::BTreeMap;

use super::block::{Block, BlockError};
use super::crypto::{Address, Wallet};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction rejected: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Block {index}: stored hash does not match its recomputation")]
    HashMismatch { index: usize },

    #[error("Block {index}: previous-hash link broken")]
    ChainLinkBroken { index: usize },

    #[error("Block {index}: {source}")]
    InvalidBlock {
        index: usize,
        #[source]
        source: BlockError,
    },
}

/// How `add_block` runs the proof-of-work search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerMode {
    /// Single-threaded, nonce-ascending; deterministic
    Simple,
    /// Nonce space sharded across worker threads
    Parallel { workers: usize },
}

/// Everything the ledger needs at construction time. The mint authority is
/// an explicit input here, never a process-wide constant.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Initial number of leading zero hex digits required of block hashes
    pub difficulty: u32,

    /// Target wall-clock gap between blocks; drives difficulty adjustment
    pub block_time: Duration,

    /// Base reward paid to the miner of each block, before collected gas
    pub reward: u64,

    /// The coin-issuance authority's keypair
    pub mint: Wallet,

    /// Recipient of the genesis issuance
    pub premine_to: Address,

    /// Amount issued in the genesis block
    pub premine_amount: u64,

    /// Mining tier used by `add_block`
    pub miner: MinerMode,
}

impl ChainConfig {
    pub fn new(mint: Wallet, premine_to: Address) -> Self {
        ChainConfig {
            difficulty: 1,
            block_time: Duration::milliseconds(30_000),
            reward: 297,
            mint,
            premine_to,
            premine_amount: 100_000_000,
            miner: MinerMode::Simple,
        }
    }
}

/// The ledger: an append-only chain of blocks plus the pool of transactions
/// waiting to be mined.
///
/// A plain single-writer value. Callers that share it across threads wrap
/// the whole ledger in one lock; only the mining search itself is internally
/// parallel. Appended blocks are only ever handed out by reference, so they
/// cannot be mutated from outside.
#[derive(Debug)]
pub struct Blockchain {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    difficulty: u32,
    block_time: Duration,
    reward: u64,
    mint: Wallet,
    miner: MinerMode,
}

impl Blockchain {
    /// Creates a new ledger whose genesis block issues the premine to the
    /// configured initial holder. Genesis carries no proof of work and an
    /// empty previous hash.
    pub fn new(config: ChainConfig) -> Self {
        let issuance = Transaction::new_signed(
            &config.mint,
            config.premine_to.clone(),
            config.premine_amount,
            0,
        );
        let genesis = Block::new(Utc::now(), vec![issuance]);

        info!(
            "genesis block {} issues {} to {}",
            genesis.hash, config.premine_amount, config.premine_to
        );

        Blockchain {
            chain: vec![genesis],
            pending: Vec::new(),
            difficulty: config.difficulty.max(1),
            block_time: config.block_time,
            reward: config.reward,
            mint: config.mint,
            miner: config.miner,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn last_block(&self) -> &Block {
        // The chain is never empty: genesis is created in the constructor
        // and blocks are only appended.
        &self.chain[self.chain.len() - 1]
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn reward(&self) -> u64 {
        self.reward
    }

    pub fn mint_address(&self) -> &Address {
        self.mint.address()
    }

    /// Validates `transaction` against the current chain state and, on
    /// success, appends it to the pending pool. On failure the pool is left
    /// untouched and the violated invariant is reported to the caller.
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<(), BlockchainError> {
        transaction.validate(self)?;

        info!(
            "accepted transaction of {} (+{} gas) from {} to {}",
            transaction.amount, transaction.gas, transaction.from, transaction.to
        );
        self.pending.push(transaction);

        Ok(())
    }

    /// Bundles the pending pool plus a freshly minted reward transaction
    /// into a new block, mines it and appends it. The reward pays the base
    /// reward plus all gas collected from the batch to `reward_to`. The
    /// pool is cleared only after the block is appended.
    ///
    /// Pending entries are re-validated here; balances may have shifted
    /// since insertion, and entries that no longer validate are dropped.
    pub fn mine_pending(&mut self, reward_to: &Address) -> Result<&Block, BlockchainError> {
        let mut batch = Vec::with_capacity(self.pending.len());
        for transaction in &self.pending {
            match transaction.validate(self) {
                Ok(()) => batch.push(transaction.clone()),
                Err(err) => warn!(
                    "dropping stale pending transaction from {}: {}",
                    transaction.from, err
                ),
            }
        }

        let total_gas: u64 = batch.iter().map(|tx| tx.gas).sum();
        let reward_tx = Transaction::new_signed(
            &self.mint,
            reward_to.clone(),
            self.reward.saturating_add(total_gas),
            0,
        );

        let mut transactions = Vec::with_capacity(batch.len() + 1);
        transactions.push(reward_tx);
        transactions.extend(batch);

        self.add_block(Block::new(Utc::now(), transactions))?;
        self.pending.clear();

        Ok(self.last_block())
    }

    /// Links `block` to the current tip, mines it at the current difficulty
    /// and appends it. Afterwards the difficulty moves one step towards the
    /// block-time target: +1 when the gap to the previous block was shorter
    /// than the target, -1 otherwise, never below 1.
    pub fn add_block(&mut self, mut block: Block) -> Result<(), BlockchainError> {
        block.prev_hash = self.last_block().hash.clone();
        block.hash = block.compute_hash();

        match self.miner {
            MinerMode::Simple => block.mine(self.difficulty),
            MinerMode::Parallel { workers } => block.mine_parallel(self.difficulty, workers),
        }

        let previous_timestamp = self.last_block().timestamp;

        info!(
            "appending block {} at height {} (difficulty {})",
            block.hash,
            self.chain.len(),
            self.difficulty
        );
        self.chain.push(block);

        if Utc::now() - previous_timestamp < self.block_time {
            self.difficulty += 1;
        } else {
            self.difficulty = self.difficulty.saturating_sub(1).max(1);
        }

        Ok(())
    }

    /// Replays every transaction in every block: debits `amount + gas`
    /// where `address` is the sender, credits `amount` where it is the
    /// recipient. O(total transactions) per call; there is no cached index.
    /// The mint's balance is negative by construction.
    pub fn balance_of(&self, address: &Address) -> i64 {
        let mut balance: i64 = 0;

        for block in &self.chain {
            for transaction in &block.transactions {
                if &transaction.from == address {
                    balance -= transaction.amount.saturating_add(transaction.gas) as i64;
                }
                if &transaction.to == address {
                    balance += transaction.amount as i64;
                }
            }
        }

        balance
    }

    /// Replay-derived balances of every address that appears on the chain
    pub fn balances(&self) -> BTreeMap<String, i64> {
        let mut balances: BTreeMap<String, i64> = BTreeMap::new();

        for block in &self.chain {
            for transaction in &block.transactions {
                *balances.entry(transaction.from.0.clone()).or_default() -=
                    transaction.amount.saturating_add(transaction.gas) as i64;
                *balances.entry(transaction.to.0.clone()).or_default() +=
                    transaction.amount as i64;
            }
        }

        balances
    }

    /// Validates every block from index 1 to the tip: the stored hash must
    /// match a fresh recomputation, the previous-hash link must hold, and
    /// the transaction batch must satisfy `validate_transactions`. Fails on
    /// the first violation, reporting the offending block's index.
    pub fn validate(&self) -> Result<(), BlockchainError> {
        for index in 1..self.chain.len() {
            let current = &self.chain[index];
            let previous = &self.chain[index - 1];

            if current.hash != current.compute_hash() {
                return Err(BlockchainError::HashMismatch { index });
            }

            if current.prev_hash != previous.hash {
                return Err(BlockchainError::ChainLinkBroken { index });
            }

            current
                .validate_transactions(self)
                .map_err(|source| BlockchainError::InvalidBlock { index, source })?;
        }

        Ok(())
    }
}
