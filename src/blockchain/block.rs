use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use super::chain::Blockchain;
use super::crypto::sha256_hex;
use super::transaction::{Transaction, TransactionError};

/// Errors detected while validating a block's transaction batch
#[derive(Debug, Error)]
pub enum BlockError {
    /// Reward-minus-gas invariant broken, or the block does not carry
    /// exactly one mint-origin transaction.
    #[error("Reward accounting mismatch: {0}")]
    RewardAccountingMismatch(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// An ordered batch of transactions bound to the chain by a hash link and a
/// proof-of-work nonce.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block; empty for the genesis block
    pub prev_hash: String,

    /// Proof-of-work nonce
    pub nonce: u64,

    /// Hash of this block
    pub hash: String,
}

impl Block {
    /// Creates a new block with a provisional hash; `prev_hash` is assigned
    /// by the ledger at append time.
    pub fn new(timestamp: DateTime<Utc>, transactions: Vec<Transaction>) -> Self {
        let mut block = Block {
            timestamp,
            transactions,
            prev_hash: String::new(),
            nonce: 0,
            hash: String::new(),
        };

        block.hash = block.compute_hash();
        block
    }

    /// Computes the block's hash from every field except the hash itself
    pub fn compute_hash(&self) -> String {
        let payload = serde_json::json!({
            "prev_hash": self.prev_hash,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "nonce": self.nonce,
        });

        sha256_hex(payload.to_string().as_bytes())
    }

    /// Whether `hash` satisfies the proof-of-work predicate: at least
    /// `difficulty` leading zero hex digits.
    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        hash.starts_with(&"0".repeat(difficulty as usize))
    }

    /// Single-threaded proof-of-work search: nonce = 0, 1, 2, ... until the
    /// difficulty predicate holds. Deterministic, used by tests to pin
    /// reproducible fixtures.
    pub fn mine(&mut self, difficulty: u32) {
        let target = "0".repeat(difficulty as usize);

        while !self.hash.starts_with(&target) {
            self.nonce += 1;
            self.hash = self.compute_hash();
        }

        debug!("mined nonce {} for difficulty {}", self.nonce, difficulty);
    }

    /// Parallel proof-of-work search: the nonce space is sharded by stride
    /// across `workers` threads. The first worker to find a qualifying hash
    /// raises a shared flag that cancels the rest; its nonce is adopted.
    /// Which nonce wins is not deterministic.
    pub fn mine_parallel(&mut self, difficulty: u32, workers: usize) {
        let workers = workers.max(1);
        let target = "0".repeat(difficulty as usize);
        let found = AtomicBool::new(false);
        let (sender, receiver) = mpsc::channel();

        let (nonce, hash) = thread::scope(|scope| {
            for offset in 0..workers {
                let mut candidate = self.clone();
                let sender = sender.clone();
                let found = &found;
                let target = &target;

                scope.spawn(move || {
                    candidate.nonce = offset as u64;
                    candidate.hash = candidate.compute_hash();

                    while !found.load(Ordering::Relaxed) {
                        if candidate.hash.starts_with(target) {
                            found.store(true, Ordering::Relaxed);
                            let _ = sender.send((candidate.nonce, candidate.hash));
                            return;
                        }

                        candidate.nonce += workers as u64;
                        candidate.hash = candidate.compute_hash();
                    }
                });
            }

            drop(sender);

            // The search terminates with probability 1; a worker always
            // reports before the channel closes.
            receiver
                .recv()
                .expect("mining workers exited without finding a nonce")
        });

        self.nonce = nonce;
        self.hash = hash;

        debug!(
            "mined nonce {} for difficulty {} across {} workers",
            self.nonce, difficulty, workers
        );
    }

    /// Checks the reward-accounting invariant and validates every
    /// transaction in the block against the ledger's current state.
    pub fn validate_transactions(&self, chain: &Blockchain) -> Result<(), BlockError> {
        let mint = chain.mint_address();

        let rewards = self
            .transactions
            .iter()
            .filter(|tx| tx.is_mint(mint))
            .count();
        if rewards != 1 {
            return Err(BlockError::RewardAccountingMismatch(format!(
                "expected exactly one reward transaction, found {}",
                rewards
            )));
        }

        let total_gas: u64 = self
            .transactions
            .iter()
            .filter(|tx| !tx.is_mint(mint))
            .map(|tx| tx.gas)
            .sum();
        let reward_amount = self
            .transactions
            .iter()
            .find(|tx| tx.is_mint(mint))
            .map(|tx| tx.amount)
            .unwrap_or(0);

        if reward_amount != chain.reward().saturating_add(total_gas) {
            return Err(BlockError::RewardAccountingMismatch(format!(
                "reward {} does not equal block reward {} plus total gas {}",
                reward_amount,
                chain.reward(),
                total_gas
            )));
        }

        for transaction in &self.transactions {
            transaction.validate(chain)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;

    fn sample_block() -> Block {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let transactions = vec![Transaction::new_signed(
            &sender,
            recipient.address().clone(),
            42,
            1,
        )];

        Block::new(Utc::now(), transactions)
    }

    #[test]
    fn test_new_block_has_hash() {
        let block = sample_block();

        assert_eq!(block.hash, block.compute_hash());
        assert_eq!(block.hash.len(), 64);
        assert!(block.prev_hash.is_empty());
    }

    #[test]
    fn test_hash_tracks_every_field() {
        let mut block = sample_block();
        let original = block.compute_hash();

        block.nonce += 1;
        assert_ne!(block.compute_hash(), original);

        block.nonce -= 1;
        block.prev_hash = "abc".to_string();
        assert_ne!(block.compute_hash(), original);
    }

    #[test]
    fn test_mine_meets_difficulty() {
        let mut block = sample_block();
        block.mine(2);

        assert!(Block::meets_difficulty(&block.hash, 2));
        assert_eq!(block.hash, block.compute_hash());
    }

    #[test]
    fn test_mine_is_deterministic() {
        let mut first = sample_block();
        let mut second = first.clone();

        first.mine(1);
        second.mine(1);

        assert_eq!(first.nonce, second.nonce);
        assert_eq!(first.hash, second.hash);
    }

    #[test]
    fn test_mine_parallel_meets_difficulty() {
        let mut block = sample_block();
        block.mine_parallel(2, 4);

        assert!(Block::meets_difficulty(&block.hash, 2));
        assert_eq!(block.hash, block.compute_hash());
    }
}
