//! Shards and cross-shard settlement.
//!
//! Each shard owns an independent genesis-rooted chain and a FIFO pending
//! pool. Transactions route to shards by the first hex nibble of the sender
//! address; transfers whose endpoints land on different shards settle through
//! the two-phase coordinator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use chrono::Utc;
use log::{debug, info};

use crate::{
    Result, LedgerError, utils,
    block::Block,
    transaction::{Transaction, TransactionKind},
};

/// Deterministic address routing: the first hex nibble modulo the shard count
///
/// Addresses whose first character is not a hex digit cannot be routed and
/// are rejected as malformed.
///
/// # Example
/// ```
/// use qfc::sharding::shard_for;
///
/// assert_eq!(shard_for("a41f", 4).unwrap(), 2); // 0xa = 10, 10 % 4
/// assert_eq!(shard_for("f09b", 4).unwrap(), 3);
/// assert!(shard_for("zed", 4).is_err());
/// ```
pub fn shard_for(address: &str, shard_count: u32) -> Result<u32> {
    let nibble = utils::address_nibble(address)
        .ok_or_else(|| LedgerError::MalformedAddress(address.to_string()))?;
    Ok(nibble % shard_count)
}

/// One partition of the ledger: an ordered chain plus a pending pool
///
/// The chain is never empty; it starts with genesis at construction. The
/// shard owns its chain exclusively, and all mutation goes through the
/// ledger façade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shard {
    /// Shard identifier, 0-indexed
    pub id: u32,
    /// Ordered chain of blocks, genesis first
    pub chain: Vec<Block>,
    /// Pending transactions in admission order
    pub pending: Vec<Transaction>,
    /// Opaque placement tag consumed only by external visualization
    pub spatial_tag: String,
}

impl Shard {
    /// Create a shard with its genesis block
    pub fn new(id: u32) -> Self {
        let shard = Shard {
            id,
            chain: vec![Block::genesis()],
            pending: Vec::new(),
            spatial_tag: format!("sector-{:02}", id),
        };

        info!("Created shard {} with genesis block", id);
        shard
    }

    /// The last block of the chain, genesis or later
    pub fn latest(&self) -> &Block {
        self.chain.last().expect("shard chain starts with genesis")
    }

    /// Append a block extending `latest()`
    ///
    /// The caller guarantees the block links to the current tip; a violation
    /// is a programmer error.
    pub fn append(&mut self, block: Block) {
        debug_assert_eq!(block.index, self.chain.len() as u64);
        debug_assert_eq!(block.previous_hash, self.latest().hash);

        info!("Shard {}: appended block {} ({})", self.id, block.index, block.short_hash());
        self.chain.push(block);
    }

    /// Push a transaction to the pending pool
    ///
    /// No validation happens here; the ledger validates before calling.
    pub fn admit(&mut self, transaction: Transaction) {
        debug!("Shard {}: admitted {}", self.id, transaction.short_hash());
        self.pending.push(transaction);
    }

    /// Drain the pending pool into an unsealed candidate block
    ///
    /// Returns `None` when the pool is empty. Draining is the point of no
    /// return: once a candidate exists, its transactions are the miner's
    /// commitment and are never re-admitted.
    pub fn build(&mut self, miner: &str) -> Option<Block> {
        if self.pending.is_empty() {
            return None;
        }

        let transactions = std::mem::take(&mut self.pending);
        let block = Block::new(
            self.chain.len() as u64,
            transactions,
            self.latest().hash.clone(),
        );

        info!(
            "Shard {}: built candidate block {} with {} transactions for miner {}",
            self.id,
            block.index,
            block.transaction_count(),
            miner
        );
        Some(block)
    }

    /// Summary counters for this shard
    pub fn stats(&self) -> ShardStats {
        ShardStats {
            shard_id: self.id,
            chain_length: self.chain.len(),
            pending_transactions: self.pending.len(),
            total_transactions: self.chain.iter().map(|b| b.transaction_count()).sum(),
        }
    }
}

/// Statistics for a single shard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardStats {
    /// Shard identifier
    pub shard_id: u32,
    /// Blocks in the chain, genesis included
    pub chain_length: usize,
    /// Transactions waiting in the pool
    pub pending_transactions: usize,
    /// Transactions retired into blocks
    pub total_transactions: usize,
}

/// Status of a cross-shard settlement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SettlementStatus {
    /// Source shard can cover the transfer; commit has not run yet
    Prepared,
    /// Both legs were appended to their pools
    Committed,
    /// Prepare failed; neither shard recorded the transaction
    Aborted,
}

/// Record of one cross-shard settlement, keyed by the transfer's content hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// Content hash of the settled transfer
    pub id: String,
    /// Shard owning the sender
    pub source_shard: u32,
    /// Shard owning the recipient
    pub target_shard: u32,
    /// The transfer itself
    pub transaction: Transaction,
    /// Current status
    pub status: SettlementStatus,
    /// Unix timestamp of the prepare step
    pub created_at: i64,
}

/// Two-phase coordinator for transfers spanning two shards
///
/// Prepare reserves the source balance, commit appends the debit leg to the
/// source pool and the credit leg to the destination pool inside one critical
/// section, abort leaves both shards untouched. A committed transfer appears
/// exactly once in each participating shard.
#[derive(Debug, Clone)]
pub struct CrossShardCoordinator {
    shard_count: u32,
    settlements: HashMap<String, SettlementRecord>,
}

impl CrossShardCoordinator {
    pub fn new(shard_count: u32) -> Self {
        CrossShardCoordinator {
            shard_count,
            settlements: HashMap::new(),
        }
    }

    /// Route both endpoints of a transfer
    ///
    /// # Returns
    /// * `Result<(u32, u32)>` - (source shard, destination shard)
    pub fn route(&self, transaction: &Transaction) -> Result<(u32, u32)> {
        let source = shard_for(&transaction.sender, self.shard_count)?;
        let target = shard_for(&transaction.recipient, self.shard_count)?;
        Ok((source, target))
    }

    /// Phase one: check the source side can cover the total cost
    ///
    /// The destination side always accepts the credit. On success the
    /// settlement is recorded as prepared.
    pub fn prepare(
        &mut self,
        transaction: &Transaction,
        source: u32,
        target: u32,
        available: f64,
    ) -> bool {
        if available < transaction.total_cost() {
            debug!(
                "Prepare failed for {}: available {} < required {}",
                transaction.short_hash(),
                available,
                transaction.total_cost()
            );
            return false;
        }

        let id = transaction.calculate_hash();
        self.settlements.insert(
            id.clone(),
            SettlementRecord {
                id,
                source_shard: source,
                target_shard: target,
                transaction: transaction.clone(),
                status: SettlementStatus::Prepared,
                created_at: Utc::now().timestamp(),
            },
        );
        true
    }

    /// Phase two: append the debit leg to the source pool and the credit leg
    /// to the destination pool
    ///
    /// Both appends happen before control returns; no partial commit is
    /// observable to subsequent operations.
    pub fn commit(
        &mut self,
        transaction: &Transaction,
        source: u32,
        target: u32,
        shards: &mut [Shard],
    ) -> Result<()> {
        if source as usize >= shards.len() {
            return Err(LedgerError::ShardNotFound(source));
        }
        if target as usize >= shards.len() {
            return Err(LedgerError::ShardNotFound(target));
        }

        shards[source as usize].admit(transaction.leg(TransactionKind::CrossShardDebit));
        shards[target as usize].admit(transaction.leg(TransactionKind::CrossShardCredit));

        let id = transaction.calculate_hash();
        if let Some(record) = self.settlements.get_mut(&id) {
            record.status = SettlementStatus::Committed;
        }

        info!(
            "Committed cross-shard transfer {}: shard {} -> shard {}",
            transaction.short_hash(),
            source,
            target
        );
        Ok(())
    }

    /// Abort a settlement; neither shard records the transaction
    pub fn abort(&mut self, transaction: &Transaction, source: u32, target: u32) {
        let id = transaction.calculate_hash();
        self.settlements.insert(
            id.clone(),
            SettlementRecord {
                id,
                source_shard: source,
                target_shard: target,
                transaction: transaction.clone(),
                status: SettlementStatus::Aborted,
                created_at: Utc::now().timestamp(),
            },
        );

        info!("Aborted cross-shard transfer {}", transaction.short_hash());
    }

    /// Status of a settlement by the transfer's content hash
    pub fn status(&self, id: &str) -> Option<SettlementStatus> {
        self.settlements.get(id).map(|record| record.status)
    }

    /// All settlement records seen by this coordinator
    pub fn records(&self) -> Vec<&SettlementRecord> {
        self.settlements.values().collect()
    }
}
