use std::collections::HashMap;

use log::{debug, info, warn};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

use crate::{
    Result, LedgerError,
    block::Block,
    consensus::{CancelToken, ConsensusEngine},
    sharding::{shard_for, CrossShardCoordinator, Shard, ShardStats},
    transaction::{Transaction, TransactionKind},
    DEFAULT_DIFFICULTY, DEFAULT_SHARD_COUNT, NATIVE_ASSET, TOTAL_SUPPLY,
};

/// The single public entry point to the sharded ledger
///
/// Owns the shard vector, the per-asset balance book, the consensus engine,
/// and the cross-shard coordinator. Every mutation flows through `&mut self`,
/// which gives the difficulty counter, the balance book, and cross-shard
/// commits one global total order.
///
/// Balance deduction and credit happen atomically with pool admission;
/// processing a mined block never re-applies its transactions to the book.
#[derive(Debug, Clone)]
pub struct Ledger {
    shard_count: u32,
    shards: Vec<Shard>,
    /// asset -> address -> amount; the authoritative account state
    balances: HashMap<String, HashMap<String, f64>>,
    /// address -> verifying key, consulted on submission
    accounts: HashMap<String, RsaPublicKey>,
    /// Native asset allocated through `credit`, capped by the total supply
    allocated_supply: f64,
    /// Native-asset fees burned by transfers
    fees_burned: f64,
    engine: ConsensusEngine,
    coordinator: CrossShardCoordinator,
}

impl Ledger {
    /// Create a ledger with the given shard count and starting difficulty
    ///
    /// Each shard is constructed with its genesis block. The shard count is
    /// constant for the life of the process.
    ///
    /// # Example
    /// ```
    /// use qfc::ledger::Ledger;
    ///
    /// let ledger = Ledger::new(4, 3).unwrap();
    /// assert_eq!(ledger.chain(0).unwrap().len(), 1);
    /// ```
    pub fn new(shard_count: u32, difficulty: u32) -> Result<Self> {
        if shard_count == 0 {
            return Err(LedgerError::InvalidInput(
                "Shard count must be at least 1".to_string(),
            ));
        }

        let engine = ConsensusEngine::new(difficulty)?;
        let shards = (0..shard_count).map(Shard::new).collect();

        let mut balances: HashMap<String, HashMap<String, f64>> = HashMap::new();
        balances.insert(NATIVE_ASSET.to_string(), HashMap::new());

        info!(
            "Created ledger: {} shards, difficulty {}",
            shard_count, difficulty
        );
        Ok(Ledger {
            shard_count,
            shards,
            balances,
            accounts: HashMap::new(),
            allocated_supply: 0.0,
            fees_burned: 0.0,
            engine,
            coordinator: CrossShardCoordinator::new(shard_count),
        })
    }

    /// Create a ledger with the default shard count and difficulty
    pub fn new_default() -> Result<Self> {
        Self::new(DEFAULT_SHARD_COUNT, DEFAULT_DIFFICULTY)
    }

    /// Register the verifying key for an address
    ///
    /// Submissions from unregistered senders are rejected. The reserved
    /// network identity is not registrable: it does not route.
    pub fn register_account(&mut self, address: &str, public_key: RsaPublicKey) -> Result<()> {
        shard_for(address, self.shard_count)?;
        self.accounts.insert(address.to_string(), public_key);

        debug!("Registered account {}", address);
        Ok(())
    }

    /// Seed an address with funds outside the transfer path
    ///
    /// Creates the asset's balance book on first use. Native-asset credits
    /// allocate from the fixed total supply and are rejected once it is
    /// exhausted; subsidy emission is the only issuance beyond it.
    pub fn credit(&mut self, address: &str, asset: &str, amount: f64) -> Result<()> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidInput(
                "Credit amount must be positive".to_string(),
            ));
        }
        shard_for(address, self.shard_count)?;

        if asset == NATIVE_ASSET {
            let remaining = TOTAL_SUPPLY - self.allocated_supply;
            if amount > remaining {
                return Err(LedgerError::SupplyExceeded { requested: amount, remaining });
            }
            self.allocated_supply += amount;
        }

        *self
            .balances
            .entry(asset.to_string())
            .or_default()
            .entry(address.to_string())
            .or_insert(0.0) += amount;

        info!("Credited {} {} to {}", amount, asset, address);
        Ok(())
    }

    /// Current balance of an address, zero for unseen addresses and assets
    pub fn balance(&self, address: &str, asset: &str) -> f64 {
        self.balances
            .get(asset)
            .and_then(|book| book.get(address))
            .copied()
            .unwrap_or(0.0)
    }

    /// Submit a user transfer
    ///
    /// Returns `true` iff the transaction is well-formed, the signature
    /// verifies under the sender's registered key, the sender covers the
    /// total cost, and the coordinator accepted it. Rejections never unwind
    /// the process.
    pub fn submit(&mut self, transaction: Transaction) -> bool {
        match self.try_submit(transaction) {
            Ok(()) => true,
            Err(err) => {
                warn!("Submission rejected: {}", err);
                false
            }
        }
    }

    /// Submission with full error detail
    pub fn try_submit(&mut self, transaction: Transaction) -> Result<()> {
        if transaction.kind != TransactionKind::Transfer {
            return Err(LedgerError::TransactionValidationFailed(
                "Only user transfers enter through submission".to_string(),
            ));
        }
        transaction.validate()?;

        if !self.balances.contains_key(&transaction.asset) {
            return Err(LedgerError::UnknownAsset(transaction.asset.clone()));
        }

        // Both endpoints must route; this also rejects the reserved sender.
        let (source, target) = self.coordinator.route(&transaction)?;

        let public_key = self.accounts.get(&transaction.sender).ok_or_else(|| {
            LedgerError::InvalidSignature(format!(
                "No key registered for {}",
                transaction.sender
            ))
        })?;
        if !transaction.verify(public_key) {
            return Err(LedgerError::InvalidSignature(format!(
                "Signature check failed for {}",
                transaction.short_hash()
            )));
        }

        let available = self.balance(&transaction.sender, &transaction.asset);
        if available < transaction.total_cost() {
            return Err(LedgerError::InsufficientBalance {
                address: transaction.sender.clone(),
                balance: available,
                required: transaction.total_cost(),
            });
        }

        if source == target {
            self.apply_transfer(&transaction);
            debug!(
                "Admitted {} to shard {}",
                transaction.short_hash(),
                source
            );
            self.shards[source as usize].admit(transaction);
        } else {
            if !self
                .coordinator
                .prepare(&transaction, source, target, available)
            {
                self.coordinator.abort(&transaction, source, target);
                return Err(LedgerError::CrossShardAborted(transaction.short_hash()));
            }
            self.apply_transfer(&transaction);
            self.coordinator
                .commit(&transaction, source, target, &mut self.shards)?;
        }

        Ok(())
    }

    /// Debit the sender, credit the recipient. The fee is burned: no account
    /// receives it.
    fn apply_transfer(&mut self, transaction: &Transaction) {
        let book = self.balances.entry(transaction.asset.clone()).or_default();
        *book.entry(transaction.sender.clone()).or_insert(0.0) -= transaction.total_cost();
        *book.entry(transaction.recipient.clone()).or_insert(0.0) += transaction.amount;

        if transaction.asset == NATIVE_ASSET {
            self.fees_burned += transaction.fee;
        }
    }

    /// Mine the pending pool of the miner's shard into a block
    ///
    /// Builds a candidate (draining the pool irrevocably), runs the nonce
    /// search, appends the sealed block, and emits the reward in the same
    /// critical section. Returns `Ok(None)` when the pool was empty.
    pub fn mine(&mut self, miner: &str) -> Result<Option<Block>> {
        let shard_id = shard_for(miner, self.shard_count)?;

        let candidate = match self.shards[shard_id as usize].build(miner) {
            Some(block) => block,
            None => {
                debug!("Shard {}: nothing to mine", shard_id);
                return Ok(None);
            }
        };

        let outcome = self.engine.mine(&candidate)?;
        let mut block = candidate;
        block.apply_seal(outcome.nonce, outcome.hash.clone(), outcome.energy_source);

        // The engine just produced this seal; a failure here is a programmer
        // error, surfaced before the chain is touched.
        self.engine.verify_seal(&block, outcome.difficulty)?;

        let block_index = block.index;
        self.shards[shard_id as usize].append(block.clone());

        let reward = self.engine.emit_reward(miner, block_index)?;
        self.admit_reward(shard_id, reward);

        info!(
            "Mined block {} on shard {} for {}",
            block_index, shard_id, miner
        );
        Ok(Some(block))
    }

    /// Reward intake: skips signature and balance checks, credits the miner
    /// in the same critical section as block append, and admits the reward
    /// to the mined shard's pool. The reserved sender does not route, so the
    /// subsidy lands in the shard it was earned on.
    fn admit_reward(&mut self, shard_id: u32, reward: Transaction) {
        *self
            .balances
            .entry(reward.asset.clone())
            .or_default()
            .entry(reward.recipient.clone())
            .or_insert(0.0) += reward.amount;

        self.shards[shard_id as usize].admit(reward);
    }

    /// Read a shard's chain
    pub fn chain(&self, shard_id: u32) -> Option<&[Block]> {
        self.shards.get(shard_id as usize).map(|shard| shard.chain.as_slice())
    }

    /// Read a shard's pending pool
    pub fn pending(&self, shard_id: u32) -> Option<&[Transaction]> {
        self.shards
            .get(shard_id as usize)
            .map(|shard| shard.pending.as_slice())
    }

    /// The shard an address routes to
    pub fn shard_for_address(&self, address: &str) -> Result<u32> {
        shard_for(address, self.shard_count)
    }

    /// Number of shards, constant for the process lifetime
    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Current process-wide mining difficulty
    pub fn difficulty(&self) -> u32 {
        self.engine.difficulty()
    }

    /// Cross-shard settlement status by content hash
    pub fn settlement_status(&self, id: &str) -> Option<crate::sharding::SettlementStatus> {
        self.coordinator.status(id)
    }

    /// Token for cancelling an in-flight nonce search
    pub fn cancel_token(&self) -> CancelToken {
        self.engine.cancel_token()
    }

    /// Cumulative subsidy emitted through reward transactions
    pub fn emitted_subsidy(&self) -> f64 {
        self.engine.emitted_subsidy()
    }

    /// Native asset allocated from the total supply through `credit`
    pub fn allocated_supply(&self) -> f64 {
        self.allocated_supply
    }

    /// Native-asset fees burned so far
    pub fn fees_burned(&self) -> f64 {
        self.fees_burned
    }

    /// Re-check every shard chain and the supply identity: genesis shape,
    /// index sequence, linkage, the seal of every mined block, and that
    /// native balances sum to allocated supply plus emitted subsidy minus
    /// burned fees
    ///
    /// Seals are checked against the difficulty floor; the difficulty each
    /// block was mined at is not retained in the chain.
    pub fn validate(&self) -> Result<()> {
        for shard in &self.shards {
            let genesis = &shard.chain[0];
            if !genesis.is_genesis() {
                return Err(LedgerError::ChainValidationFailed(format!(
                    "Shard {} genesis is malformed",
                    shard.id
                )));
            }

            for (i, block) in shard.chain.iter().enumerate().skip(1) {
                if block.index != i as u64 {
                    return Err(LedgerError::InvalidIndex {
                        expected: i as u64,
                        found: block.index,
                    });
                }

                let previous = &shard.chain[i - 1];
                if block.previous_hash != previous.hash {
                    return Err(LedgerError::InvalidPreviousHash {
                        expected: previous.hash.clone(),
                        found: block.previous_hash.clone(),
                    });
                }

                self.engine.verify_seal(block, 1)?;
            }
        }

        let native_total: f64 = self
            .balances
            .get(NATIVE_ASSET)
            .map(|book| book.values().sum())
            .unwrap_or(0.0);
        let expected = self.allocated_supply + self.engine.emitted_subsidy() - self.fees_burned;
        if (native_total - expected).abs() > 1e-6 {
            return Err(LedgerError::ChainValidationFailed(format!(
                "Supply identity violated: native balances sum to {}, expected {}",
                native_total, expected
            )));
        }
        if self.allocated_supply > TOTAL_SUPPLY {
            return Err(LedgerError::ChainValidationFailed(format!(
                "Allocated supply {} exceeds total supply {}",
                self.allocated_supply, TOTAL_SUPPLY
            )));
        }

        info!("Ledger validation successful");
        Ok(())
    }

    /// Summary counters across the whole ledger
    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            shard_count: self.shard_count,
            difficulty: self.engine.difficulty(),
            total_blocks: self.shards.iter().map(|shard| shard.chain.len()).sum(),
            pending_transactions: self.shards.iter().map(|shard| shard.pending.len()).sum(),
            blocks_sealed: self.engine.blocks_sealed(),
            emitted_subsidy: self.engine.emitted_subsidy(),
            allocated_supply: self.allocated_supply,
            fees_burned: self.fees_burned,
            shards: self.shards.iter().map(Shard::stats).collect(),
        }
    }
}

/// Statistics across all shards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Number of shards
    pub shard_count: u32,
    /// Current mining difficulty
    pub difficulty: u32,
    /// Blocks across all chains, genesis blocks included
    pub total_blocks: usize,
    /// Transactions waiting across all pools
    pub pending_transactions: usize,
    /// Blocks sealed by the consensus engine
    pub blocks_sealed: u64,
    /// Cumulative mining subsidy
    pub emitted_subsidy: f64,
    /// Native asset allocated from the total supply
    pub allocated_supply: f64,
    /// Native-asset fees burned
    pub fees_burned: f64,
    /// Per-shard counters
    pub shards: Vec<ShardStats>,
}

impl std::fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Ledger Stats:")?;
        writeln!(f, "  Shards: {}", self.shard_count)?;
        writeln!(f, "  Difficulty: {}", self.difficulty)?;
        writeln!(f, "  Blocks: {}", self.total_blocks)?;
        writeln!(f, "  Pending: {}", self.pending_transactions)?;
        writeln!(f, "  Sealed: {}", self.blocks_sealed)?;
        writeln!(f, "  Subsidy emitted: {:.2} QFC", self.emitted_subsidy)?;
        writeln!(f, "  Supply allocated: {:.2} QFC", self.allocated_supply)?;
        write!(f, "  Fees burned: {:.2} QFC", self.fees_burned)
    }
}
