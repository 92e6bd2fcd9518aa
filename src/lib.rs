//! # QFC Sharded Ledger
//!
//! A single-node sharded ledger in Rust: a replicated, append-only record of
//! signed value transfers divided across parallel shards, with cross-shard
//! atomic settlement and an energy-aware proof-of-work consensus.
//!
//! This crate provides:
//! - Content-addressed transactions with RSA-PSS signatures and a 1% fee policy
//! - Per-shard chains with genesis blocks and FIFO pending pools
//! - Deterministic address routing by the first hex nibble
//! - Two-phase prepare/commit/abort settlement for cross-shard transfers
//! - Proof-of-work mining with adaptive difficulty, halving rewards, and
//!   cooperative cancellation
//! - A CLI for driving submissions, mining, and balance queries
//!
//! ## Architecture
//!
//! The ledger façade is the single public entry point; it owns the shard
//! vector, the per-asset balance book, the consensus engine, and the
//! cross-shard coordinator, and serializes every mutation:
//!
//! - **Ledger**: transaction intake, mining entry point, balance book
//! - **Shard**: ordered chain + pending pool for one partition
//! - **ConsensusEngine**: nonce search, difficulty control, reward emission
//! - **CrossShardCoordinator**: routing + two-phase atomic settlement
//! - **Block / Transaction**: content-addressed data model
//! - **Crypto / Utils**: hashing and signature primitives

pub mod block;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod sharding;
pub mod transaction;
pub mod utils;

// Re-export main types for easy access
pub use block::{Block, EnergySource};
pub use consensus::{CancelToken, ConsensusEngine, MineOutcome};
pub use crypto::KeyPair;
pub use error::{LedgerError, Result};
pub use ledger::{Ledger, LedgerStats};
pub use sharding::{
    shard_for, CrossShardCoordinator, SettlementRecord, SettlementStatus, Shard, ShardStats,
};
pub use transaction::{Transaction, TransactionKind};

/// Native asset symbol
pub const NATIVE_ASSET: &str = "QFC";

/// Fixed total supply of the native asset
pub const TOTAL_SUPPLY: f64 = 1_000_000_000.0;

/// Fee policy: 1% of the transfer amount, deducted from the sender
pub const FEE_RATE: f64 = 0.01;

/// Base mining subsidy before halving
pub const BASE_REWARD: u64 = 50;

/// Blocks between subsidy halvings
pub const HALVING_INTERVAL: u64 = 210_000;

/// Default mining difficulty (leading hex zeros required)
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Upper bound on difficulty
pub const MAX_DIFFICULTY: u32 = 32;

/// Target seconds per block for difficulty adjustment
pub const TARGET_BLOCK_TIME_SECS: f64 = 60.0;

/// Mined blocks per difficulty-adjustment window
pub const ADJUSTMENT_INTERVAL: usize = 10;

/// Default number of shards
pub const DEFAULT_SHARD_COUNT: u32 = 4;

/// Reserved sender of reward transactions; never a legal external address
pub const NETWORK_SENDER: &str = "Network";

/// Previous-hash marker of every genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";
