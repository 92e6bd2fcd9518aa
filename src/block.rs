use serde::{Deserialize, Serialize};
use chrono::Utc;
use rand::Rng;
use log::debug;

use crate::{Result, Transaction, utils, GENESIS_PREVIOUS_HASH};

/// Symbolic energy-source tag mixed into the proof-of-work digest
///
/// Chosen by the miner from a fixed renewable set; a block seal is only valid
/// under a recognized tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnergySource {
    Solar,
    Wind,
    Hydro,
    Geothermal,
}

impl EnergySource {
    /// The fixed set of recognized tags
    pub const ALL: [EnergySource; 4] = [
        EnergySource::Solar,
        EnergySource::Wind,
        EnergySource::Hydro,
        EnergySource::Geothermal,
    ];

    /// Pick a tag uniformly at random
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

impl std::fmt::Display for EnergySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnergySource::Solar => write!(f, "solar"),
            EnergySource::Wind => write!(f, "wind"),
            EnergySource::Hydro => write!(f, "hydro"),
            EnergySource::Geothermal => write!(f, "geothermal"),
        }
    }
}

/// The sealed digest for a serialized header, nonce, and energy tag
///
/// Mining's hot loop and seal verification share this one code path.
pub fn seal_digest(header_payload: &str, nonce: u64, energy_source: EnergySource) -> String {
    utils::calculate_hash(format!("{}:{}:{}", header_payload, nonce, energy_source))
}

/// A block in one shard's chain
///
/// Immutable once sealed and appended. The content hash covers
/// {index, transactions, previous_hash, nonce, timestamp}; the sealed hash
/// additionally mixes in the nonce and energy source for the target check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    /// Shard-local index, 0 at genesis
    pub index: u64,
    /// Unix timestamp (seconds), stamped once at construction
    pub timestamp: i64,
    /// Transactions included in this block, in pool admission order
    pub transactions: Vec<Transaction>,
    /// Stored hash of the predecessor, "0" for genesis
    pub previous_hash: String,
    /// Stored hash: the sealed proof-of-work hash for mined blocks, the
    /// content hash for genesis
    pub hash: String,
    /// Nonce found by the nonce search, 0 before sealing
    pub nonce: u64,
    /// Energy tag the block was sealed under; genesis carries none
    pub energy_source: Option<EnergySource>,
}

impl Block {
    /// Create an unsealed block
    ///
    /// The timestamp is stamped once here and the transaction list is frozen
    /// by value.
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        let mut block = Block {
            index,
            timestamp: Utc::now().timestamp(),
            transactions,
            previous_hash,
            hash: String::new(),
            nonce: 0,
            energy_source: None,
        };
        block.hash = block.compute_hash();

        debug!("Created block {} with {} transactions", block.index, block.transactions.len());
        block
    }

    /// The first block of a shard's chain
    ///
    /// Genesis has no predecessor, carries no transactions, and its hash is
    /// the content hash at nonce 0; it is not required to satisfy any
    /// difficulty target.
    ///
    /// # Example
    /// ```
    /// use qfc::block::Block;
    ///
    /// let genesis = Block::genesis();
    /// assert_eq!(genesis.index, 0);
    /// assert_eq!(genesis.previous_hash, "0");
    /// assert!(genesis.transactions.is_empty());
    /// ```
    pub fn genesis() -> Self {
        Self::new(0, Vec::new(), GENESIS_PREVIOUS_HASH.to_string())
    }

    /// The serialized header handed to the consensus engine for mining:
    /// everything in the content digest except the nonce, key-sorted.
    pub fn header_payload(&self) -> String {
        serde_json::json!({
            "index": self.index,
            "transactions": self.transactions,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
        })
        .to_string()
    }

    /// Content digest over {index, transactions, previous_hash, nonce,
    /// timestamp}, hex-encoded
    pub fn compute_hash(&self) -> String {
        let payload = serde_json::json!({
            "index": self.index,
            "transactions": self.transactions,
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
            "timestamp": self.timestamp,
        });
        utils::calculate_hash(payload.to_string())
    }

    /// The sealed hash for a given nonce and energy tag
    ///
    /// Mining and verification both go through this single code path.
    pub fn pow_hash(&self, nonce: u64, energy_source: EnergySource) -> String {
        seal_digest(&self.header_payload(), nonce, energy_source)
    }

    /// Write a seal produced by the consensus engine into the block
    pub fn apply_seal(&mut self, nonce: u64, hash: String, energy_source: EnergySource) {
        self.nonce = nonce;
        self.hash = hash;
        self.energy_source = Some(energy_source);
    }

    /// Whether this block is a genesis block
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Number of transactions in this block
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// First 8 characters of the stored hash, for display
    pub fn short_hash(&self) -> String {
        self.hash[..8.min(self.hash.len())].to_string()
    }

    /// Formatted creation time
    pub fn formatted_timestamp(&self) -> String {
        utils::format_timestamp(self.timestamp)
    }

    /// Key-sorted JSON wire encoding
    pub fn to_json(&self) -> Result<String> {
        utils::canonical_json(self)
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Block #{} ({}): {} txs, hash: {}",
            self.index,
            self.formatted_timestamp(),
            self.transaction_count(),
            self.short_hash()
        )
    }
}
