use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info};
use rand::thread_rng;

use crate::{
    Result, LedgerError, Transaction, utils,
    block::{seal_digest, Block, EnergySource},
    ADJUSTMENT_INTERVAL, BASE_REWARD, HALVING_INTERVAL, MAX_DIFFICULTY, TARGET_BLOCK_TIME_SECS,
};

/// How often the nonce search polls the cancellation token
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Shared flag for cooperative cancellation of the nonce search
///
/// The search polls the token every few thousand nonces and returns a
/// distinct cancelled outcome without sealing anything.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of any in-flight nonce search holding this token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Re-arm the token after a cancelled search
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// The result of a successful nonce search
#[derive(Debug, Clone)]
pub struct MineOutcome {
    /// Nonce satisfying the target
    pub nonce: u64,
    /// The sealed hash
    pub hash: String,
    /// Energy tag the search ran under
    pub energy_source: EnergySource,
    /// Difficulty the seal was produced at. Adjustment may move the engine's
    /// difficulty immediately after sealing, so verification uses this value.
    pub difficulty: u32,
}

/// Proof-of-work engine: nonce search, difficulty control, reward emission
///
/// Difficulty is a single process-wide integer shared across all shards.
/// Mining completions feed a rolling block-time sample; under parallel
/// mining, callers must serialize sample recording.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    difficulty: u32,
    target_block_time: f64,
    adjustment_interval: usize,
    block_times: Vec<f64>,
    blocks_sealed: u64,
    emitted_subsidy: f64,
    cancel: CancelToken,
}

impl ConsensusEngine {
    /// Create an engine at the given starting difficulty
    ///
    /// # Example
    /// ```
    /// use qfc::consensus::ConsensusEngine;
    ///
    /// let engine = ConsensusEngine::new(4).unwrap();
    /// assert_eq!(engine.difficulty(), 4);
    /// ```
    pub fn new(difficulty: u32) -> Result<Self> {
        if difficulty == 0 || difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidDifficulty(difficulty));
        }

        Ok(ConsensusEngine {
            difficulty,
            target_block_time: TARGET_BLOCK_TIME_SECS,
            adjustment_interval: ADJUSTMENT_INTERVAL,
            block_times: Vec::new(),
            blocks_sealed: 0,
            emitted_subsidy: 0.0,
            cancel: CancelToken::new(),
        })
    }

    /// Current number of leading hex zeros a seal must carry
    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Total blocks sealed by this engine
    pub fn blocks_sealed(&self) -> u64 {
        self.blocks_sealed
    }

    /// Cumulative subsidy emitted through reward transactions
    pub fn emitted_subsidy(&self) -> f64 {
        self.emitted_subsidy
    }

    /// A handle that can cancel in-flight nonce searches
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Search for a seal over the block's header, tagged with a randomly
    /// chosen energy source
    ///
    /// On success the search duration enters the rolling sample and
    /// difficulty adjustment runs. Cancellation surfaces as
    /// `LedgerError::MiningCancelled` with no state change.
    pub fn mine(&mut self, block: &Block) -> Result<MineOutcome> {
        let energy_source = EnergySource::random(&mut thread_rng());
        self.mine_with_energy(block, energy_source)
    }

    /// Nonce search under an explicit energy tag
    ///
    /// Deterministic given identical header contents; tests fix the block
    /// timestamp and the tag to make seals reproducible.
    pub fn mine_with_energy(
        &mut self,
        block: &Block,
        energy_source: EnergySource,
    ) -> Result<MineOutcome> {
        let difficulty = self.difficulty;
        let header = block.header_payload();
        let start = Instant::now();

        info!(
            "Mining block {} at difficulty {} under {}",
            block.index, difficulty, energy_source
        );

        let mut nonce: u64 = 0;
        loop {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && self.cancel.is_cancelled() {
                info!("Nonce search cancelled at nonce {}", nonce);
                return Err(LedgerError::MiningCancelled);
            }

            let hash = seal_digest(&header, nonce, energy_source);
            if utils::hash_meets_difficulty(&hash, difficulty) {
                let elapsed = start.elapsed().as_secs_f64();
                self.blocks_sealed += 1;
                info!(
                    "Sealed block {}: nonce {}, hash {}, {:.3}s",
                    block.index,
                    nonce,
                    &hash[..12.min(hash.len())],
                    elapsed
                );
                self.record_block_time(elapsed);
                return Ok(MineOutcome { nonce, hash, energy_source, difficulty });
            }

            nonce = nonce.wrapping_add(1);
        }
    }

    /// Record a completed search duration and run difficulty adjustment
    /// once the sample window is full
    pub fn record_block_time(&mut self, seconds: f64) {
        self.block_times.push(seconds);
        debug!(
            "Recorded block time {:.3}s ({}/{} in window)",
            seconds,
            self.block_times.len(),
            self.adjustment_interval
        );

        if self.block_times.len() >= self.adjustment_interval {
            self.adjust_difficulty();
        }
    }

    /// Compare the window mean against the target block time, move
    /// difficulty one step, and reset the window
    fn adjust_difficulty(&mut self) {
        let mean = self.block_times.iter().sum::<f64>() / self.block_times.len() as f64;
        let previous = self.difficulty;

        if mean < self.target_block_time {
            self.difficulty = (self.difficulty + 1).min(MAX_DIFFICULTY);
        } else if mean > self.target_block_time {
            self.difficulty = self.difficulty.saturating_sub(1).max(1);
        }

        self.block_times.clear();
        info!(
            "Difficulty adjustment: mean block time {:.3}s, difficulty {} -> {}",
            mean, previous, self.difficulty
        );
    }

    /// The subsidy for a block at the given shard-local index:
    /// `max(1, base_reward >> halvings)`
    pub fn reward_amount(&self, block_index: u64) -> f64 {
        let halvings = block_index / HALVING_INTERVAL;
        let subsidy = if halvings >= 63 {
            1
        } else {
            (BASE_REWARD >> halvings).max(1)
        };
        subsidy as f64
    }

    /// Emit the reward transaction for a freshly appended block
    pub fn emit_reward(&mut self, miner: &str, block_index: u64) -> Result<Transaction> {
        let amount = self.reward_amount(block_index);
        let reward = Transaction::reward(miner.to_string(), amount)?;
        self.emitted_subsidy += amount;

        info!("Emitted reward of {} to {}", amount, miner);
        Ok(reward)
    }

    /// Verify a sealed block against the difficulty it was mined at
    ///
    /// Valid iff the stored hash reproduces from the header with the stored
    /// nonce and energy source, and meets the target.
    pub fn verify_seal(&self, block: &Block, difficulty: u32) -> Result<()> {
        let energy_source = block.energy_source.ok_or_else(|| {
            LedgerError::InvalidProofOfWork("sealed block carries no energy source".to_string())
        })?;

        let expected = block.pow_hash(block.nonce, energy_source);
        if expected != block.hash {
            return Err(LedgerError::InvalidHash(format!(
                "seal mismatch: expected {}, got {}",
                expected, block.hash
            )));
        }

        if !utils::hash_meets_difficulty(&block.hash, difficulty) {
            return Err(LedgerError::InvalidProofOfWork(format!(
                "hash {} does not meet difficulty {}",
                block.hash, difficulty
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_block() -> Block {
        let tx = Transaction::new("a1".to_string(), "b2".to_string(), 5.0).unwrap();
        let mut block = Block::new(1, vec![tx], "00ab".to_string());
        block.timestamp = 1_700_000_000;
        block
    }

    #[test]
    fn test_engine_rejects_bad_difficulty() {
        assert!(ConsensusEngine::new(0).is_err());
        assert!(ConsensusEngine::new(MAX_DIFFICULTY + 1).is_err());
        assert!(ConsensusEngine::new(1).is_ok());
    }

    #[test]
    fn test_mine_meets_target() {
        let mut engine = ConsensusEngine::new(1).unwrap();
        let mut block = test_block();

        let outcome = engine.mine_with_energy(&block, EnergySource::Wind).unwrap();
        assert!(outcome.hash.starts_with('0'));
        assert!(EnergySource::ALL.contains(&outcome.energy_source));
        assert_eq!(engine.blocks_sealed(), 1);

        block.apply_seal(outcome.nonce, outcome.hash, outcome.energy_source);
        engine.verify_seal(&block, outcome.difficulty).unwrap();
    }

    #[test]
    fn test_tampered_seal_rejected() {
        let mut engine = ConsensusEngine::new(1).unwrap();
        let mut block = test_block();

        let outcome = engine.mine_with_energy(&block, EnergySource::Solar).unwrap();
        block.apply_seal(outcome.nonce + 1, outcome.hash, outcome.energy_source);
        assert!(engine.verify_seal(&block, outcome.difficulty).is_err());
    }

    #[test]
    fn test_unsealed_block_fails_verification() {
        let engine = ConsensusEngine::new(1).unwrap();
        let block = test_block();
        assert!(engine.verify_seal(&block, 1).is_err());
    }

    #[test]
    fn test_cancellation_leaves_state_untouched() {
        let mut engine = ConsensusEngine::new(8).unwrap();
        let block = test_block();

        let token = engine.cancel_token();
        token.cancel();

        match engine.mine_with_energy(&block, EnergySource::Hydro) {
            Err(LedgerError::MiningCancelled) => {}
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert_eq!(engine.blocks_sealed(), 0);
        assert_eq!(engine.difficulty(), 8);

        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_difficulty_increases_on_fast_blocks() {
        let mut engine = ConsensusEngine::new(4).unwrap();

        for _ in 0..ADJUSTMENT_INTERVAL - 1 {
            engine.record_block_time(1.0);
        }
        assert_eq!(engine.difficulty(), 4);

        engine.record_block_time(1.0);
        assert_eq!(engine.difficulty(), 5);
    }

    #[test]
    fn test_difficulty_decreases_on_slow_blocks() {
        let mut engine = ConsensusEngine::new(4).unwrap();

        for _ in 0..ADJUSTMENT_INTERVAL {
            engine.record_block_time(2.0 * TARGET_BLOCK_TIME_SECS);
        }
        assert_eq!(engine.difficulty(), 3);
    }

    #[test]
    fn test_difficulty_never_drops_below_one() {
        let mut engine = ConsensusEngine::new(1).unwrap();

        for _ in 0..ADJUSTMENT_INTERVAL {
            engine.record_block_time(2.0 * TARGET_BLOCK_TIME_SECS);
        }
        assert_eq!(engine.difficulty(), 1);
    }

    #[test]
    fn test_window_resets_after_adjustment() {
        let mut engine = ConsensusEngine::new(4).unwrap();

        for _ in 0..ADJUSTMENT_INTERVAL {
            engine.record_block_time(1.0);
        }
        assert_eq!(engine.difficulty(), 5);

        // A fresh window: one more sample must not trigger another step.
        engine.record_block_time(1.0);
        assert_eq!(engine.difficulty(), 5);
    }

    #[test]
    fn test_reward_halving_schedule() {
        let engine = ConsensusEngine::new(4).unwrap();

        assert_eq!(engine.reward_amount(0), 50.0);
        assert_eq!(engine.reward_amount(HALVING_INTERVAL - 1), 50.0);
        assert_eq!(engine.reward_amount(HALVING_INTERVAL), 25.0);
        assert_eq!(engine.reward_amount(2 * HALVING_INTERVAL), 12.0);
        assert_eq!(engine.reward_amount(5 * HALVING_INTERVAL), 1.0);
        assert_eq!(engine.reward_amount(6 * HALVING_INTERVAL), 1.0);
        assert_eq!(engine.reward_amount(u64::MAX), 1.0);
    }

    #[test]
    fn test_emit_reward_tracks_subsidy() {
        let mut engine = ConsensusEngine::new(4).unwrap();

        let reward = engine.emit_reward("c3aa", 1).unwrap();
        assert!(reward.is_reward());
        assert_eq!(reward.recipient, "c3aa");
        assert_eq!(reward.amount, 50.0);
        assert_eq!(engine.emitted_subsidy(), 50.0);

        engine.emit_reward("c3aa", 2).unwrap();
        assert_eq!(engine.emitted_subsidy(), 100.0);
    }
}
