/// Local proof-of-work anchor chain.
///
/// A single-process chain of mined blocks. Each block carries arbitrary
/// payload text (usually a ledger digest) and a nonce whose hash meets a
/// leading-zero difficulty target. Height is the number of blocks: an
/// empty chain has height 0 and no tip, and the first mined block is the
/// genesis block (index 0, linked to the zero sentinel).
///
/// Mining does not hold the lock during the nonce search. The tail is
/// read under a shared lock, the search runs unlocked, and the block is
/// committed under the exclusive lock only if the tail has not moved.
/// A moved tail yields `StaleTip`; `mine` retries once against the new
/// tail before giving up.
///
/// The difficulty stored in a block is not part of its hash, so the chain
/// carries its own minimum difficulty. Verification checks each block
/// against the larger of the two.
pub mod pow;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crypto::hash::ZERO_HASH;
use crate::error::{LedgerError, Result};
use crate::verifier::{self, MAX_DIFFICULTY};
use pow::{BlockTemplate, MiningBudget};

/// Page size used by `chain()` when no positive limit is given.
pub const DEFAULT_CHAIN_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// RFC 3339 UTC timestamp with microseconds, fixed before mining.
    pub timestamp: String,
    pub prev_hash: String,
    pub data: String,
    pub nonce: u64,
    pub hash: String,
    /// Leading zero hex characters required when this block was mined.
    pub difficulty: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub height: u64,
    pub tip_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub ok: bool,
    /// Number of blocks examined; always the full chain height.
    pub height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_invalid: Option<u64>,
}

#[derive(Debug, Default)]
pub struct BlockChain {
    blocks: RwLock<Vec<Block>>,
    min_difficulty: u32,
}

impl BlockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty chain that refuses to mine, or accept on verification,
    /// any block below `min_difficulty`.
    pub fn with_min_difficulty(min_difficulty: u32) -> Self {
        Self {
            blocks: RwLock::new(Vec::new()),
            min_difficulty,
        }
    }

    /// A chain whose genesis block (empty payload) is mined up front.
    /// `difficulty` also becomes the chain's minimum.
    pub fn with_genesis(difficulty: u32, budget: &MiningBudget) -> Result<Self> {
        let chain = Self::with_min_difficulty(difficulty);
        chain.mine("", difficulty, budget)?;
        Ok(chain)
    }

    pub fn min_difficulty(&self) -> u32 {
        self.min_difficulty
    }

    pub fn status(&self) -> ChainStatus {
        let blocks = self.blocks.read();
        ChainStatus {
            height: blocks.len() as u64,
            tip_hash: blocks.last().map(|b| b.hash.clone()),
        }
    }

    pub fn height(&self) -> u64 {
        self.blocks.read().len() as u64
    }

    /// Mine and append a block carrying `data`.
    pub fn mine(&self, data: &str, difficulty: u32, budget: &MiningBudget) -> Result<Block> {
        if difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidInput(format!(
                "difficulty {difficulty} exceeds maximum {MAX_DIFFICULTY}"
            )));
        }
        if difficulty < self.min_difficulty {
            return Err(LedgerError::InvalidInput(format!(
                "difficulty {difficulty} is below the chain minimum {}",
                self.min_difficulty
            )));
        }

        self.mine_with(data, difficulty, budget, |_| {})
    }

    /// `mine` with a hook that runs after the search, before each commit.
    fn mine_with(
        &self,
        data: &str,
        difficulty: u32,
        budget: &MiningBudget,
        mut before_commit: impl FnMut(&Self),
    ) -> Result<Block> {
        match self.try_mine(data, difficulty, budget, &mut before_commit) {
            Err(LedgerError::StaleTip) => {
                warn!("Chain tip moved during mining; retrying against new tip");
                self.try_mine(data, difficulty, budget, &mut before_commit)
            }
            other => other,
        }
    }

    fn try_mine(
        &self,
        data: &str,
        difficulty: u32,
        budget: &MiningBudget,
        before_commit: &mut impl FnMut(&Self),
    ) -> Result<Block> {
        let template = self.prepare(data);
        debug!(index = template.index, difficulty, "Mining block");

        let block = match seal(template, difficulty, budget) {
            Ok(block) => block,
            Err(e) => {
                warn!(difficulty, error = %e, "Mining failed");
                return Err(e);
            }
        };
        before_commit(self);
        self.commit(block)
    }

    /// Snapshot the tail into a block template stamped with the current time.
    fn prepare(&self, data: &str) -> BlockTemplate {
        let blocks = self.blocks.read();
        BlockTemplate {
            index: blocks.len() as u64,
            timestamp: verifier::canonical_timestamp(&Utc::now()),
            prev_hash: blocks
                .last()
                .map_or_else(|| ZERO_HASH.to_string(), |b| b.hash.clone()),
            data: data.to_string(),
        }
    }

    /// Append `block` if it still extends the current tip.
    fn commit(&self, block: Block) -> Result<Block> {
        let mut blocks = self.blocks.write();
        let tip = blocks.last().map_or(ZERO_HASH, |b| b.hash.as_str());
        if block.index != blocks.len() as u64 || block.prev_hash != tip {
            return Err(LedgerError::StaleTip);
        }

        blocks.push(block.clone());
        info!(
            index = block.index,
            nonce = block.nonce,
            hash = %block.hash,
            "Block mined"
        );
        Ok(block)
    }

    /// The most recent `limit` blocks in ascending index order.
    ///
    /// A missing or non-positive limit means `DEFAULT_CHAIN_LIMIT`.
    pub fn chain(&self, limit: Option<i64>) -> Vec<Block> {
        let limit = match limit {
            Some(l) if l > 0 => usize::try_from(l).unwrap_or(usize::MAX),
            _ => DEFAULT_CHAIN_LIMIT,
        };
        let blocks = self.blocks.read();
        let start = blocks.len().saturating_sub(limit);
        blocks[start..].to_vec()
    }

    /// Recompute every block hash, proof-of-work and link over one snapshot.
    pub fn verify(&self) -> ChainVerification {
        let blocks = self.blocks.read();
        verifier::verify_blocks(&blocks, self.min_difficulty)
    }

    #[cfg(test)]
    pub(crate) fn tamper(&self, index: usize, f: impl FnOnce(&mut Block)) {
        let mut blocks = self.blocks.write();
        f(&mut blocks[index]);
    }
}

/// Run the nonce search for `template` and assemble the block.
fn seal(template: BlockTemplate, difficulty: u32, budget: &MiningBudget) -> Result<Block> {
    let (nonce, hash) = pow::search(&template, difficulty, budget)?;
    Ok(Block {
        index: template.index,
        timestamp: template.timestamp,
        prev_hash: template.prev_hash,
        data: template.data,
        nonce,
        hash,
        difficulty,
    })
}
