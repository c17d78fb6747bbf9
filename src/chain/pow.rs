/// Bounded proof-of-work search.
///
/// Nonces are tried in order from 0, so the same block template and
/// difficulty always settle on the same nonce. The search stops after
/// `max_attempts` hashes or once `timeout` has elapsed, whichever comes
/// first.
use std::time::{Duration, Instant};

use crate::error::{LedgerError, Result};
use crate::verifier::{recompute_block_hash, satisfies_difficulty};

/// How often the wall clock is consulted, in attempts.
const CLOCK_CHECK_INTERVAL: u64 = 4096;

/// Limits on a single mining run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningBudget {
    pub max_attempts: u64,
    pub timeout: Option<Duration>,
}

impl MiningBudget {
    pub fn attempts(max_attempts: u64) -> Self {
        Self {
            max_attempts,
            timeout: None,
        }
    }
}

impl Default for MiningBudget {
    fn default() -> Self {
        Self {
            max_attempts: 5_000_000,
            timeout: None,
        }
    }
}

/// Everything a block hash covers except the nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub index: u64,
    pub timestamp: String,
    pub prev_hash: String,
    pub data: String,
}

/// Find the smallest nonce whose block hash meets `difficulty`.
///
/// Returns `(nonce, hash)`, or `MiningTimeout` once the budget is spent.
pub fn search(
    template: &BlockTemplate,
    difficulty: u32,
    budget: &MiningBudget,
) -> Result<(u64, String)> {
    let started = Instant::now();

    for nonce in 0..budget.max_attempts {
        let hash = recompute_block_hash(
            template.index,
            &template.timestamp,
            &template.prev_hash,
            &template.data,
            nonce,
        );
        if satisfies_difficulty(&hash, difficulty) {
            return Ok((nonce, hash));
        }

        if let Some(timeout) = budget.timeout {
            if nonce % CLOCK_CHECK_INTERVAL == CLOCK_CHECK_INTERVAL - 1
                && started.elapsed() >= timeout
            {
                return Err(LedgerError::MiningTimeout {
                    attempts: nonce + 1,
                });
            }
        }
    }

    Err(LedgerError::MiningTimeout {
        attempts: budget.max_attempts,
    })
}
