/// Stateless integrity checks shared by the ledger and the anchor chain.
///
/// Every function here recomputes hashes from stored fields and compares
/// them with what was stored. Nothing is mutated; a broken chain is
/// reported through the returned verification value, never as an error.
use chrono::{DateTime, SecondsFormat, Utc};

use crate::chain::{Block, ChainVerification};
use crate::crypto::hash::{hash_fields, HEX_DIGEST_LEN, ZERO_HASH};
use crate::ledger::{LedgerEntry, LedgerVerification};

const ENTRY_TAG: &[u8] = b"custody-ledger/entry/v1";
const BLOCK_TAG: &[u8] = b"custody-ledger/block/v1";

/// Largest meaningful difficulty: every hex character of the hash is zero.
pub const MAX_DIFFICULTY: u32 = HEX_DIGEST_LEN as u32;

/// Render a timestamp in the form that is hashed and stored:
/// RFC 3339, UTC, microsecond precision, `Z` suffix.
pub fn canonical_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn recompute_entry_hash(
    index: u64,
    evidence_id: &str,
    content_hash: &str,
    prev_hash: &str,
    created_at: &str,
) -> String {
    hash_fields(
        ENTRY_TAG,
        &[
            index.to_string().as_bytes(),
            evidence_id.as_bytes(),
            content_hash.as_bytes(),
            prev_hash.as_bytes(),
            created_at.as_bytes(),
        ],
    )
}

pub fn recompute_block_hash(
    index: u64,
    timestamp: &str,
    prev_hash: &str,
    data: &str,
    nonce: u64,
) -> String {
    hash_fields(
        BLOCK_TAG,
        &[
            index.to_string().as_bytes(),
            timestamp.as_bytes(),
            prev_hash.as_bytes(),
            data.as_bytes(),
            nonce.to_string().as_bytes(),
        ],
    )
}

/// True iff the hex form of `hash` starts with `difficulty` `'0'` characters.
pub fn satisfies_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Scan ledger entries from index 0.
///
/// An entry is valid when its position, stored hash, predecessor link and
/// timestamp ordering all check out. `length` is always the full slice
/// length, so a failed scan still reports how much was examined.
pub fn verify_entries(entries: &[LedgerEntry]) -> LedgerVerification {
    let mut first_invalid = None;
    let mut expected_prev: &str = ZERO_HASH;
    let mut prev_created: Option<DateTime<Utc>> = None;

    for (position, entry) in entries.iter().enumerate() {
        let created = DateTime::parse_from_rfc3339(&entry.created_at)
            .ok()
            .map(|t| t.with_timezone(&Utc));
        let ordered = match (created, prev_created) {
            (Some(now), Some(before)) => now >= before,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let valid = entry.index == position as u64
            && entry.prev_hash == expected_prev
            && ordered
            && recompute_entry_hash(
                entry.index,
                &entry.evidence_id,
                &entry.content_hash,
                &entry.prev_hash,
                &entry.created_at,
            ) == entry.entry_hash;

        if !valid && first_invalid.is_none() {
            first_invalid = Some(position as u64);
        }

        expected_prev = entry.entry_hash.as_str();
        if created.is_some() {
            prev_created = created;
        }
    }

    LedgerVerification {
        ok: first_invalid.is_none(),
        length: entries.len() as u64,
        first_invalid,
    }
}

/// Scan blocks from genesis, checking hash, proof-of-work and linkage.
///
/// Proof-of-work is checked against the block's declared difficulty or
/// `min_difficulty`, whichever is higher.
pub fn verify_blocks(blocks: &[Block], min_difficulty: u32) -> ChainVerification {
    let mut first_invalid = None;
    let mut expected_prev: &str = ZERO_HASH;

    for (position, block) in blocks.iter().enumerate() {
        let valid = block.index == position as u64
            && block.prev_hash == expected_prev
            && satisfies_difficulty(&block.hash, block.difficulty.max(min_difficulty))
            && recompute_block_hash(
                block.index,
                &block.timestamp,
                &block.prev_hash,
                &block.data,
                block.nonce,
            ) == block.hash;

        if !valid && first_invalid.is_none() {
            first_invalid = Some(position as u64);
        }
        expected_prev = block.hash.as_str();
    }

    ChainVerification {
        ok: first_invalid.is_none(),
        height: blocks.len() as u64,
        first_invalid,
    }
}
