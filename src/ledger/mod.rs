/// Append-only evidence ledger.
///
/// Each entry attests to the SHA-256 digest of one piece of evidence and
/// carries the hash of its predecessor, so no entry can be altered,
/// dropped or reordered without `verify()` noticing.
///
/// ```text
/// [0] prev = 000…0 ──▶ [1] prev = hash(0) ──▶ [2] prev = hash(1) ──▶ …
/// ```
///
/// Appends are serialized by an exclusive lock held across
/// "read tail → compute entry → push", so two writers can never link to
/// the same tail. Reads and `verify()` share the lock and therefore
/// always observe a consistent prefix of the sequence.
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::crypto::hash::{is_hex_digest, ZERO_HASH};
use crate::error::{LedgerError, Result};
use crate::verifier;

/// One immutable ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Position in the ledger, starting at 0 with no gaps.
    pub index: u64,
    /// Opaque identifier of the evidence record.
    pub evidence_id: String,
    /// Lowercase hex SHA-256 of the evidence content.
    pub content_hash: String,
    /// `entry_hash` of the previous entry, or 64 zeros for index 0.
    pub prev_hash: String,
    pub entry_hash: String,
    /// RFC 3339 UTC timestamp with microseconds.
    pub created_at: String,
}

/// Result of a full ledger scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerVerification {
    pub ok: bool,
    /// Number of entries examined; always the full ledger length.
    pub length: u64,
    /// Index of the first entry that failed to verify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_invalid: Option<u64>,
}

/// Compact commitment to the whole ledger: its length and tip hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDigest {
    pub length: u64,
    pub tip_hash: String,
}

impl LedgerDigest {
    /// Text committed to an anchor chain for this digest.
    pub fn anchor_text(&self) -> String {
        format!("ledger:{}:{}", self.length, self.tip_hash)
    }
}

/// The evidence ledger. Construct one per process and share it by `Arc`.
#[derive(Debug, Default)]
pub struct EvidenceLedger {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl EvidenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry for `evidence_id` attesting to `content_hash`.
    ///
    /// Input is validated before the lock is taken; nothing is written on
    /// failure.
    pub fn append(&self, evidence_id: &str, content_hash: &str) -> Result<LedgerEntry> {
        if evidence_id.trim().is_empty() {
            return Err(LedgerError::InvalidInput(
                "evidence_id must not be empty".into(),
            ));
        }
        if !is_hex_digest(content_hash) {
            return Err(LedgerError::InvalidInput(format!(
                "content_hash must be 64 hex characters, got {:?}",
                content_hash
            )));
        }
        let content_hash = content_hash.to_ascii_lowercase();

        let mut entries = self.entries.write();

        let index = entries.len() as u64;
        let prev = entries.last();
        let prev_hash = prev.map_or_else(|| ZERO_HASH.to_string(), |e| e.entry_hash.clone());

        let mut created_at = verifier::canonical_timestamp(&Utc::now());
        if let Some(prev) = prev {
            // Never let the clock run the ledger backwards.
            if !not_before(&created_at, &prev.created_at) {
                warn!(
                    index,
                    now = %created_at,
                    previous = %prev.created_at,
                    "Clock regressed; reusing previous entry timestamp"
                );
                created_at = prev.created_at.clone();
            }
        }

        let entry_hash = verifier::recompute_entry_hash(
            index,
            evidence_id,
            &content_hash,
            &prev_hash,
            &created_at,
        );

        let entry = LedgerEntry {
            index,
            evidence_id: evidence_id.to_string(),
            content_hash,
            prev_hash,
            entry_hash,
            created_at,
        };
        entries.push(entry.clone());

        info!(
            index,
            evidence_id = %entry.evidence_id,
            entry_hash = %entry.entry_hash,
            "Ledger entry appended"
        );

        Ok(entry)
    }

    pub fn get(&self, index: u64) -> Result<LedgerEntry> {
        let entries = self.entries.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| entries.get(i))
            .cloned()
            .ok_or(LedgerError::NotFound(index))
    }

    /// Current entry count.
    pub fn length(&self) -> u64 {
        self.entries.read().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Up to `limit` entries starting at `offset`, in ascending index order.
    pub fn entries(&self, offset: u64, limit: usize) -> Vec<LedgerEntry> {
        let entries = self.entries.read();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(entries.len());
        entries[start..].iter().take(limit).cloned().collect()
    }

    pub fn tail(&self) -> Option<LedgerEntry> {
        self.entries.read().last().cloned()
    }

    /// Length and tip hash, or `None` while the ledger is empty.
    pub fn digest(&self) -> Option<LedgerDigest> {
        let entries = self.entries.read();
        entries.last().map(|tip| LedgerDigest {
            length: entries.len() as u64,
            tip_hash: tip.entry_hash.clone(),
        })
    }

    /// Recompute every entry hash and link over one consistent snapshot.
    pub fn verify(&self) -> LedgerVerification {
        let entries = self.entries.read();
        verifier::verify_entries(&entries)
    }

    /// Rewrite a stored entry in place. Test-only: simulates tampering with
    /// the backing store.
    #[cfg(test)]
    pub(crate) fn tamper(&self, index: usize, f: impl FnOnce(&mut LedgerEntry)) {
        let mut entries = self.entries.write();
        f(&mut entries[index]);
    }
}

/// `a >= b` for canonical timestamps. Unparseable values compare as ordered
/// so the caller falls back to its own clock.
fn not_before(a: &str, b: &str) -> bool {
    match (
        DateTime::parse_from_rfc3339(a),
        DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(a), Ok(b)) => a >= b,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::hash::sha256_hex;

    fn digest(s: &str) -> String {
        sha256_hex(s.as_bytes())
    }

    fn ledger_with(ids: &[&str]) -> EvidenceLedger {
        let ledger = EvidenceLedger::new();
        for id in ids {
            ledger.append(id, &digest(id)).unwrap();
        }
        ledger
    }

    #[test]
    fn test_empty_ledger_verifies() {
        let ledger = EvidenceLedger::new();
        assert_eq!(ledger.length(), 0);
        assert!(ledger.is_empty());
        assert_eq!(ledger.digest(), None);
        let v = ledger.verify();
        assert!(v.ok);
        assert_eq!(v.length, 0);
    }

    #[test]
    fn test_three_entries_verify() {
        let ledger = ledger_with(&["e1", "e2", "e3"]);
        assert_eq!(
            ledger.verify(),
            LedgerVerification {
                ok: true,
                length: 3,
                first_invalid: None
            }
        );
    }

    #[test]
    fn test_first_entry_links_to_sentinel() {
        let ledger = ledger_with(&["e1", "e2"]);
        let first = ledger.get(0).unwrap();
        let second = ledger.get(1).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.prev_hash, ZERO_HASH);
        assert_eq!(second.prev_hash, first.entry_hash);
    }

    #[test]
    fn test_tampered_content_hash_detected() {
        let ledger = ledger_with(&["e1", "e2", "e3"]);
        ledger.tamper(1, |e| e.content_hash = digest("forged"));
        let v = ledger.verify();
        assert!(!v.ok);
        assert_eq!(v.length, 3);
        assert_eq!(v.first_invalid, Some(1));
    }

    #[test]
    fn test_tampered_prev_hash_detected() {
        let ledger = ledger_with(&["e1", "e2", "e3"]);
        ledger.tamper(2, |e| e.prev_hash = ZERO_HASH.to_string());
        let v = ledger.verify();
        assert!(!v.ok);
        assert_eq!(v.length, 3);
        assert_eq!(v.first_invalid, Some(2));
    }

    #[test]
    fn test_rehashed_entry_breaks_successor_link() {
        let ledger = ledger_with(&["e1", "e2", "e3"]);
        ledger.tamper(0, |e| {
            e.content_hash = digest("forged");
            e.entry_hash = verifier::recompute_entry_hash(
                e.index,
                &e.evidence_id,
                &e.content_hash,
                &e.prev_hash,
                &e.created_at,
            );
        });
        let v = ledger.verify();
        assert!(!v.ok);
        assert_eq!(v.first_invalid, Some(1));
    }

    #[test]
    fn test_stored_hash_recomputes() {
        let ledger = ledger_with(&["a", "b"]);
        for e in ledger.entries(0, 10) {
            let recomputed = verifier::recompute_entry_hash(
                e.index,
                &e.evidence_id,
                &e.content_hash,
                &e.prev_hash,
                &e.created_at,
            );
            assert_eq!(recomputed, e.entry_hash);
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        let ledger = EvidenceLedger::new();
        assert!(matches!(
            ledger.append("", &digest("x")),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.append("   ", &digest("x")),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.append("e1", "deadbeef"),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.append("e1", &"z".repeat(64)),
            Err(LedgerError::InvalidInput(_))
        ));
        assert_eq!(ledger.length(), 0);
    }

    #[test]
    fn test_content_hash_normalized_to_lowercase() {
        let ledger = EvidenceLedger::new();
        let upper = digest("x").to_uppercase();
        let entry = ledger.append("e1", &upper).unwrap();
        assert_eq!(entry.content_hash, digest("x"));
        assert!(ledger.verify().ok);
    }

    #[test]
    fn test_get_out_of_range() {
        let ledger = ledger_with(&["e1"]);
        assert!(matches!(ledger.get(1), Err(LedgerError::NotFound(1))));
        assert!(matches!(
            ledger.get(u64::MAX),
            Err(LedgerError::NotFound(u64::MAX))
        ));
    }

    #[test]
    fn test_entries_paging() {
        let ledger = ledger_with(&["a", "b", "c", "d"]);
        let page: Vec<u64> = ledger.entries(1, 2).iter().map(|e| e.index).collect();
        assert_eq!(page, vec![1, 2]);
        assert!(ledger.entries(10, 5).is_empty());
        assert_eq!(ledger.entries(3, 100).len(), 1);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let ledger = ledger_with(&["a", "b", "c", "d", "e"]);
        let entries = ledger.entries(0, 10);
        for pair in entries.windows(2) {
            assert!(not_before(&pair[1].created_at, &pair[0].created_at));
        }
    }

    #[test]
    fn test_digest_tracks_tip() {
        let ledger = ledger_with(&["a", "b"]);
        let d = ledger.digest().unwrap();
        assert_eq!(d.length, 2);
        assert_eq!(d.tip_hash, ledger.tail().unwrap().entry_hash);
        assert_eq!(d.anchor_text(), format!("ledger:2:{}", d.tip_hash));
    }

    #[test]
    fn test_concurrent_appends_never_fork() {
        let ledger = Arc::new(EvidenceLedger::new());
        std::thread::scope(|s| {
            for t in 0..8 {
                let ledger = Arc::clone(&ledger);
                s.spawn(move || {
                    for i in 0..50 {
                        let id = format!("t{t}-{i}");
                        ledger.append(&id, &digest(&id)).unwrap();
                    }
                });
            }
        });

        assert_eq!(ledger.length(), 400);
        let entries = ledger.entries(0, 400);
        let mut prevs: Vec<&str> = entries.iter().map(|e| e.prev_hash.as_str()).collect();
        prevs.sort_unstable();
        prevs.dedup();
        assert_eq!(prevs.len(), 400);
        assert!(ledger.verify().ok);
    }

    #[test]
    fn test_verify_during_appends_is_consistent() {
        let ledger = Arc::new(EvidenceLedger::new());
        std::thread::scope(|s| {
            let writer = Arc::clone(&ledger);
            s.spawn(move || {
                for i in 0..200 {
                    let id = format!("w{i}");
                    writer.append(&id, &digest(&id)).unwrap();
                }
            });
            for _ in 0..50 {
                assert!(ledger.verify().ok);
            }
        });
        assert_eq!(ledger.verify().length, 200);
    }
}
