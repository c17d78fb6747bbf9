/// SHA-256 hashing utilities for the custody ledger.
///
/// SHA-256 is used throughout the system for:
/// - Ledger entry hashes (with domain separation)
/// - Block hashes and the proof-of-work target
/// - Digests of anchor text sent to external chains
///
/// Hash inputs are framed field by field: a domain tag, then every field
/// as a 4-byte big-endian length followed by its bytes. This keeps two
/// different field splits from ever producing the same preimage.
use sha2::{Digest, Sha256};

/// Length in hex characters of a SHA-256 digest.
pub const HEX_DIGEST_LEN: usize = 64;

/// `prev_hash` of the first element of every chain.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash arbitrary data with SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Hash arbitrary data and return the lowercase hex digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Hash a sequence of fields under a domain tag.
pub fn hash_fields(tag: &[u8], fields: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    for field in fields {
        hasher.update((field.len() as u32).to_be_bytes());
        hasher.update(field);
    }
    hex::encode(hasher.finalize())
}

/// Whether `s` is a hex-encoded SHA-256 digest (64 hex characters, either case).
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == HEX_DIGEST_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}
