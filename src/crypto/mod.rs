/// Cryptographic primitives shared by the ledger and the anchor chain.
pub mod hash;
