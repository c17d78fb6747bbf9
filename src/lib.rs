pub mod anchor;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod server;
pub mod verifier;
