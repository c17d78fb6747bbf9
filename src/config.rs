/// Process configuration.
///
/// Every option can be given on the command line or through the
/// environment. The anchor mode is read once at startup and fixed for the
/// lifetime of the process.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::anchor::ethereum::{EthereumClient, EthereumConfig};
use crate::anchor::AnchorGateway;
use crate::chain::pow::MiningBudget;
use crate::chain::BlockChain;
use crate::error::{LedgerError, Result};
use crate::verifier::MAX_DIFFICULTY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorMode {
    Off,
    Local,
    Eth,
}

impl FromStr for AnchorMode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "local" => Ok(Self::Local),
            "eth" => Ok(Self::Eth),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown anchor mode {other:?} (expected off, local or eth)"
            ))),
        }
    }
}

impl fmt::Display for AnchorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Local => "local",
            Self::Eth => "eth",
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Address the HTTP API listens on
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8000")]
    pub listen: String,

    /// Anchor mode: off, local or eth
    #[arg(long, env = "ANCHOR_MODE", default_value = "local")]
    pub anchor_mode: AnchorMode,

    /// Leading zero hex characters required of mined blocks
    #[arg(long, env = "POW_DIFFICULTY", default_value_t = 3)]
    pub difficulty: u32,

    /// Maximum nonces tried per mining run
    #[arg(long, env = "POW_MAX_ATTEMPTS", default_value_t = 5_000_000)]
    pub max_attempts: u64,

    /// Wall-clock bound per mining run, in milliseconds
    #[arg(long, env = "POW_TIMEOUT_MS")]
    pub mining_timeout_ms: Option<u64>,

    /// Mine an empty genesis block at startup
    #[arg(long, env = "MINE_GENESIS", default_value_t = false)]
    pub mine_genesis: bool,

    /// Anchor the ledger digest every N seconds
    #[arg(long, env = "ANCHOR_INTERVAL_SECS")]
    pub anchor_interval_secs: Option<u64>,

    /// Ethereum JSON-RPC endpoint (eth mode)
    #[arg(long, env = "ETH_RPC_URL")]
    pub eth_rpc_url: Option<String>,

    /// Ethereum signing key, hex (eth mode)
    #[arg(long, env = "ETH_PRIVATE_KEY", hide_env_values = true)]
    pub eth_private_key: Option<String>,

    /// Ethereum chain ID (eth mode)
    #[arg(long, env = "ETH_CHAIN_ID", default_value_t = 11155111)]
    pub eth_chain_id: u64,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidInput(format!(
                "difficulty {} exceeds maximum {MAX_DIFFICULTY}",
                self.difficulty
            )));
        }
        if self.anchor_interval_secs == Some(0) {
            return Err(LedgerError::InvalidInput(
                "anchor interval must be at least one second".into(),
            ));
        }
        Ok(())
    }

    pub fn mining_budget(&self) -> MiningBudget {
        MiningBudget {
            max_attempts: self.max_attempts,
            timeout: self.mining_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn anchor_interval(&self) -> Option<Duration> {
        self.anchor_interval_secs.map(Duration::from_secs)
    }

    /// The startup chain. `difficulty` is its minimum, and with
    /// `mine_genesis` set the genesis block is mined on the blocking pool.
    pub async fn build_chain(&self) -> Result<BlockChain> {
        if !self.mine_genesis {
            return Ok(BlockChain::with_min_difficulty(self.difficulty));
        }

        let (difficulty, budget) = (self.difficulty, self.mining_budget());
        tokio::task::spawn_blocking(move || BlockChain::with_genesis(difficulty, &budget))
            .await
            .map_err(|e| LedgerError::Internal(format!("Genesis mining task failed: {e}")))?
    }

    /// Build the gateway for the configured mode around `chain`.
    pub fn anchor_gateway(&self, chain: Arc<BlockChain>) -> AnchorGateway {
        match self.anchor_mode {
            AnchorMode::Off => AnchorGateway::Off,
            AnchorMode::Local => AnchorGateway::Local {
                chain,
                difficulty: self.difficulty,
                budget: self.mining_budget(),
            },
            AnchorMode::Eth => AnchorGateway::Eth {
                client: Arc::new(EthereumClient::new(EthereumConfig {
                    rpc_url: self.eth_rpc_url.clone(),
                    private_key_hex: self.eth_private_key.clone(),
                    chain_id: self.eth_chain_id,
                })),
            },
        }
    }
}
