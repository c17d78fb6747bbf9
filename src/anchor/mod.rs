/// Anchoring text into an immutable chain.
///
/// The gateway is selected once at startup and never changes:
/// - `off`: anchoring disabled, requests are acknowledged with a note
/// - `local`: text is mined into the in-process [`BlockChain`]
/// - `eth`: text is committed through an [`ExternalChainClient`]
///
/// This is the only place that branches on the anchor mode; the ledger
/// and the chain know nothing about it.
pub mod ethereum;
pub mod periodic;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::chain::pow::MiningBudget;
use crate::chain::{Block, BlockChain};
use crate::config::AnchorMode;
use crate::error::{LedgerError, Result};

const OFF_NOTE: &str = "Blockchain anchoring is disabled (ANCHOR_MODE=off)";

/// Client for an external chain that can record anchor text.
#[async_trait]
pub trait ExternalChainClient: Send + Sync {
    /// Name of the chain (e.g., "Ethereum").
    fn chain_name(&self) -> &str;

    /// Whether credentials and an endpoint are available.
    fn is_configured(&self) -> bool;

    /// Commit `text` and return the transaction hash.
    async fn submit(&self, text: &str) -> Result<String>;
}

/// Outcome of an anchor request, tagged by mode on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AnchorResult {
    Off { note: String },
    Local { block: Block },
    Eth { tx_hash: String, configured: bool },
}

/// Mode-specific status, tagged by mode on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AnchorStatus {
    Off {
        note: String,
    },
    Local {
        ok: bool,
        height: u64,
        tip_hash: Option<String>,
    },
    Eth {
        configured: bool,
    },
}

pub enum AnchorGateway {
    Off,
    Local {
        chain: Arc<BlockChain>,
        difficulty: u32,
        budget: MiningBudget,
    },
    Eth {
        client: Arc<dyn ExternalChainClient>,
    },
}

impl AnchorGateway {
    pub fn mode(&self) -> AnchorMode {
        match self {
            Self::Off => AnchorMode::Off,
            Self::Local { .. } => AnchorMode::Local,
            Self::Eth { .. } => AnchorMode::Eth,
        }
    }

    pub fn status(&self) -> AnchorStatus {
        match self {
            Self::Off => AnchorStatus::Off {
                note: OFF_NOTE.to_string(),
            },
            Self::Local { chain, .. } => {
                let verification = chain.verify();
                let status = chain.status();
                AnchorStatus::Local {
                    ok: verification.ok,
                    height: status.height,
                    tip_hash: status.tip_hash,
                }
            }
            Self::Eth { client } => AnchorStatus::Eth {
                configured: client.is_configured(),
            },
        }
    }

    /// Anchor `text` according to the configured mode.
    ///
    /// Local mining runs on the blocking pool so it never stalls the
    /// async executor.
    pub async fn anchor(&self, text: &str) -> Result<AnchorResult> {
        match self {
            Self::Off => Ok(AnchorResult::Off {
                note: OFF_NOTE.to_string(),
            }),
            Self::Local {
                chain,
                difficulty,
                budget,
            } => {
                require_text(text)?;
                let text = text.to_string();
                let chain = Arc::clone(chain);
                let (difficulty, budget) = (*difficulty, *budget);

                let block = tokio::task::spawn_blocking(move || {
                    chain.mine(&text, difficulty, &budget)
                })
                .await
                .map_err(|e| LedgerError::Internal(format!("Mining task failed: {e}")))??;

                info!(index = block.index, hash = %block.hash, "Anchored to local chain");
                Ok(AnchorResult::Local { block })
            }
            Self::Eth { client } => {
                if !client.is_configured() {
                    return Err(LedgerError::AnchorUnconfigured);
                }
                require_text(text)?;
                let tx_hash = client.submit(text).await?;

                info!(chain = client.chain_name(), tx_hash = %tx_hash, "Anchored to external chain");
                Ok(AnchorResult::Eth {
                    tx_hash,
                    configured: true,
                })
            }
        }
    }
}

/// Blank text is refused. Anything else is anchored byte for byte.
fn require_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(LedgerError::InvalidInput(
            "anchor text must not be empty".into(),
        ));
    }
    Ok(())
}
