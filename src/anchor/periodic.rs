/// Periodic ledger anchoring.
///
/// On a fixed interval, the current ledger digest (length and tip hash)
/// is submitted to the anchor gateway. A digest that was already
/// anchored is skipped, so an idle ledger does not grow the chain.
///
/// ```text
/// EvidenceLedger ──digest──▶ AnchorGateway ──┬──▶ local BlockChain
///                                            └──▶ Ethereum calldata
/// ```
///
/// Failures are logged and retried on the next tick. With anchoring off
/// the job never starts, since there is nothing to commit to.
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{AnchorGateway, AnchorResult};
use crate::config::AnchorMode;
use crate::error::Result;
use crate::ledger::{EvidenceLedger, LedgerDigest};

/// Tracks the last digest committed by the job.
#[derive(Debug, Default)]
pub struct PeriodicAnchor {
    last_anchored: Option<LedgerDigest>,
}

impl PeriodicAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_anchored(&self) -> Option<&LedgerDigest> {
        self.last_anchored.as_ref()
    }

    /// Anchor the ledger digest if it changed since the last success.
    ///
    /// Returns `Ok(None)` when there was nothing new to anchor, or when
    /// the gateway is off and nothing would be committed.
    pub async fn tick(
        &mut self,
        ledger: &EvidenceLedger,
        gateway: &AnchorGateway,
    ) -> Result<Option<AnchorResult>> {
        if gateway.mode() == AnchorMode::Off {
            return Ok(None);
        }
        let Some(digest) = ledger.digest() else {
            return Ok(None);
        };
        if self.last_anchored.as_ref() == Some(&digest) {
            return Ok(None);
        }

        let result = gateway.anchor(&digest.anchor_text()).await?;
        info!(
            length = digest.length,
            tip_hash = %digest.tip_hash,
            "Ledger digest anchored"
        );
        self.last_anchored = Some(digest);
        Ok(Some(result))
    }
}

/// Spawn the anchoring loop on the current runtime.
///
/// Returns `None` without spawning when the gateway is off.
pub fn spawn(
    ledger: Arc<EvidenceLedger>,
    gateway: Arc<AnchorGateway>,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if gateway.mode() == AnchorMode::Off {
        info!("Anchor mode is off; periodic ledger anchoring skipped");
        return None;
    }

    info!(interval_secs = every.as_secs(), "Periodic ledger anchoring enabled");
    Some(tokio::spawn(async move {
        let mut job = PeriodicAnchor::new();
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = job.tick(&ledger, &gateway).await {
                error!(error = %e, "Periodic ledger anchoring failed");
            }
        }
    }))
}
