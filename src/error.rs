use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No entry at index {0}")]
    NotFound(u64),

    #[error("Mining gave up after {attempts} attempts without meeting the difficulty target")]
    MiningTimeout { attempts: u64 },

    #[error("Chain tip moved while mining; candidate block discarded")]
    StaleTip,

    #[error("External anchor is not configured")]
    AnchorUnconfigured,

    #[error("External anchor failed: {0}")]
    ExternalAnchor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Whether the caller may retry the same request, possibly with a
    /// lower difficulty or a larger budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MiningTimeout { .. } | Self::StaleTip)
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
