use crate::domain::{AccountId, EscrowId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("escrow amount must be a positive number of planck")]
    InvalidAmount,
    #[error("invalid signer set: {0}")]
    InvalidSignerSet(String),
    #[error("escrow id {0} already exists")]
    DuplicateId(EscrowId),
    #[error("escrow {0} not found")]
    EscrowNotFound(EscrowId),
    #[error("account {account} is not a signer of escrow {escrow}")]
    NotASigner { escrow: EscrowId, account: AccountId },
    #[error("escrow {0} is not active")]
    EscrowNotActive(EscrowId),
    #[error("insufficient funds on account {0}")]
    InsufficientFunds(AccountId),
    #[error("account {0} is frozen")]
    AccountFrozen(AccountId),
    #[error("settlement of escrow {escrow} failed: {source}")]
    SettlementFailure {
        escrow: EscrowId,
        #[source]
        source: Box<EscrowError>,
    },
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),
}

impl EscrowError {
    /// Wraps a ledger rejection so the epoch pass can log it and leave the
    /// escrow active for the next retry.
    pub fn settlement(escrow: EscrowId, source: EscrowError) -> Self {
        Self::SettlementFailure {
            escrow,
            source: Box::new(source),
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for EscrowError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(Box::new(e))
    }
}

impl From<serde_json::Error> for EscrowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, EscrowError>;
