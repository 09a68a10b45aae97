use crate::domain::transaction::SettlementRef;
use crate::domain::wallet::WalletId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Error taxonomy for the transaction saga.
///
/// Every variant identifies the gate that failed. Variants raised before the
/// ledger commit imply zero durable side effects; anything after the commit is
/// surfaced through the orchestrator's reconciliation log instead.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("amount must be strictly positive")]
    InvalidAmount,
    #[error("wallet {0} not found")]
    WalletNotFound(WalletId),
    #[error("wallet {0} is frozen")]
    WalletFrozen(WalletId),
    #[error("insufficient funds in wallet {0}")]
    InsufficientFunds(WalletId),
    #[error("transaction rejected by fraud screening: {0}")]
    FraudRejected(String),
    #[error("no marketplace order matches settlement reference {0}")]
    ReferenceNotFound(SettlementRef),
    #[error("settlement amount mismatch: order expects {expected}, request carries {requested}")]
    SettlementMismatch {
        expected: Decimal,
        requested: Decimal,
    },
    #[error("settlement reference {0} already produced a successful transaction")]
    DuplicateSettlement(SettlementRef),
    #[error("{0} did not respond in time")]
    DownstreamUnavailable(&'static str),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl PaymentError {
    /// True when the failure was a collaborator timeout and the caller may
    /// retry the request as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DownstreamUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
