use crate::domain::fraud::FraudVerdict;
use crate::domain::transaction::{
    HistoryRecord, SettlementRef, Transaction, TransactionId,
};
use crate::domain::wallet::{
    Amount, Balance, MutationLogEntry, UserId, Wallet, WalletId,
};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Outcome of a single ledger mutation: the settled balance and the log entry
/// appended in the same atomic step.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerReceipt {
    pub balance_after: Balance,
    pub mutation: MutationLogEntry,
}

/// What the marketplace knows about an order awaiting settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuote {
    pub reference: SettlementRef,
    pub expected_amount: Decimal,
}

/// Authoritative wallet balances plus their append-only mutation logs.
///
/// Implementations must serialize mutations per wallet: the read-modify-write
/// window for one wallet is exclusive, while different wallets proceed
/// independently.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>>;
    async fn debit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        reference: Option<String>,
    ) -> Result<LedgerReceipt>;
    async fn credit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        reference: Option<String>,
    ) -> Result<LedgerReceipt>;
    async fn balance(&self, wallet_id: WalletId) -> Result<Balance>;
    async fn history(&self, wallet_id: WalletId) -> Result<Vec<MutationLogEntry>>;
}

/// Stateless amount/user classifier that persists one audit verdict per call.
#[async_trait]
pub trait FraudScreener: Send + Sync {
    async fn classify(&self, user_id: UserId, amount: Decimal) -> Result<FraudVerdict>;
}

/// Adapter over the external order system used by PAYMENT transactions.
#[async_trait]
pub trait MarketplaceGateway: Send + Sync {
    async fn validate_order(&self, reference: &SettlementRef) -> Result<OrderQuote>;
    async fn settle(&self, reference: &SettlementRef) -> Result<()>;
}

/// Best-effort, append-only sink for finalized transaction snapshots.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn append(&self, record: HistoryRecord) -> Result<()>;
}

/// Persistence for transactions, indexed by settlement reference for the
/// idempotency lookup.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn store(&self, tx: Transaction) -> Result<()>;
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>>;
    /// Finds the successful transaction that already claimed `reference`,
    /// if any.
    async fn find_settled(&self, reference: &SettlementRef) -> Result<Option<Transaction>>;
}

pub type LedgerBox = Box<dyn Ledger>;
pub type FraudScreenerBox = Box<dyn FraudScreener>;
pub type MarketplaceGatewayBox = Box<dyn MarketplaceGateway>;
pub type HistoryRecorderBox = Box<dyn HistoryRecorder>;
pub type TransactionStoreBox = Box<dyn TransactionStore>;
