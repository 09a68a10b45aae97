use crate::domain::fraud::FraudVerdict;
use crate::domain::ports::{
    FraudScreener, HistoryRecorder, Ledger, LedgerReceipt, MarketplaceGateway, OrderQuote,
    TransactionStore,
};
use crate::domain::transaction::{
    HistoryRecord, SettlementRef, Transaction, TransactionId, TransactionStatus,
};
use crate::domain::wallet::{
    Amount, Balance, MutationDirection, MutationLogEntry, UserId, Wallet, WalletId,
};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Balance plus mutation log for one wallet, guarded by one lock so the
/// read-modify-write-append window is exclusive.
#[derive(Debug)]
struct WalletCell {
    wallet: Wallet,
    log: Vec<MutationLogEntry>,
}

/// In-memory wallet ledger.
///
/// Each wallet lives behind its own `tokio::sync::Mutex`, so mutations on one
/// wallet are totally ordered by lock acquisition while different wallets
/// never block each other. `Clone` shares the underlying map.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    cells: Arc<DashMap<WalletId, Arc<Mutex<WalletCell>>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a wallet. Wallet creation is an admin concern, not part of
    /// the ledger contract, so it lives on the concrete type only.
    pub fn create_wallet(&self, wallet: Wallet) {
        self.cells.insert(
            wallet.id,
            Arc::new(Mutex::new(WalletCell {
                wallet,
                log: Vec::new(),
            })),
        );
    }

    fn cell(&self, wallet_id: WalletId) -> Result<Arc<Mutex<WalletCell>>> {
        self.cells
            .get(&wallet_id)
            .map(|cell| cell.value().clone())
            .ok_or(PaymentError::WalletNotFound(wallet_id))
    }

    async fn mutate(
        &self,
        wallet_id: WalletId,
        direction: MutationDirection,
        amount: Amount,
        reference: Option<String>,
    ) -> Result<LedgerReceipt> {
        let cell = self.cell(wallet_id)?;
        let mut cell = cell.lock().await;

        let balance_before = cell.wallet.balance;
        match direction {
            MutationDirection::Debit => cell.wallet.debit(amount)?,
            MutationDirection::Credit => cell.wallet.credit(amount)?,
        }
        let entry = MutationLogEntry::new(
            wallet_id,
            direction,
            amount,
            balance_before,
            cell.wallet.balance,
            reference,
        );
        cell.log.push(entry.clone());
        debug!(
            wallet = %wallet_id,
            direction = ?direction,
            balance = %cell.wallet.balance,
            "ledger mutation applied"
        );

        Ok(LedgerReceipt {
            balance_after: cell.wallet.balance,
            mutation: entry,
        })
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>> {
        match self.cells.get(&wallet_id).map(|cell| cell.value().clone()) {
            Some(cell) => Ok(Some(cell.lock().await.wallet.clone())),
            None => Ok(None),
        }
    }

    async fn debit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        reference: Option<String>,
    ) -> Result<LedgerReceipt> {
        self.mutate(wallet_id, MutationDirection::Debit, amount, reference)
            .await
    }

    async fn credit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        reference: Option<String>,
    ) -> Result<LedgerReceipt> {
        self.mutate(wallet_id, MutationDirection::Credit, amount, reference)
            .await
    }

    async fn balance(&self, wallet_id: WalletId) -> Result<Balance> {
        let cell = self.cell(wallet_id)?;
        let cell = cell.lock().await;
        Ok(cell.wallet.balance)
    }

    async fn history(&self, wallet_id: WalletId) -> Result<Vec<MutationLogEntry>> {
        let cell = self.cell(wallet_id)?;
        let cell = cell.lock().await;
        Ok(cell.log.clone())
    }
}

/// The amount-tier fraud screener with an in-memory audit trail. The tier
/// logic itself is the production rule set; only the verdict storage is
/// memory-backed.
#[derive(Default, Clone)]
pub struct AmountTierScreener {
    audit: Arc<RwLock<Vec<FraudVerdict>>>,
}

impl AmountTierScreener {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn audit_log(&self) -> Vec<FraudVerdict> {
        self.audit.read().await.clone()
    }
}

#[async_trait]
impl FraudScreener for AmountTierScreener {
    async fn classify(&self, user_id: UserId, amount: Decimal) -> Result<FraudVerdict> {
        let verdict = FraudVerdict::new(user_id, amount);
        self.audit.write().await.push(verdict.clone());
        Ok(verdict)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Processed,
}

#[derive(Debug, Clone)]
struct MarketplaceOrder {
    amount: Decimal,
    status: OrderStatus,
}

/// In-memory stand-in for the external marketplace order system.
#[derive(Default, Clone)]
pub struct InMemoryMarketplace {
    orders: Arc<DashMap<SettlementRef, MarketplaceOrder>>,
}

impl InMemoryMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_order(&self, reference: SettlementRef, amount: Decimal) {
        self.orders.insert(
            reference,
            MarketplaceOrder {
                amount,
                status: OrderStatus::Pending,
            },
        );
    }

    pub fn order_status(&self, reference: &SettlementRef) -> Option<OrderStatus> {
        self.orders.get(reference).map(|order| order.status)
    }
}

#[async_trait]
impl MarketplaceGateway for InMemoryMarketplace {
    async fn validate_order(&self, reference: &SettlementRef) -> Result<OrderQuote> {
        self.orders
            .get(reference)
            .map(|order| OrderQuote {
                reference: reference.clone(),
                expected_amount: order.amount,
            })
            .ok_or_else(|| PaymentError::ReferenceNotFound(reference.clone()))
    }

    async fn settle(&self, reference: &SettlementRef) -> Result<()> {
        let mut order = self
            .orders
            .get_mut(reference)
            .ok_or_else(|| PaymentError::ReferenceNotFound(reference.clone()))?;
        order.status = OrderStatus::Processed;
        Ok(())
    }
}

/// A thread-safe in-memory store for transactions.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn store(&self, tx: Transaction) -> Result<()> {
        self.transactions.write().await.insert(tx.id, tx);
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn find_settled(&self, reference: &SettlementRef) -> Result<Option<Transaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .find(|tx| {
                tx.status == TransactionStatus::Success
                    && tx.reference.as_ref() == Some(reference)
            })
            .cloned())
    }
}

/// Append-only, in-memory history sink.
#[derive(Default, Clone)]
pub struct InMemoryHistoryRecorder {
    records: Arc<RwLock<Vec<HistoryRecord>>>,
}

impl InMemoryHistoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<HistoryRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl HistoryRecorder for InMemoryHistoryRecorder {
    async fn append(&self, record: HistoryRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}
