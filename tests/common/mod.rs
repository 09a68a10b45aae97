#![allow(dead_code)]

use async_trait::async_trait;
use payflow::application::orchestrator::TransactionOrchestrator;
use payflow::domain::ports::{
    FraudScreener, HistoryRecorder, Ledger, LedgerReceipt, MarketplaceGateway, OrderQuote,
};
use payflow::domain::transaction::{HistoryRecord, SettlementRef, TransactionRequest, TransactionType};
use payflow::domain::wallet::{Amount, Balance, MutationLogEntry, UserId, Wallet, WalletId, WalletStatus};
use payflow::error::{PaymentError, Result};
use payflow::infrastructure::in_memory::{
    AmountTierScreener, InMemoryHistoryRecorder, InMemoryLedger, InMemoryMarketplace,
    InMemoryTransactionStore,
};
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

/// Fully wired orchestrator over the in-memory adapters, with handles to each
/// adapter kept so tests can inspect state after the saga ran.
pub struct TestEnv {
    pub ledger: InMemoryLedger,
    pub screener: AmountTierScreener,
    pub marketplace: InMemoryMarketplace,
    pub history: InMemoryHistoryRecorder,
    pub store: InMemoryTransactionStore,
    pub orchestrator: TransactionOrchestrator,
}

impl TestEnv {
    pub fn new() -> Self {
        let ledger = InMemoryLedger::new();
        let screener = AmountTierScreener::new();
        let marketplace = InMemoryMarketplace::new();
        let history = InMemoryHistoryRecorder::new();
        let store = InMemoryTransactionStore::new();
        let orchestrator = TransactionOrchestrator::new(
            Box::new(ledger.clone()),
            Box::new(screener.clone()),
            Box::new(marketplace.clone()),
            Box::new(history.clone()),
            Box::new(store.clone()),
        );
        Self {
            ledger,
            screener,
            marketplace,
            history,
            store,
            orchestrator,
        }
    }

    pub fn seed_wallet(&self, balance: Decimal) -> Wallet {
        let wallet = Wallet::new(Uuid::new_v4(), Uuid::new_v4(), Balance::new(balance));
        self.ledger.create_wallet(wallet.clone());
        wallet
    }

    pub fn seed_frozen_wallet(&self, balance: Decimal) -> Wallet {
        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            balance: Balance::new(balance),
            status: WalletStatus::Frozen,
        };
        self.ledger.create_wallet(wallet.clone());
        wallet
    }

    pub fn seed_order(&self, reference: &str, amount: Decimal) -> SettlementRef {
        let reference = SettlementRef::new(reference);
        self.marketplace.register_order(reference.clone(), amount);
        reference
    }
}

pub fn deposit(wallet: &Wallet, amount: Decimal) -> TransactionRequest {
    TransactionRequest {
        user_id: wallet.user_id,
        wallet_id: wallet.id,
        kind: TransactionType::Deposit,
        amount,
        reference: None,
        destination_wallet_id: None,
        description: None,
    }
}

pub fn withdrawal(wallet: &Wallet, amount: Decimal) -> TransactionRequest {
    TransactionRequest {
        kind: TransactionType::Withdrawal,
        ..deposit(wallet, amount)
    }
}

pub fn payment(wallet: &Wallet, amount: Decimal, reference: &SettlementRef) -> TransactionRequest {
    TransactionRequest {
        kind: TransactionType::Payment,
        reference: Some(reference.clone()),
        ..deposit(wallet, amount)
    }
}

pub fn transfer(wallet: &Wallet, amount: Decimal, destination: WalletId) -> TransactionRequest {
    TransactionRequest {
        kind: TransactionType::Transfer,
        destination_wallet_id: Some(destination),
        ..deposit(wallet, amount)
    }
}

/// History sink that always refuses the append.
#[derive(Default, Clone)]
pub struct FailingHistoryRecorder;

#[async_trait]
impl HistoryRecorder for FailingHistoryRecorder {
    async fn append(&self, _record: HistoryRecord) -> Result<()> {
        Err(PaymentError::DownstreamUnavailable("history recorder"))
    }
}

/// Marketplace that quotes orders normally but refuses to settle them.
#[derive(Default, Clone)]
pub struct RefusingSettlementMarketplace {
    pub inner: InMemoryMarketplace,
}

#[async_trait]
impl MarketplaceGateway for RefusingSettlementMarketplace {
    async fn validate_order(&self, reference: &SettlementRef) -> Result<OrderQuote> {
        self.inner.validate_order(reference).await
    }

    async fn settle(&self, _reference: &SettlementRef) -> Result<()> {
        Err(PaymentError::DownstreamUnavailable("marketplace gateway"))
    }
}

/// Ledger that commits every mutation but stalls before acknowledging it,
/// simulating a response lost on the wire.
#[derive(Clone)]
pub struct DelayedAckLedger {
    pub inner: InMemoryLedger,
    pub delay: Duration,
}

#[async_trait]
impl Ledger for DelayedAckLedger {
    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>> {
        self.inner.get_wallet(wallet_id).await
    }

    async fn debit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        reference: Option<String>,
    ) -> Result<LedgerReceipt> {
        let receipt = self.inner.debit(wallet_id, amount, reference).await?;
        tokio::time::sleep(self.delay).await;
        Ok(receipt)
    }

    async fn credit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        reference: Option<String>,
    ) -> Result<LedgerReceipt> {
        let receipt = self.inner.credit(wallet_id, amount, reference).await?;
        tokio::time::sleep(self.delay).await;
        Ok(receipt)
    }

    async fn balance(&self, wallet_id: WalletId) -> Result<Balance> {
        self.inner.balance(wallet_id).await
    }

    async fn history(&self, wallet_id: WalletId) -> Result<Vec<MutationLogEntry>> {
        self.inner.history(wallet_id).await
    }
}

/// Screener that never answers in time.
#[derive(Clone)]
pub struct SlowScreener {
    pub delay: Duration,
}

#[async_trait]
impl FraudScreener for SlowScreener {
    async fn classify(&self, user_id: UserId, amount: Decimal) -> Result<payflow::domain::fraud::FraudVerdict> {
        tokio::time::sleep(self.delay).await;
        Ok(payflow::domain::fraud::FraudVerdict::new(user_id, amount))
    }
}
