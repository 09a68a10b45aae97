use crate::domain::fraud::FraudStatus;
use crate::domain::ports::{
    FraudScreenerBox, HistoryRecorderBox, LedgerBox, LedgerReceipt, MarketplaceGatewayBox,
    TransactionStoreBox,
};
use crate::domain::transaction::{
    HistoryRecord, SettlementRef, Transaction, TransactionId, TransactionRequest, TransactionType,
};
use crate::domain::wallet::{Amount, MutationDirection, MutationLogEntry, WalletId};
use crate::error::{PaymentError, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, warn};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Post-commit condition that could not be resolved inline and needs
/// out-of-band reconciliation. Never retried automatically: a blind retry
/// after the ledger commit could double-settle.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationTask {
    pub transaction_id: TransactionId,
    pub kind: ReconciliationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationKind {
    /// Ledger committed but the external order was never marked processed.
    UnsettledOrder(SettlementRef),
    /// The history snapshot for a successful transaction was not recorded.
    UnrecordedHistory,
    /// The terminal transaction status could not be persisted.
    UnrecordedOutcome,
    /// A transfer debited the source, the destination credit failed, and the
    /// compensating credit failed as well.
    UnreversedTransferDebit { source: WalletId },
}

/// Coordinates one wallet transaction across the ledger, the fraud screener,
/// the marketplace gateway and the history recorder.
///
/// The saga runs `RECEIVED → VALIDATED → SCREENED → LEDGER_COMMITTED →
/// SETTLED → HISTORY_LOGGED`; the ledger call is the commit point. Everything
/// before it fails without side effects, everything after it tolerates
/// failure by queueing a reconciliation task. Collaborators are injected as
/// boxed capability traits, so the orchestrator never holds a wallet lock
/// itself.
pub struct TransactionOrchestrator {
    ledger: LedgerBox,
    screener: FraudScreenerBox,
    marketplace: MarketplaceGatewayBox,
    history: HistoryRecorderBox,
    transactions: TransactionStoreBox,
    /// Settlement references currently being processed. Claimed before any
    /// side effect so two concurrent requests for one reference cannot both
    /// reach the ledger.
    in_flight: DashMap<SettlementRef, TransactionId>,
    reconciliation: Mutex<Vec<ReconciliationTask>>,
    call_timeout: Duration,
}

/// Releases an in-flight settlement reference claim when the saga finishes,
/// on every exit path.
struct RefClaim<'a> {
    claims: &'a DashMap<SettlementRef, TransactionId>,
    reference: SettlementRef,
}

impl Drop for RefClaim<'_> {
    fn drop(&mut self) {
        self.claims.remove(&self.reference);
    }
}

impl TransactionOrchestrator {
    pub fn new(
        ledger: LedgerBox,
        screener: FraudScreenerBox,
        marketplace: MarketplaceGatewayBox,
        history: HistoryRecorderBox,
        transactions: TransactionStoreBox,
    ) -> Self {
        Self {
            ledger,
            screener,
            marketplace,
            history,
            transactions,
            in_flight: DashMap::new(),
            reconciliation: Mutex::new(Vec::new()),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Overrides the per-collaborator call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Snapshot of the queued reconciliation tasks.
    pub fn reconciliation_tasks(&self) -> Vec<ReconciliationTask> {
        self.reconciliation
            .lock()
            .map(|tasks| tasks.clone())
            .unwrap_or_default()
    }

    /// Runs the full saga for one client request.
    ///
    /// Returns the terminal transaction on success, or the typed error naming
    /// the gate that rejected it. Validation, screening and marketplace
    /// failures leave no durable state behind.
    pub async fn create_transaction(&self, request: TransactionRequest) -> Result<Transaction> {
        let amount = Amount::new(request.amount)?;
        check_request_shape(&request)?;

        let wallet = self
            .call("wallet ledger", self.ledger.get_wallet(request.wallet_id))
            .await?
            .ok_or(PaymentError::WalletNotFound(request.wallet_id))?;
        if wallet.user_id != request.user_id {
            return Err(PaymentError::Validation(
                "wallet does not belong to the requesting user".to_string(),
            ));
        }
        if let Some(destination) = request.destination_wallet_id {
            self.call("wallet ledger", self.ledger.get_wallet(destination))
                .await?
                .ok_or(PaymentError::WalletNotFound(destination))?;
        }

        let tx = Transaction::pending(&request, amount);

        // Idempotency gate plus order validation, PAYMENT only. The in-flight
        // claim is dropped automatically on every path out of this function.
        let mut _claim = None;
        if let Some(reference) = tx.reference.clone() {
            if self
                .call("transaction store", self.transactions.find_settled(&reference))
                .await?
                .is_some()
            {
                return Err(PaymentError::DuplicateSettlement(reference));
            }
            match self.in_flight.entry(reference.clone()) {
                Entry::Occupied(_) => {
                    return Err(PaymentError::DuplicateSettlement(reference));
                }
                Entry::Vacant(slot) => {
                    slot.insert(tx.id);
                }
            }
            _claim = Some(RefClaim {
                claims: &self.in_flight,
                reference: reference.clone(),
            });

            let quote = self
                .call("marketplace gateway", self.marketplace.validate_order(&reference))
                .await?;
            if quote.expected_amount != request.amount {
                return Err(PaymentError::SettlementMismatch {
                    expected: quote.expected_amount,
                    requested: request.amount,
                });
            }
        }

        // VALIDATED: open the transaction record.
        self.call("transaction store", self.transactions.store(tx.clone()))
            .await?;

        // SCREENED.
        let verdict = self
            .call(
                "fraud screener",
                self.screener.classify(request.user_id, request.amount),
            )
            .await?;
        match verdict.status {
            FraudStatus::Fraud => {
                self.record_outcome(tx.fail()).await;
                return Err(PaymentError::FraudRejected(verdict.reason));
            }
            FraudStatus::Suspicious => {
                // Source behavior: suspicious transactions are flagged in the
                // audit log but never blocked.
                warn!(
                    transaction = %tx.id,
                    user = %request.user_id,
                    amount = %request.amount,
                    "suspicious transaction allowed through: {}",
                    verdict.reason
                );
            }
            FraudStatus::Safe => {}
        }

        // LEDGER_COMMITTED: the commit point.
        let mutations = match self.commit_ledger(&tx).await {
            Ok(mutations) => mutations,
            Err(err) => {
                self.record_outcome(tx.fail()).await;
                return Err(err);
            }
        };

        let tx = tx.succeed();
        self.record_outcome(tx.clone()).await;
        debug!(transaction = %tx.id, kind = ?tx.kind, "ledger committed");

        // SETTLED, PAYMENT only. The ledger has committed, so a settlement
        // failure no longer fails the transaction.
        if tx.kind == TransactionType::Payment
            && let Some(reference) = tx.reference.clone()
            && let Err(err) = self
                .call("marketplace gateway", self.marketplace.settle(&reference))
                .await
        {
            error!(
                transaction = %tx.id,
                reference = %reference,
                "order settlement failed after ledger commit: {err}"
            );
            self.queue_reconciliation(tx.id, ReconciliationKind::UnsettledOrder(reference));
        }

        // HISTORY_LOGGED: best effort.
        let record = HistoryRecord::new(tx.clone(), mutations);
        if let Err(err) = self.call("history recorder", self.history.append(record)).await {
            warn!(transaction = %tx.id, "history append failed: {err}");
            self.queue_reconciliation(tx.id, ReconciliationKind::UnrecordedHistory);
        }

        Ok(tx)
    }

    /// Applies the transaction's balance effect to the ledger and returns the
    /// mutation entries it produced.
    async fn commit_ledger(&self, tx: &Transaction) -> Result<Vec<MutationLogEntry>> {
        match tx.kind {
            TransactionType::Deposit => {
                let receipt = self
                    .apply_mutation(
                        MutationDirection::Credit,
                        tx.wallet_id,
                        tx.amount,
                        tx.mutation_reference(),
                    )
                    .await?;
                Ok(vec![receipt.mutation])
            }
            TransactionType::Withdrawal | TransactionType::Payment => {
                let receipt = self
                    .apply_mutation(
                        MutationDirection::Debit,
                        tx.wallet_id,
                        tx.amount,
                        tx.mutation_reference(),
                    )
                    .await?;
                Ok(vec![receipt.mutation])
            }
            TransactionType::Transfer => self.commit_transfer(tx).await,
        }
    }

    /// Debits the source wallet, then credits the destination. The two legs
    /// are separate ledger commits; when the credit fails the debit is
    /// compensated by crediting the source back. This reversal is a behavior
    /// change from the source system, which left the debit dangling.
    async fn commit_transfer(&self, tx: &Transaction) -> Result<Vec<MutationLogEntry>> {
        let destination = tx
            .destination_wallet_id
            .ok_or_else(|| PaymentError::Validation("transfer without destination".to_string()))?;

        let debit = self
            .apply_mutation(
                MutationDirection::Debit,
                tx.wallet_id,
                tx.amount,
                tx.mutation_reference(),
            )
            .await?;

        match self
            .apply_mutation(
                MutationDirection::Credit,
                destination,
                tx.amount,
                tx.mutation_reference(),
            )
            .await
        {
            Ok(credit) => Ok(vec![debit.mutation, credit.mutation]),
            Err(err) => {
                warn!(
                    transaction = %tx.id,
                    destination = %destination,
                    "transfer credit failed, reversing source debit: {err}"
                );
                if let Err(reversal_err) = self
                    .apply_mutation(
                        MutationDirection::Credit,
                        tx.wallet_id,
                        tx.amount,
                        tx.reversal_reference(),
                    )
                    .await
                {
                    error!(
                        transaction = %tx.id,
                        source = %tx.wallet_id,
                        "transfer reversal failed, source debit is dangling: {reversal_err}"
                    );
                    self.queue_reconciliation(
                        tx.id,
                        ReconciliationKind::UnreversedTransferDebit {
                            source: tx.wallet_id,
                        },
                    );
                }
                Err(err)
            }
        }
    }

    /// Runs one ledger mutation under the call timeout. A timed-out mutation
    /// may still have committed, so the outcome is confirmed against the
    /// wallet history before failure is reported.
    async fn apply_mutation(
        &self,
        direction: MutationDirection,
        wallet_id: WalletId,
        amount: Amount,
        reference: String,
    ) -> Result<LedgerReceipt> {
        let mutation = async {
            match direction {
                MutationDirection::Debit => {
                    self.ledger.debit(wallet_id, amount, Some(reference.clone())).await
                }
                MutationDirection::Credit => {
                    self.ledger.credit(wallet_id, amount, Some(reference.clone())).await
                }
            }
        };
        match tokio::time::timeout(self.call_timeout, mutation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(wallet = %wallet_id, "ledger response dropped, confirming outcome");
                self.confirm_mutation(wallet_id, &reference).await
            }
        }
    }

    /// Looks for the mutation in the wallet history after a dropped ledger
    /// response. The reference is unique per transaction leg, so a match
    /// means the commit happened.
    async fn confirm_mutation(&self, wallet_id: WalletId, reference: &str) -> Result<LedgerReceipt> {
        let history = self
            .call("wallet ledger", self.ledger.history(wallet_id))
            .await?;
        match history
            .into_iter()
            .find(|entry| entry.reference.as_deref() == Some(reference))
        {
            Some(mutation) => Ok(LedgerReceipt {
                balance_after: mutation.balance_after,
                mutation,
            }),
            None => Err(PaymentError::DownstreamUnavailable("wallet ledger")),
        }
    }

    /// Persists a terminal transaction status. Post-commit this must not fail
    /// the saga, so persistence errors become reconciliation tasks.
    async fn record_outcome(&self, tx: Transaction) {
        let id = tx.id;
        if let Err(err) = self
            .call("transaction store", self.transactions.store(tx))
            .await
        {
            error!(transaction = %id, "failed to persist transaction outcome: {err}");
            self.queue_reconciliation(id, ReconciliationKind::UnrecordedOutcome);
        }
    }

    fn queue_reconciliation(&self, transaction_id: TransactionId, kind: ReconciliationKind) {
        if let Ok(mut tasks) = self.reconciliation.lock() {
            tasks.push(ReconciliationTask {
                transaction_id,
                kind,
            });
        }
    }

    /// Bounds one collaborator call; an elapsed timeout becomes
    /// `DownstreamUnavailable` naming the collaborator.
    async fn call<T>(
        &self,
        service: &'static str,
        fut: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PaymentError::DownstreamUnavailable(service)),
        }
    }
}

/// Structural checks on the request before touching any collaborator: the
/// settlement reference is required iff PAYMENT, the destination wallet iff
/// TRANSFER.
fn check_request_shape(request: &TransactionRequest) -> Result<()> {
    match request.kind {
        TransactionType::Payment => {
            if request.reference.is_none() {
                return Err(PaymentError::Validation(
                    "payment requires a settlement reference".to_string(),
                ));
            }
        }
        _ => {
            if request.reference.is_some() {
                return Err(PaymentError::Validation(
                    "settlement reference is only valid for payments".to_string(),
                ));
            }
        }
    }
    match request.kind {
        TransactionType::Transfer => match request.destination_wallet_id {
            None => {
                return Err(PaymentError::Validation(
                    "transfer requires a destination wallet".to_string(),
                ));
            }
            Some(destination) if destination == request.wallet_id => {
                return Err(PaymentError::Validation(
                    "transfer destination must differ from the source wallet".to_string(),
                ));
            }
            Some(_) => {}
        },
        _ => {
            if request.destination_wallet_id.is_some() {
                return Err(PaymentError::Validation(
                    "destination wallet is only valid for transfers".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Ledger;
    use crate::domain::wallet::{Balance, Wallet};
    use crate::infrastructure::in_memory::{
        AmountTierScreener, InMemoryHistoryRecorder, InMemoryLedger, InMemoryMarketplace,
        InMemoryTransactionStore,
    };
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct Fixture {
        ledger: InMemoryLedger,
        marketplace: InMemoryMarketplace,
        orchestrator: TransactionOrchestrator,
    }

    fn fixture() -> Fixture {
        let ledger = InMemoryLedger::new();
        let marketplace = InMemoryMarketplace::new();
        let orchestrator = TransactionOrchestrator::new(
            Box::new(ledger.clone()),
            Box::new(AmountTierScreener::new()),
            Box::new(marketplace.clone()),
            Box::new(InMemoryHistoryRecorder::new()),
            Box::new(InMemoryTransactionStore::new()),
        );
        Fixture {
            ledger,
            marketplace,
            orchestrator,
        }
    }

    fn seed_wallet(ledger: &InMemoryLedger, balance: rust_decimal::Decimal) -> Wallet {
        let wallet = Wallet::new(Uuid::new_v4(), Uuid::new_v4(), Balance::new(balance));
        ledger.create_wallet(wallet.clone());
        wallet
    }

    fn deposit(wallet: &Wallet, amount: rust_decimal::Decimal) -> TransactionRequest {
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

    #[tokio::test]
    async fn test_deposit_credits_wallet() {
        let f = fixture();
        let wallet = seed_wallet(&f.ledger, dec!(100));

        let tx = f
            .orchestrator
            .create_transaction(deposit(&wallet, dec!(50)))
            .await
            .unwrap();

        assert_eq!(tx.status, crate::domain::transaction::TransactionStatus::Success);
        assert_eq!(
            f.ledger.balance(wallet.id).await.unwrap(),
            Balance::new(dec!(150))
        );
    }

    #[tokio::test]
    async fn test_rejects_foreign_wallet() {
        let f = fixture();
        let wallet = seed_wallet(&f.ledger, dec!(100));
        let mut request = deposit(&wallet, dec!(50));
        request.user_id = Uuid::new_v4();

        let result = f.orchestrator.create_transaction(request).await;
        assert!(matches!(result, Err(PaymentError::Validation(_))));
        assert_eq!(
            f.ledger.balance(wallet.id).await.unwrap(),
            Balance::new(dec!(100))
        );
    }

    #[tokio::test]
    async fn test_rejects_unknown_wallet() {
        let f = fixture();
        let wallet = Wallet::new(Uuid::new_v4(), Uuid::new_v4(), Balance::ZERO);

        let result = f.orchestrator.create_transaction(deposit(&wallet, dec!(1))).await;
        assert!(matches!(result, Err(PaymentError::WalletNotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amount() {
        let f = fixture();
        let wallet = seed_wallet(&f.ledger, dec!(100));

        let result = f
            .orchestrator
            .create_transaction(deposit(&wallet, dec!(0)))
            .await;
        assert!(matches!(result, Err(PaymentError::InvalidAmount)));
    }

    #[tokio::test]
    async fn test_payment_without_reference_rejected() {
        let f = fixture();
        let wallet = seed_wallet(&f.ledger, dec!(100));
        let mut request = deposit(&wallet, dec!(50));
        request.kind = TransactionType::Payment;

        let result = f.orchestrator.create_transaction(request).await;
        assert!(matches!(result, Err(PaymentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reference_on_deposit_rejected() {
        let f = fixture();
        let wallet = seed_wallet(&f.ledger, dec!(100));
        let mut request = deposit(&wallet, dec!(50));
        request.reference = Some(SettlementRef::new("ORD-1"));

        let result = f.orchestrator.create_transaction(request).await;
        assert!(matches!(result, Err(PaymentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_transfer_to_self_rejected() {
        let f = fixture();
        let wallet = seed_wallet(&f.ledger, dec!(100));
        let mut request = deposit(&wallet, dec!(50));
        request.kind = TransactionType::Transfer;
        request.destination_wallet_id = Some(wallet.id);

        let result = f.orchestrator.create_transaction(request).await;
        assert!(matches!(result, Err(PaymentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_settlement_mismatch_has_no_side_effects() {
        let f = fixture();
        let wallet = seed_wallet(&f.ledger, dec!(100_000));
        let reference = SettlementRef::new("ORD-42");
        f.marketplace.register_order(reference.clone(), dec!(49_999));

        let mut request = deposit(&wallet, dec!(50_000));
        request.kind = TransactionType::Payment;
        request.reference = Some(reference);

        let result = f.orchestrator.create_transaction(request).await;
        assert!(matches!(
            result,
            Err(PaymentError::SettlementMismatch { expected, requested })
                if expected == dec!(49_999) && requested == dec!(50_000)
        ));
        assert_eq!(
            f.ledger.balance(wallet.id).await.unwrap(),
            Balance::new(dec!(100_000))
        );
        assert!(f.ledger.history(wallet.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_reference_rejected() {
        let f = fixture();
        let wallet = seed_wallet(&f.ledger, dec!(100_000));

        let mut request = deposit(&wallet, dec!(50_000));
        request.kind = TransactionType::Payment;
        request.reference = Some(SettlementRef::new("ORD-MISSING"));

        let result = f.orchestrator.create_transaction(request).await;
        assert!(matches!(result, Err(PaymentError::ReferenceNotFound(_))));
    }
}
