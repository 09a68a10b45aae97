use crate::domain::wallet::{Amount, MutationLogEntry, UserId, WalletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type TransactionId = Uuid;

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Payment,
    Transfer,
}

/// Lifecycle status of a transaction. `Success` and `Failed` are terminal:
/// once reached, the status never changes again.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

/// Externally issued identifier binding a PAYMENT to a marketplace order.
///
/// Doubles as the idempotency key: one reference may produce at most one
/// successful transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementRef(String);

impl SettlementRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SettlementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A client-initiated request as handed to the orchestrator. `user_id` is the
/// authenticated caller, supplied by the identity layer upstream of this crate.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub kind: TransactionType,
    pub amount: rust_decimal::Decimal,
    pub reference: Option<SettlementRef>,
    pub destination_wallet_id: Option<WalletId>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub destination_wallet_id: Option<WalletId>,
    pub kind: TransactionType,
    pub reference: Option<SettlementRef>,
    pub amount: Amount,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Opens a new transaction in the `Pending` state for a validated request.
    pub fn pending(request: &TransactionRequest, amount: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            wallet_id: request.wallet_id,
            destination_wallet_id: request.destination_wallet_id,
            kind: request.kind,
            reference: request.reference.clone(),
            amount,
            status: TransactionStatus::Pending,
            description: request.description.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn succeed(self) -> Self {
        self.finish(TransactionStatus::Success)
    }

    pub fn fail(self) -> Self {
        self.finish(TransactionStatus::Failed)
    }

    // Terminal states are immutable; a finished transaction passes through
    // unchanged.
    fn finish(mut self, status: TransactionStatus) -> Self {
        if self.status == TransactionStatus::Pending {
            self.status = status;
        }
        self
    }

    /// Reference string stamped onto the ledger mutations of this transaction,
    /// used to confirm a commit after a dropped ledger response.
    pub fn mutation_reference(&self) -> String {
        self.id.to_string()
    }

    /// Reference stamped onto the compensating credit of a failed transfer.
    pub fn reversal_reference(&self) -> String {
        format!("{}:reversal", self.id)
    }
}

/// Denormalized snapshot of a completed transaction and the ledger mutations
/// it produced. Written once after the transaction reaches `Success`, never
/// updated.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct HistoryRecord {
    pub transaction: Transaction,
    pub mutations: Vec<MutationLogEntry>,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(transaction: Transaction, mutations: Vec<MutationLogEntry>) -> Self {
        Self {
            transaction,
            mutations,
            recorded_at: Utc::now(),
        }
    }
}
