use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub, SubAssign};
use uuid::Uuid;

pub type WalletId = Uuid;
pub type UserId = Uuid;
pub type MutationId = Uuid;

/// Represents the monetary balance held by a wallet.
///
/// This is a wrapper around `rust_decimal::Decimal` to enforce domain-specific
/// rules and provide type safety for financial calculations. The ledger keeps
/// it non-negative; nothing else mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// Represents a positive monetary amount for transactions.
///
/// Ensures that transaction and mutation amounts are always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::InvalidAmount)
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::fmt::Display for Balance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletStatus {
    Active,
    Frozen,
}

/// Direction of a single balance mutation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationDirection {
    Debit,
    Credit,
}

/// Authoritative balance record for one user-owned wallet.
///
/// Only the ledger mutates a wallet, and only while holding that wallet's
/// exclusive lock.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Balance,
    pub status: WalletStatus,
}

impl Wallet {
    pub fn new(id: WalletId, user_id: UserId, balance: Balance) -> Self {
        Self {
            id,
            user_id,
            balance,
            status: WalletStatus::Active,
        }
    }

    /// Removes funds if the wallet is active and sufficiently funded.
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        self.ensure_active()?;
        let amount = Balance::from(amount);
        if self.balance < amount {
            return Err(PaymentError::InsufficientFunds(self.id));
        }
        self.balance -= amount;
        Ok(())
    }

    /// Adds funds if the wallet is active.
    pub fn credit(&mut self, amount: Amount) -> Result<()> {
        self.ensure_active()?;
        self.balance += Balance::from(amount);
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        match self.status {
            WalletStatus::Active => Ok(()),
            WalletStatus::Frozen => Err(PaymentError::WalletFrozen(self.id)),
        }
    }
}

/// Immutable record of one balance change, carrying before/after balances for
/// auditability. Entries are append-only and ordered per wallet; folding them
/// over the opening balance reproduces the current balance exactly.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct MutationLogEntry {
    pub id: MutationId,
    pub wallet_id: WalletId,
    pub direction: MutationDirection,
    pub amount: Amount,
    pub balance_before: Balance,
    pub balance_after: Balance,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MutationLogEntry {
    pub fn new(
        wallet_id: WalletId,
        direction: MutationDirection,
        amount: Amount,
        balance_before: Balance,
        balance_after: Balance,
        reference: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            direction,
            amount,
            balance_before,
            balance_after,
            reference,
            created_at: Utc::now(),
        }
    }

    /// Signed effect of this entry on the wallet balance.
    pub fn delta(&self) -> Decimal {
        match self.direction {
            MutationDirection::Credit => self.amount.value(),
            MutationDirection::Debit => -self.amount.value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(5.0));
        assert_eq!(b1 + b2, Balance::new(dec!(15.0)));
        assert_eq!(b1 - b2, Balance::new(dec!(5.0)));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(PaymentError::InvalidAmount)
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(PaymentError::InvalidAmount)
        ));
    }

    #[test]
    fn test_wallet_credit() {
        let mut wallet = Wallet::new(Uuid::new_v4(), Uuid::new_v4(), Balance::ZERO);
        wallet.credit(Amount::new(dec!(10.0)).unwrap()).unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(10.0)));
    }

    #[test]
    fn test_wallet_debit_success() {
        let mut wallet = Wallet::new(Uuid::new_v4(), Uuid::new_v4(), Balance::new(dec!(10.0)));
        wallet.debit(Amount::new(dec!(4.0)).unwrap()).unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(6.0)));
    }

    #[test]
    fn test_wallet_debit_insufficient() {
        let id = Uuid::new_v4();
        let mut wallet = Wallet::new(id, Uuid::new_v4(), Balance::new(dec!(10.0)));
        let result = wallet.debit(Amount::new(dec!(20.0)).unwrap());
        assert!(matches!(result, Err(PaymentError::InsufficientFunds(w)) if w == id));
        assert_eq!(wallet.balance, Balance::new(dec!(10.0)));
    }

    #[test]
    fn test_frozen_wallet_rejects_mutations() {
        let id = Uuid::new_v4();
        let mut wallet = Wallet::new(id, Uuid::new_v4(), Balance::new(dec!(10.0)));
        wallet.status = WalletStatus::Frozen;

        assert!(matches!(
            wallet.credit(Amount::new(dec!(1.0)).unwrap()),
            Err(PaymentError::WalletFrozen(w)) if w == id
        ));
        assert!(matches!(
            wallet.debit(Amount::new(dec!(1.0)).unwrap()),
            Err(PaymentError::WalletFrozen(w)) if w == id
        ));
        assert_eq!(wallet.balance, Balance::new(dec!(10.0)));
    }

    #[test]
    fn test_mutation_entry_delta() {
        let wallet_id = Uuid::new_v4();
        let amount = Amount::new(dec!(25.0)).unwrap();
        let debit = MutationLogEntry::new(
            wallet_id,
            MutationDirection::Debit,
            amount,
            Balance::new(dec!(100.0)),
            Balance::new(dec!(75.0)),
            None,
        );
        let credit = MutationLogEntry::new(
            wallet_id,
            MutationDirection::Credit,
            amount,
            Balance::new(dec!(75.0)),
            Balance::new(dec!(100.0)),
            None,
        );

        assert_eq!(debit.delta(), dec!(-25.0));
        assert_eq!(credit.delta(), dec!(25.0));
        assert_eq!(
            debit.balance_before.0 + debit.delta(),
            debit.balance_after.0
        );
    }
}
