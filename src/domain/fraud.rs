use crate::domain::wallet::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Any amount strictly above this is rejected outright.
pub const FRAUD_LIMIT: Decimal = dec!(50_000_000);
/// Any amount strictly above this (up to the fraud limit) is flagged but
/// still allowed through.
pub const SUSPICIOUS_LIMIT: Decimal = dec!(10_000_000);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum FraudStatus {
    Safe,
    Suspicious,
    Fraud,
}

/// Immutable audit record of one screening call.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct FraudVerdict {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: Decimal,
    pub status: FraudStatus,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl FraudVerdict {
    pub fn new(user_id: UserId, amount: Decimal) -> Self {
        let (status, reason) = classify_amount(amount);
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            status,
            reason: reason.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Pure amount-tier classifier. Both boundaries are exclusive: exactly
/// 10,000,000 is safe and exactly 50,000,000 is suspicious.
pub fn classify_amount(amount: Decimal) -> (FraudStatus, &'static str) {
    if amount > FRAUD_LIMIT {
        (FraudStatus::Fraud, "amount exceeds maximum limit")
    } else if amount > SUSPICIOUS_LIMIT {
        (FraudStatus::Suspicious, "large transaction amount")
    } else {
        (FraudStatus::Safe, "transaction looks safe")
    }
}
