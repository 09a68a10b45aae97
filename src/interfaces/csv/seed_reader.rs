use crate::domain::transaction::SettlementRef;
use crate::domain::wallet::{Balance, UserId, Wallet, WalletId, WalletStatus};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of the wallet seed file.
#[derive(Debug, Deserialize)]
struct WalletSeed {
    wallet: WalletId,
    user: UserId,
    balance: Decimal,
    status: WalletStatus,
}

impl From<WalletSeed> for Wallet {
    fn from(seed: WalletSeed) -> Self {
        Self {
            id: seed.wallet,
            user_id: seed.user,
            balance: Balance::new(seed.balance),
            status: seed.status,
        }
    }
}

/// One row of the marketplace order seed file.
#[derive(Debug, Deserialize)]
struct OrderSeed {
    reference: String,
    amount: Decimal,
}

/// Loads the initial wallet set from a CSV source. Opening balances must be
/// non-negative; the ledger never lets one go below zero afterwards.
pub fn read_wallet_seeds<R: Read>(source: R) -> Result<Vec<Wallet>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let mut wallets = Vec::new();
    for row in reader.deserialize::<WalletSeed>() {
        let seed = row.map_err(PaymentError::from)?;
        if seed.balance < Decimal::ZERO {
            return Err(PaymentError::Validation(format!(
                "negative opening balance for wallet {}",
                seed.wallet
            )));
        }
        wallets.push(seed.into());
    }
    Ok(wallets)
}

/// Loads the known marketplace orders from a CSV source.
pub fn read_order_seeds<R: Read>(source: R) -> Result<Vec<(SettlementRef, Decimal)>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let mut orders = Vec::new();
    for row in reader.deserialize::<OrderSeed>() {
        let seed = row.map_err(PaymentError::from)?;
        orders.push((SettlementRef::new(seed.reference), seed.amount));
    }
    Ok(orders)
}
