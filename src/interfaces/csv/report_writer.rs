use crate::domain::wallet::Wallet;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct WalletRow<'a> {
    wallet: &'a str,
    user: &'a str,
    balance: rust_decimal::Decimal,
    status: &'a crate::domain::wallet::WalletStatus,
}

/// Writes the final wallet balances as CSV.
pub struct WalletReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletReportWriter<W> {
    pub fn new(destination: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(destination),
        }
    }

    /// Serializes the wallets in a stable order (by id) and flushes.
    pub fn write_wallets(&mut self, mut wallets: Vec<Wallet>) -> Result<()> {
        wallets.sort_by_key(|wallet| wallet.id);
        for wallet in &wallets {
            let wallet_id = wallet.id.to_string();
            let user_id = wallet.user_id.to_string();
            self.writer.serialize(WalletRow {
                wallet: &wallet_id,
                user: &user_id,
                balance: wallet.balance.0,
                status: &wallet.status,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
