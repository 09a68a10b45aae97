use crate::domain::transaction::{SettlementRef, TransactionRequest, TransactionType};
use crate::domain::wallet::{UserId, WalletId};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of the transaction request file. Empty optional columns
/// deserialize to `None`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct RequestRecord {
    pub user: UserId,
    pub wallet: WalletId,
    pub r#type: TransactionType,
    pub amount: Decimal,
    pub reference: Option<String>,
    pub destination: Option<WalletId>,
    pub description: Option<String>,
}

impl From<RequestRecord> for TransactionRequest {
    fn from(record: RequestRecord) -> Self {
        Self {
            user_id: record.user,
            wallet_id: record.wallet,
            kind: record.r#type,
            amount: record.amount,
            reference: record.reference.map(SettlementRef::new),
            destination_wallet_id: record.destination,
            description: record.description,
        }
    }
}

/// Reads transaction requests from a CSV source.
///
/// Wraps `csv::Reader` and yields `Result<TransactionRequest>` lazily, so
/// large files stream without loading into memory. Whitespace is trimmed and
/// short rows are tolerated.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    /// Creates a new `RequestReader` from any `Read` source (e.g. File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn requests(self) -> impl Iterator<Item = Result<TransactionRequest>> {
        self.reader.into_deserialize::<RequestRecord>().map(|row| {
            row.map(TransactionRequest::from)
                .map_err(PaymentError::from)
        })
    }
}
