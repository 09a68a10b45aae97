use crate::domain::ports::{Ledger, LedgerReceipt, TransactionStore};
use crate::domain::transaction::{SettlementRef, Transaction, TransactionId, TransactionStatus};
use crate::domain::wallet::{
    Amount, Balance, MutationDirection, MutationLogEntry, Wallet, WalletId,
};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for wallet states.
pub const CF_WALLETS: &str = "wallets";
/// Column Family for mutation log entries, keyed by wallet id + sequence.
pub const CF_MUTATIONS: &str = "mutations";
/// Column Family for transactions.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family indexing successful settlement references to transaction ids.
pub const CF_SETTLED_REFS: &str = "settled_refs";

/// Wallet state as stored on disk. The per-wallet mutation sequence lives
/// next to the balance so both advance in the same write batch.
#[derive(Serialize, Deserialize)]
struct WalletDoc {
    wallet: Wallet,
    next_seq: u64,
}

/// A persistent ledger and transaction store backed by RocksDB.
///
/// Balance updates and their mutation log entries are written in a single
/// `WriteBatch`, so the two can never diverge. A per-wallet async lock table
/// serializes the read-modify-write window exactly like the in-memory ledger.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    locks: Arc<DashMap<WalletId, Arc<Mutex<()>>>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_WALLETS, Options::default()),
            ColumnFamilyDescriptor::new(CF_MUTATIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_SETTLED_REFS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self {
            db: Arc::new(db),
            locks: Arc::new(DashMap::new()),
        })
    }

    /// Registers a wallet, overwriting any previous state under the same id.
    pub fn create_wallet(&self, wallet: Wallet) -> Result<()> {
        let cf = self.cf(CF_WALLETS)?;
        let doc = WalletDoc {
            wallet,
            next_seq: 0,
        };
        let key = doc.wallet.id.into_bytes();
        self.db.put_cf(&cf, key, encode(&doc)?)?;
        Ok(())
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::Storage(format!("column family {name} not found")))
    }

    fn load_wallet_doc(&self, wallet_id: WalletId) -> Result<Option<WalletDoc>> {
        let cf = self.cf(CF_WALLETS)?;
        match self.db.get_cf(&cf, wallet_id.into_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn wallet_lock(&self, wallet_id: WalletId) -> Arc<Mutex<()>> {
        self.locks.entry(wallet_id).or_default().clone()
    }

    async fn mutate(
        &self,
        wallet_id: WalletId,
        direction: MutationDirection,
        amount: Amount,
        reference: Option<String>,
    ) -> Result<LedgerReceipt> {
        let lock = self.wallet_lock(wallet_id);
        let _guard = lock.lock().await;

        let mut doc = self
            .load_wallet_doc(wallet_id)?
            .ok_or(PaymentError::WalletNotFound(wallet_id))?;

        let balance_before = doc.wallet.balance;
        match direction {
            MutationDirection::Debit => doc.wallet.debit(amount)?,
            MutationDirection::Credit => doc.wallet.credit(amount)?,
        }
        let entry = MutationLogEntry::new(
            wallet_id,
            direction,
            amount,
            balance_before,
            doc.wallet.balance,
            reference,
        );
        let seq = doc.next_seq;
        doc.next_seq += 1;

        // Wallet state and log entry land in one batch: invariant, not an
        // optimization.
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_WALLETS)?, wallet_id.into_bytes(), encode(&doc)?);
        batch.put_cf(
            self.cf(CF_MUTATIONS)?,
            mutation_key(wallet_id, seq),
            encode(&entry)?,
        );
        self.db.write(batch)?;

        Ok(LedgerReceipt {
            balance_after: doc.wallet.balance,
            mutation: entry,
        })
    }
}

fn mutation_key(wallet_id: WalletId, seq: u64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(wallet_id.as_bytes());
    key[16..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| PaymentError::Storage(format!("serialization: {e}")))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| PaymentError::Storage(format!("deserialization: {e}")))
}

#[async_trait]
impl Ledger for RocksDbStore {
    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.load_wallet_doc(wallet_id)?.map(|doc| doc.wallet))
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
        self.load_wallet_doc(wallet_id)?
            .map(|doc| doc.wallet.balance)
            .ok_or(PaymentError::WalletNotFound(wallet_id))
    }

    async fn history(&self, wallet_id: WalletId) -> Result<Vec<MutationLogEntry>> {
        let cf = self.cf(CF_MUTATIONS)?;
        let prefix = wallet_id.into_bytes();
        let mut entries = Vec::new();

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, rocksdb::Direction::Forward));
        for item in iter {
            let (key, value) =
                item.map_err(|e| PaymentError::Storage(format!("iteration: {e}")))?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(decode(&value)?);
        }

        Ok(entries)
    }
}

#[async_trait]
impl TransactionStore for RocksDbStore {
    async fn store(&self, tx: Transaction) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_TRANSACTIONS)?, tx.id.into_bytes(), encode(&tx)?);
        // Successful payments claim their settlement reference in the index
        // used by the idempotency lookup.
        if tx.status == TransactionStatus::Success
            && let Some(reference) = &tx.reference
        {
            batch.put_cf(
                self.cf(CF_SETTLED_REFS)?,
                reference.as_str().as_bytes(),
                tx.id.into_bytes(),
            );
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        match self.db.get_cf(&cf, id.into_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn find_settled(&self, reference: &SettlementRef) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_SETTLED_REFS)?;
        let Some(id_bytes) = self.db.get_cf(&cf, reference.as_str().as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id_bytes)
            .map_err(|e| PaymentError::Storage(format!("settled ref index: {e}")))?;
        self.get(id).await
    }
}
