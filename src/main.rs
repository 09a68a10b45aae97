use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payflow::application::orchestrator::TransactionOrchestrator;
use payflow::domain::ports::LedgerBox;
use payflow::domain::transaction::SettlementRef;
use payflow::domain::wallet::{Wallet, WalletId};
use payflow::infrastructure::in_memory::{
    AmountTierScreener, InMemoryHistoryRecorder, InMemoryLedger, InMemoryMarketplace,
    InMemoryTransactionStore,
};
use payflow::interfaces::csv::report_writer::WalletReportWriter;
use payflow::interfaces::csv::request_reader::RequestReader;
use payflow::interfaces::csv::seed_reader::{read_order_seeds, read_wallet_seeds};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input transaction requests CSV file
    requests: PathBuf,

    /// Initial wallets CSV file (wallet,user,balance,status)
    #[arg(long)]
    wallets: PathBuf,

    /// Known marketplace orders CSV file (reference,amount)
    #[arg(long)]
    orders: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let wallets =
        read_wallet_seeds(File::open(&cli.wallets).into_diagnostic()?).into_diagnostic()?;
    let orders = match &cli.orders {
        Some(path) => {
            read_order_seeds(File::open(path).into_diagnostic()?).into_diagnostic()?
        }
        None => Vec::new(),
    };

    if let Some(db_path) = cli.db_path.clone() {
        run_persistent(&cli, &db_path, wallets, orders).await
    } else {
        run_in_memory(&cli, wallets, orders).await
    }
}

fn setup_logging(level: &str) {
    // Stdout carries the wallet report, so logs go to stderr.
    let level = level.parse().unwrap_or(tracing::Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn build_marketplace(orders: Vec<(SettlementRef, Decimal)>) -> InMemoryMarketplace {
    let marketplace = InMemoryMarketplace::new();
    for (reference, amount) in orders {
        marketplace.register_order(reference, amount);
    }
    marketplace
}

async fn run_in_memory(
    cli: &Cli,
    wallets: Vec<Wallet>,
    orders: Vec<(SettlementRef, Decimal)>,
) -> Result<()> {
    let ledger = InMemoryLedger::new();
    let wallet_ids: Vec<WalletId> = wallets.iter().map(|wallet| wallet.id).collect();
    for wallet in wallets {
        ledger.create_wallet(wallet);
    }

    let orchestrator = TransactionOrchestrator::new(
        Box::new(ledger.clone()),
        Box::new(AmountTierScreener::new()),
        Box::new(build_marketplace(orders)),
        Box::new(InMemoryHistoryRecorder::new()),
        Box::new(InMemoryTransactionStore::new()),
    );

    process(&orchestrator, Box::new(ledger), &cli.requests, &wallet_ids).await
}

#[cfg(feature = "storage-rocksdb")]
async fn run_persistent(
    cli: &Cli,
    db_path: &Path,
    wallets: Vec<Wallet>,
    orders: Vec<(SettlementRef, Decimal)>,
) -> Result<()> {
    use payflow::infrastructure::rocksdb::RocksDbStore;

    let store = RocksDbStore::open(db_path).into_diagnostic()?;
    let wallet_ids: Vec<WalletId> = wallets.iter().map(|wallet| wallet.id).collect();
    for wallet in wallets {
        store.create_wallet(wallet).into_diagnostic()?;
    }

    let orchestrator = TransactionOrchestrator::new(
        Box::new(store.clone()),
        Box::new(AmountTierScreener::new()),
        Box::new(build_marketplace(orders)),
        Box::new(InMemoryHistoryRecorder::new()),
        Box::new(store.clone()),
    );

    process(&orchestrator, Box::new(store), &cli.requests, &wallet_ids).await
}

#[cfg(not(feature = "storage-rocksdb"))]
async fn run_persistent(
    _cli: &Cli,
    _db_path: &Path,
    _wallets: Vec<Wallet>,
    _orders: Vec<(SettlementRef, Decimal)>,
) -> Result<()> {
    miette::bail!("this binary was built without the storage-rocksdb feature; --db-path is unavailable")
}

/// Replays every request through the orchestrator, then reports the final
/// wallet balances on stdout.
async fn process(
    orchestrator: &TransactionOrchestrator,
    ledger: LedgerBox,
    requests_path: &Path,
    wallet_ids: &[WalletId],
) -> Result<()> {
    let file = File::open(requests_path).into_diagnostic()?;
    let reader = RequestReader::new(file);

    for request in reader.requests() {
        match request {
            Ok(request) => match orchestrator.create_transaction(request).await {
                Ok(tx) => {
                    info!(transaction = %tx.id, kind = ?tx.kind, "transaction succeeded");
                }
                Err(err) => {
                    error!("transaction rejected: {err}");
                }
            },
            Err(err) => {
                error!("skipping malformed request: {err}");
            }
        }
    }

    for task in orchestrator.reconciliation_tasks() {
        error!(
            transaction = %task.transaction_id,
            "reconciliation required: {:?}",
            task.kind
        );
    }

    let mut wallets = Vec::with_capacity(wallet_ids.len());
    for wallet_id in wallet_ids {
        if let Some(wallet) = ledger.get_wallet(*wallet_id).await.into_diagnostic()? {
            wallets.push(wallet);
        }
    }

    let stdout = io::stdout();
    let mut writer = WalletReportWriter::new(stdout.lock());
    writer.write_wallets(wallets).into_diagnostic()?;

    Ok(())
}
