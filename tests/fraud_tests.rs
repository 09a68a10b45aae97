mod common;

use common::{TestEnv, deposit};
use payflow::domain::fraud::FraudStatus;
use payflow::domain::ports::Ledger;
use payflow::domain::transaction::TransactionStatus;
use payflow::domain::wallet::Balance;
use payflow::error::PaymentError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_amount_at_suspicious_limit_is_safe() {
    let env = TestEnv::new();
    let wallet = env.seed_wallet(dec!(0));

    let tx = env
        .orchestrator
        .create_transaction(deposit(&wallet, dec!(10_000_000)))
        .await
        .unwrap();

    assert_eq!(tx.status, TransactionStatus::Success);
    let audit = env.screener.audit_log().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].status, FraudStatus::Safe);
}

#[tokio::test]
async fn test_suspicious_amount_is_flagged_but_allowed() {
    let env = TestEnv::new();
    let wallet = env.seed_wallet(dec!(0));

    let tx = env
        .orchestrator
        .create_transaction(deposit(&wallet, dec!(10_000_001)))
        .await
        .unwrap();

    assert_eq!(tx.status, TransactionStatus::Success);
    assert_eq!(
        env.ledger.balance(wallet.id).await.unwrap(),
        Balance::new(dec!(10_000_001))
    );

    let audit = env.screener.audit_log().await;
    assert_eq!(audit[0].status, FraudStatus::Suspicious);
    assert_eq!(audit[0].reason, "large transaction amount");
}

#[tokio::test]
async fn test_amount_at_fraud_limit_is_still_suspicious() {
    let env = TestEnv::new();
    let wallet = env.seed_wallet(dec!(0));

    let tx = env
        .orchestrator
        .create_transaction(deposit(&wallet, dec!(50_000_000)))
        .await
        .unwrap();

    assert_eq!(tx.status, TransactionStatus::Success);
    assert_eq!(env.screener.audit_log().await[0].status, FraudStatus::Suspicious);
}

#[tokio::test]
async fn test_fraudulent_amount_is_rejected_before_the_ledger() {
    let env = TestEnv::new();
    let wallet = env.seed_wallet(dec!(100));

    let result = env
        .orchestrator
        .create_transaction(deposit(&wallet, dec!(50_000_001)))
        .await;

    assert!(matches!(
        result,
        Err(PaymentError::FraudRejected(reason)) if reason == "amount exceeds maximum limit"
    ));
    assert_eq!(
        env.ledger.balance(wallet.id).await.unwrap(),
        Balance::new(dec!(100))
    );
    assert!(env.ledger.history(wallet.id).await.unwrap().is_empty());
    assert_eq!(env.screener.audit_log().await[0].status, FraudStatus::Fraud);
}
