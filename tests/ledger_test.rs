//! Purchase history and sale progress read from chain logs

#[path = "integration/fixtures.rs"]
mod fixtures;

use fixtures::*;
use presale_sdk::config::chains::{BSC, ETHEREUM};
use presale_sdk::config::{LedgerSettings, ProgressSettings};
use presale_sdk::evm::codec;
use presale_sdk::{
    Address, BigDecimal, ChainRegistry, Error, PurchaseLedger, SaleProgressMonitor, U256,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

fn registry() -> Arc<ChainRegistry> {
    Arc::new(ChainRegistry::builtin())
}

fn presale(chain_id: u64) -> Address {
    ChainRegistry::builtin()
        .get(chain_id)
        .unwrap()
        .presale_contract_address
}

fn ledger_with(chain: Arc<MockChain>, settings: LedgerSettings) -> PurchaseLedger {
    PurchaseLedger::new(registry(), settings).with_reader(chain)
}

#[tokio::test]
async fn test_total_sums_every_purchase() {
    let chain = Arc::new(MockChain::new(ETHEREUM));
    let contract = presale(ETHEREUM);
    chain.push_log(purchase_log(contract, BUYER, tokens(1_000), 10, 1, 0));
    chain.push_log(purchase_log(contract, BUYER, tokens(2_000), 20, 2, 0));
    chain.push_log(purchase_log(contract, OTHER_BUYER, tokens(7_000), 25, 3, 0));
    chain.push_log(purchase_log(contract, BUYER, tokens(500), 30, 4, 1));
    let ledger = ledger_with(chain.clone(), LedgerSettings::default());

    let summary = assert_ok!(ledger.fetch_summary(BUYER, ETHEREUM).await);

    assert_eq!(summary.purchase_count, 3);
    assert_eq!(summary.total_token_amount, tokens(3_500));
    assert_eq!(summary.total_tokens(), BigDecimal::from(3_500));
    assert!(summary.events.iter().all(|e| e.buyer == BUYER));

    let filter = chain.last_filter().unwrap();
    assert!(filter.address.matches(&contract));
    assert!(filter.topics[0].matches(&codec::purchase_topic()));
    assert!(filter.topics[1].matches(&codec::address_topic(BUYER)));
    assert!(!filter.topics[1].matches(&codec::address_topic(OTHER_BUYER)));
}

#[tokio::test]
async fn test_total_independent_of_log_order() {
    let contract = presale(ETHEREUM);
    let logs = vec![
        purchase_log(contract, BUYER, tokens(1_000), 10, 1, 0),
        purchase_log(contract, BUYER, tokens(2_000), 20, 2, 0),
        purchase_log(contract, BUYER, tokens(500), 30, 3, 0),
    ];

    let forward = Arc::new(MockChain::new(ETHEREUM));
    let reversed = Arc::new(MockChain::new(ETHEREUM));
    for log in &logs {
        forward.push_log(log.clone());
    }
    for log in logs.iter().rev() {
        reversed.push_log(log.clone());
    }

    let a = ledger_with(forward, LedgerSettings::default())
        .fetch_purchase_total(BUYER, ETHEREUM)
        .await
        .unwrap();
    let b = ledger_with(reversed, LedgerSettings::default())
        .fetch_purchase_total(BUYER, ETHEREUM)
        .await
        .unwrap();

    assert_eq!(a, BigDecimal::from(3_500));
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_buyer_without_purchases() {
    let chain = Arc::new(MockChain::new(ETHEREUM));
    let ledger = ledger_with(chain, LedgerSettings::default());

    let summary = ledger.fetch_summary(BUYER, ETHEREUM).await.unwrap();

    assert_eq!(summary.purchase_count, 0);
    assert_eq!(summary.total_token_amount, U256::ZERO);
}

#[tokio::test]
async fn test_query_failure_is_reported() {
    let chain = Arc::new(MockChain::new(ETHEREUM));
    *chain.fail_logs.lock().unwrap() = true;
    let ledger = ledger_with(chain, LedgerSettings::default());

    let err = assert_err!(ledger.fetch_summary(BUYER, ETHEREUM).await);
    assert!(matches!(err, Error::LogQuery(_)));
}

#[tokio::test]
async fn test_chain_without_reader() {
    let ledger = ledger_with(Arc::new(MockChain::new(ETHEREUM)), LedgerSettings::default());

    assert!(matches!(
        ledger.fetch_summary(BUYER, BSC).await,
        Err(Error::LogQuery(_))
    ));
    assert!(matches!(
        ledger.fetch_summary(BUYER, 999).await,
        Err(Error::UnknownChain(999))
    ));
}

#[tokio::test]
async fn test_all_chains_skips_failures() {
    let ethereum = Arc::new(MockChain::new(ETHEREUM));
    ethereum.push_log(purchase_log(presale(ETHEREUM), BUYER, tokens(1_000), 10, 1, 0));
    let bsc = Arc::new(MockChain::new(BSC));
    *bsc.fail_logs.lock().unwrap() = true;

    let ledger = PurchaseLedger::new(registry(), LedgerSettings::default())
        .with_reader(ethereum)
        .with_reader(bsc);

    let summaries = ledger.fetch_all_chains(BUYER).await;

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].chain_id, ETHEREUM);
    assert_eq!(summaries[0].total_tokens(), BigDecimal::from(1_000));
}

#[tokio::test]
async fn test_checkpointed_scan_is_incremental() {
    let chain = Arc::new(MockChain::new(ETHEREUM));
    let contract = presale(ETHEREUM);
    chain.push_log(purchase_log(contract, BUYER, tokens(1_000), 10, 1, 0));
    chain.push_log(purchase_log(contract, BUYER, tokens(2_000), 20, 2, 0));
    chain.set_head(100);
    let settings = LedgerSettings {
        checkpointing: true,
        from_block: 0,
    };
    let ledger = ledger_with(chain.clone(), settings);

    let total = ledger.fetch_purchase_total(BUYER, ETHEREUM).await.unwrap();
    assert_eq!(total, BigDecimal::from(3_000));

    chain.push_log(purchase_log(contract, BUYER, tokens(500), 150, 3, 0));
    chain.set_head(200);
    let total = ledger.fetch_purchase_total(BUYER, ETHEREUM).await.unwrap();
    assert_eq!(total, BigDecimal::from(3_500));
    assert_eq!(chain.last_filter().unwrap().get_from_block(), Some(101));

    // nothing new mined: no query at all
    let queries = chain.log_queries();
    let total = ledger.fetch_purchase_total(BUYER, ETHEREUM).await.unwrap();
    assert_eq!(total, BigDecimal::from(3_500));
    assert_eq!(chain.log_queries(), queries);
}

#[tokio::test]
async fn test_checkpoint_ignores_replayed_logs() {
    let chain = Arc::new(MockChain::new(ETHEREUM));
    let contract = presale(ETHEREUM);
    chain.push_log(purchase_log(contract, BUYER, tokens(1_000), 10, 1, 0));
    chain.set_head(100);
    let settings = LedgerSettings {
        checkpointing: true,
        from_block: 0,
    };
    let ledger = ledger_with(chain.clone(), settings);
    ledger.fetch_summary(BUYER, ETHEREUM).await.unwrap();

    // same transaction and log index re-reported in a later block
    chain.push_log(purchase_log(contract, BUYER, tokens(1_000), 120, 1, 0));
    chain.set_head(200);
    let summary = ledger.fetch_summary(BUYER, ETHEREUM).await.unwrap();
    assert_eq!(summary.purchase_count, 1);

    ledger.reset_checkpoints().await;
    let summary = ledger.fetch_summary(BUYER, ETHEREUM).await.unwrap();
    assert_eq!(summary.purchase_count, 1);
    assert_eq!(summary.total_tokens(), BigDecimal::from(1_000));
}

#[tokio::test(start_paused = true)]
async fn test_checkpointed_chains_scan_concurrently() {
    let gate = Arc::new(Barrier::new(2));
    let ethereum = Arc::new(MockChain::new(ETHEREUM));
    ethereum.push_log(purchase_log(presale(ETHEREUM), BUYER, tokens(1_000), 10, 1, 0));
    let bsc = Arc::new(MockChain::new(BSC));
    bsc.push_log(purchase_log(presale(BSC), BUYER, tokens(2_000), 10, 2, 0));
    for chain in [&ethereum, &bsc] {
        *chain.logs_barrier.lock().unwrap() = Some(gate.clone());
    }

    let settings = LedgerSettings {
        checkpointing: true,
        from_block: 0,
    };
    let ledger = PurchaseLedger::new(registry(), settings)
        .with_reader(ethereum)
        .with_reader(bsc);

    // each chain's log query only returns once the other is also in flight
    let summaries = assert_ok!(timeout(Duration::from_secs(5), ledger.fetch_all_chains(BUYER)).await);

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].total_tokens(), BigDecimal::from(1_000));
    assert_eq!(summaries[1].total_tokens(), BigDecimal::from(2_000));
}

fn monitor(chain: Arc<MockChain>, floor: u64) -> SaleProgressMonitor {
    SaleProgressMonitor::new(
        chain,
        registry(),
        ProgressSettings {
            target_tokens: 1_000_000_000,
            marketing_floor_tokens: floor,
        },
    )
}

#[tokio::test]
async fn test_progress_applies_floor() {
    let chain = Arc::new(MockChain::new(ETHEREUM));
    chain.set_total_sold(tokens(1_000));

    let progress = monitor(chain, 150_000_000).fetch_progress().await.unwrap();

    assert_eq!(progress.sold, BigDecimal::from(150_000_000));
    assert_eq!(progress.actual_sold, BigDecimal::from(1_000));
    assert_eq!(progress.percent_of_target, BigDecimal::from(15));
    assert!(progress.floor_applied());
}

#[tokio::test]
async fn test_progress_reports_actual_above_floor() {
    let chain = Arc::new(MockChain::new(ETHEREUM));
    chain.set_total_sold(tokens(250_000_000));

    let progress = monitor(chain.clone(), 150_000_000).fetch_progress().await.unwrap();
    assert_eq!(progress.sold, BigDecimal::from(250_000_000));
    assert_eq!(progress.percent_of_target, BigDecimal::from(25));

    let unfloored = monitor(chain, 0).fetch_progress().await.unwrap();
    assert_eq!(unfloored.sold, unfloored.actual_sold);
}

#[tokio::test]
async fn test_progress_keeps_fractional_tokens() {
    let chain = Arc::new(MockChain::new(ETHEREUM));
    chain.set_total_sold(tokens(1) + tokens(1) / U256::from(2u64));

    let progress = monitor(chain, 0).fetch_progress().await.unwrap();
    assert_eq!(progress.actual_sold, BigDecimal::from_str("1.5").unwrap());
}

#[tokio::test]
async fn test_progress_on_unregistered_chain() {
    let chain = Arc::new(MockChain::new(999));

    let result = monitor(chain, 0).fetch_actual_sold().await;
    assert!(matches!(result, Err(Error::UnknownChain(999))));
}
