#[path = "integration/fixtures.rs"]
mod fixtures;

use fixtures::*;
use presale_sdk::wallet::provider::codes;
use presale_sdk::{ChainRegistry, ChainSwitcher, Error, ProviderError, SwitchOutcome};
use std::sync::Arc;

fn switcher(wallet: &Arc<MockWallet>) -> ChainSwitcher {
    ChainSwitcher::new(wallet.clone(), Arc::new(ChainRegistry::builtin()))
}

#[tokio::test]
async fn test_switch_to_known_chain() {
    let wallet = Arc::new(MockWallet::new(vec![BUYER], 56));

    let outcome = switcher(&wallet).switch_to(1).await.unwrap();

    assert_eq!(outcome, SwitchOutcome::Switched);
    assert_eq!(wallet.calls("wallet_addEthereumChain"), 0);
    assert_eq!(wallet.state.lock().unwrap().chain_id, 1);
}

#[tokio::test]
async fn test_unrecognized_chain_is_added_once() {
    let wallet = Arc::new(MockWallet::new(vec![BUYER], 1));

    let outcome = switcher(&wallet).switch_to(8453).await.unwrap();

    assert_eq!(outcome, SwitchOutcome::Added);
    assert_eq!(wallet.calls("wallet_switchEthereumChain"), 1);
    assert_eq!(wallet.calls("wallet_addEthereumChain"), 1);

    let state = wallet.state.lock().unwrap();
    let params = &state.added_chains[0];
    assert_eq!(params["chainId"], "0x2105");
    assert_eq!(params["chainName"], "Base");
    assert_eq!(params["nativeCurrency"]["symbol"], "ETH");
}

#[tokio::test]
async fn test_rejection_is_returned_unchanged() {
    let wallet = Arc::new(MockWallet::new(vec![BUYER], 1));
    wallet.state.lock().unwrap().switch_error = Some(ProviderError::user_rejected());

    let result = switcher(&wallet).switch_to(56).await;

    match result {
        Err(Error::Provider(e)) => assert_eq!(e.code, codes::USER_REJECTED),
        other => panic!("expected provider error, got {:?}", other),
    }
    assert_eq!(wallet.calls("wallet_addEthereumChain"), 0);
}

#[tokio::test]
async fn test_unregistered_chain_never_reaches_wallet() {
    let wallet = Arc::new(MockWallet::new(vec![BUYER], 1));

    let result = switcher(&wallet).switch_to(10).await;

    assert!(matches!(result, Err(Error::UnknownChain(10))));
    assert_eq!(wallet.calls("wallet_switchEthereumChain"), 0);
}
