//! Error types for the presale SDK
//!
//! Every variant renders as a human-readable status message suitable for
//! showing to the buyer directly.

use crate::wallet::provider::ProviderError;
use alloy_primitives::{B256, U256};

/// Presale SDK error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No provider, the user rejected access, or a connection request is already pending
    #[error("Wallet connection failed: {0}")]
    Connection(String),

    #[error("Address {0} is blocked for security reasons")]
    SecurityBlock(String),

    #[error("Wrong network: wallet is on {}, purchase requires chain {expected}", connected_label(.connected))]
    NetworkMismatch {
        expected: u64,
        connected: Option<u64>,
    },

    #[error("Insufficient allowance: {current} approved, {required} required")]
    InsufficientAllowance { required: U256, current: U256 },

    /// Client-side estimate only; the contract has the final word
    #[error("Insufficient balance: {available} available, {required} required")]
    InsufficientBalance { required: U256, available: U256 },

    #[error("Transaction rejected in wallet: {0}")]
    TransactionRejected(String),

    #[error("Transaction {hash} reverted on-chain")]
    TransactionReverted { hash: B256 },

    /// Confirmation was not observed in time; the transaction may still land
    #[error("Transaction {hash} not confirmed after {attempts} attempts; it may still be pending")]
    TransactionTimeout { hash: B256, attempts: u32 },

    #[error("Confirmation polling for {hash} was cancelled")]
    Cancelled { hash: B256 },

    #[error("Transaction {hash} is not being tracked")]
    UntrackedTransaction { hash: B256 },

    #[error("Purchase history query failed: {0}")]
    LogQuery(String),

    #[error("Unknown chain id {0}")]
    UnknownChain(u64),

    /// Provider error propagated unchanged
    #[error("Wallet provider error: {0}")]
    Provider(ProviderError),

    #[error("Pricing error: {0}")]
    Pricing(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the user can simply re-invoke the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransactionRejected(_)
                | Error::TransactionTimeout { .. }
                | Error::Cancelled { .. }
                | Error::Rpc(_)
                | Error::LogQuery(_)
                | Error::Connection(_)
        )
    }
}

fn connected_label(connected: &Option<u64>) -> String {
    match connected {
        Some(chain_id) => format!("chain {}", chain_id),
        None => "no network".to_string(),
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        Error::Provider(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
