//! Direct JSON-RPC client for chain reads
//!
//! Used for everything that must not depend on the connected wallet: event
//! log scans (not every injected provider supports historical queries) and
//! the canonical-chain sale counter.

use crate::config::chains::ChainDescriptor;
use crate::error::Error;
use crate::evm::codec;
use alloy_primitives::{Address, Bytes, TxKind};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types_eth::{Filter, Log, TransactionInput, TransactionRequest};
use alloy_transport_http::{Client, Http};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only access to a chain through its RPC endpoint
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Chain this reader is bound to
    fn chain_id(&self) -> u64;

    /// Execute a read-only contract call (`eth_call`)
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, Error>;

    /// Query event logs (`eth_getLogs`)
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, Error>;

    /// Current head block number
    async fn block_number(&self) -> Result<u64, Error>;
}

/// Alloy-backed [`ChainReader`] over HTTP
#[derive(Clone)]
pub struct EvmClient {
    provider: alloy_provider::RootProvider<Http<Client>>,
    chain_id: u64,
    timeout: Duration,
}

impl EvmClient {
    /// Create a new EVM client with the given RPC endpoint and chain ID
    pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self, Error> {
        let url = reqwest::Url::parse(rpc_url)
            .map_err(|e| Error::Config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            chain_id,
            timeout: DEFAULT_RPC_TIMEOUT,
        })
    }

    /// Client for the first RPC endpoint of a registered chain
    pub fn for_chain(descriptor: &ChainDescriptor) -> Result<Self, Error> {
        let rpc_url = descriptor.rpc_urls.first().ok_or_else(|| {
            Error::Config(format!(
                "Chain {} has no RPC endpoints configured",
                descriptor.chain_id
            ))
        })?;
        Self::new(rpc_url, descriptor.chain_id)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                Error::Rpc(format!(
                    "{} timed out after {}s on chain {}",
                    what,
                    self.timeout.as_secs(),
                    self.chain_id
                ))
            })?
    }

    /// Read an ERC-20 decimals value
    pub async fn erc20_decimals(&self, token: Address) -> Result<u8, Error> {
        let result = self.call(token, codec::encode_erc20_decimals()).await?;
        codec::decode_decimals(&result)
    }
}

#[async_trait]
impl ChainReader for EvmClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, Error> {
        let tx_request = TransactionRequest {
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(data),
            ..Default::default()
        };

        self.bounded("eth_call", async {
            self.provider
                .call(&tx_request)
                .await
                .map_err(|e| Error::Rpc(e.to_string()))
        })
        .await
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, Error> {
        debug!(chain_id = self.chain_id, "Querying logs");
        let logs = self
            .bounded("eth_getLogs", async {
                self.provider
                    .get_logs(filter)
                    .await
                    .map_err(|e| Error::LogQuery(e.to_string()))
            })
            .await?;
        debug!(chain_id = self.chain_id, count = logs.len(), "Logs received");
        Ok(logs)
    }

    async fn block_number(&self) -> Result<u64, Error> {
        self.bounded("eth_blockNumber", async {
            self.provider
                .get_block_number()
                .await
                .map_err(|e| Error::Rpc(e.to_string()))
        })
        .await
    }
}
