//! Injected wallet provider seam
//!
//! The browser-style wallet (or any signer exposing the same surface) is passed
//! in as an `Arc<dyn WalletProvider>`. Event listeners are handed out as
//! [`Subscription`] values that deregister themselves on drop, so a session
//! that is torn down never leaves handlers behind on the shared provider.

use crate::error::Error;
use crate::evm::types::utils::{parse_quantity, parse_u64_quantity, to_quantity, u256_to_quantity};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Well-known provider error codes (EIP-1193, EIP-3326)
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const REQUEST_PENDING: i64 = -32002;
}

/// Error returned by the wallet provider, carried verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(codes::USER_REJECTED, "User rejected the request")
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == codes::USER_REJECTED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    AccountsChanged,
    ChainChanged,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnect,
}

impl ProviderEvent {
    pub fn kind(&self) -> ProviderEventKind {
        match self {
            ProviderEvent::AccountsChanged(_) => ProviderEventKind::AccountsChanged,
            ProviderEvent::ChainChanged(_) => ProviderEventKind::ChainChanged,
            ProviderEvent::Disconnect => ProviderEventKind::Disconnect,
        }
    }
}

/// Injected wallet provider
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Raw JSON-RPC request (`eth_requestAccounts`, `eth_sendTransaction`, ...)
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Register a listener; dropping the returned subscription deregisters it
    fn subscribe(&self, kind: ProviderEventKind) -> Subscription;
}

/// A registered provider event listener
pub struct Subscription {
    kind: ProviderEventKind,
    receiver: mpsc::UnboundedReceiver<ProviderEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        kind: ProviderEventKind,
        receiver: mpsc::UnboundedReceiver<ProviderEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            kind,
            receiver,
            release: Some(Box::new(release)),
        }
    }

    pub fn kind(&self) -> ProviderEventKind {
        self.kind
    }

    /// Next event, or `None` once the provider side has gone away
    pub async fn recv(&mut self) -> Option<ProviderEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("kind", &self.kind).finish()
    }
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    listeners: HashMap<u64, (ProviderEventKind, mpsc::UnboundedSender<ProviderEvent>)>,
}

/// Listener bookkeeping for provider implementations
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<ListenerTable>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: ProviderEventKind) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let id = table.next_id;
            table.next_id += 1;
            table.listeners.insert(id, (kind, tx));
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(kind, rx, move || {
            if let Some(inner) = weak.upgrade() {
                let mut table = inner.lock().unwrap_or_else(|e| e.into_inner());
                table.listeners.remove(&id);
            }
        })
    }

    /// Deliver an event to every listener of its kind; returns the delivery count
    pub fn emit(&self, event: ProviderEvent) -> usize {
        let kind = event.kind();
        let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut delivered = 0;
        table.listeners.retain(|_, (listener_kind, sender)| {
            if *listener_kind != kind {
                return true;
            }
            match sender.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    pub fn listener_count(&self, kind: ProviderEventKind) -> usize {
        let table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        table.listeners.values().filter(|(k, _)| *k == kind).count()
    }
}

/// Transaction submitted through the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionCall {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas: Option<u64>,
}

impl TransactionCall {
    pub fn to_json(&self) -> Value {
        let mut tx = json!({
            "from": format!("{:#x}", self.from),
            "to": format!("{:#x}", self.to),
            "value": u256_to_quantity(self.value),
            "data": format!("0x{}", hex::encode(&self.data)),
        });
        if let Some(gas) = self.gas {
            tx["gas"] = Value::String(to_quantity(gas));
        }
        tx
    }
}

/// Minimal view of a transaction receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
}

impl TxReceipt {
    fn from_json(value: &Value) -> Result<Self, Error> {
        let hash = value
            .get("transactionHash")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Rpc("Receipt missing transactionHash".to_string()))?;
        let transaction_hash = B256::from_str(hash)
            .map_err(|e| Error::Rpc(format!("Invalid receipt hash '{}': {}", hash, e)))?;
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Rpc("Receipt missing status".to_string()))?;
        let block_number = value
            .get("blockNumber")
            .and_then(Value::as_str)
            .map(parse_u64_quantity)
            .transpose()?;

        Ok(Self {
            transaction_hash,
            success: parse_quantity(status)? == U256::from(1u64),
            block_number,
        })
    }
}

/// Typed helpers over the raw provider surface
#[derive(Clone)]
pub struct ProviderClient {
    inner: Arc<dyn WalletProvider>,
}

impl ProviderClient {
    pub fn new(inner: Arc<dyn WalletProvider>) -> Self {
        Self { inner }
    }

    pub fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.inner
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, Error> {
        debug!(method, "Provider request");
        self.inner
            .request(method, params)
            .await
            .map_err(Error::Provider)
    }

    async fn request_str(&self, method: &str, params: Value) -> Result<String, Error> {
        let value = self.request(method, params).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Rpc(format!("{} returned non-string result: {}", method, value)))
    }

    /// Prompting account request
    pub async fn request_accounts(&self) -> Result<Vec<Address>, Error> {
        let value = self.request("eth_requestAccounts", json!([])).await?;
        parse_addresses(&value)
    }

    /// Already-authorized accounts, without prompting
    pub async fn accounts(&self) -> Result<Vec<Address>, Error> {
        let value = self.request("eth_accounts", json!([])).await?;
        parse_addresses(&value)
    }

    pub async fn chain_id(&self) -> Result<u64, Error> {
        let raw = self.request_str("eth_chainId", json!([])).await?;
        parse_u64_quantity(&raw)
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256, Error> {
        let raw = self
            .request_str("eth_getBalance", json!([format!("{:#x}", address), "latest"]))
            .await?;
        parse_quantity(&raw)
    }

    /// Read-only contract call through the wallet's node
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, Error> {
        let raw = self
            .request_str(
                "eth_call",
                json!([{ "to": format!("{:#x}", to), "data": format!("0x{}", hex::encode(&data)) }, "latest"]),
            )
            .await?;
        let bytes = hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| Error::Rpc(format!("Invalid eth_call result: {}", e)))?;
        Ok(Bytes::from(bytes))
    }

    pub async fn estimate_gas(&self, tx: &TransactionCall) -> Result<u64, Error> {
        let raw = self.request_str("eth_estimateGas", json!([tx.to_json()])).await?;
        parse_u64_quantity(&raw)
    }

    /// Submit a transaction for signing; resolves once the wallet returns a hash
    pub async fn send_transaction(&self, tx: &TransactionCall) -> Result<B256, Error> {
        let raw = self
            .request_str("eth_sendTransaction", json!([tx.to_json()]))
            .await?;
        B256::from_str(&raw).map_err(|e| Error::Rpc(format!("Invalid transaction hash '{}': {}", raw, e)))
    }

    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, Error> {
        let value = self
            .request("eth_getTransactionReceipt", json!([format!("{:#x}", hash)]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        TxReceipt::from_json(&value).map(Some)
    }

    pub async fn switch_chain(&self, chain_id: u64) -> Result<(), Error> {
        self.request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": to_quantity(chain_id) }]),
        )
        .await
        .map(|_| ())
    }

    pub async fn add_chain(&self, params: Value) -> Result<(), Error> {
        self.request("wallet_addEthereumChain", json!([params]))
            .await
            .map(|_| ())
    }
}

fn parse_addresses(value: &Value) -> Result<Vec<Address>, Error> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::Rpc(format!("Expected account array, got {}", value)))?;
    items
        .iter()
        .map(|item| {
            let raw = item
                .as_str()
                .ok_or_else(|| Error::Rpc(format!("Invalid account entry {}", item)))?;
            Address::from_str(raw).map_err(|e| Error::Rpc(format!("Invalid account '{}': {}", raw, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_deregisters_on_drop() {
        let registry = ListenerRegistry::new();
        let mut sub = registry.subscribe(ProviderEventKind::ChainChanged);
        let _other = registry.subscribe(ProviderEventKind::AccountsChanged);
        assert_eq!(registry.listener_count(ProviderEventKind::ChainChanged), 1);

        assert_eq!(registry.emit(ProviderEvent::ChainChanged(56)), 1);
        assert_eq!(sub.recv().await, Some(ProviderEvent::ChainChanged(56)));

        drop(sub);
        assert_eq!(registry.listener_count(ProviderEventKind::ChainChanged), 0);
        assert_eq!(registry.emit(ProviderEvent::ChainChanged(1)), 0);
        assert_eq!(registry.listener_count(ProviderEventKind::AccountsChanged), 1);
    }

    #[test]
    fn test_receipt_parsing() {
        let receipt = TxReceipt::from_json(&json!({
            "transactionHash": format!("{:#x}", B256::repeat_byte(0xab)),
            "status": "0x0",
            "blockNumber": "0x10"
        }))
        .unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.block_number, Some(16));
    }

    #[test]
    fn test_transaction_json_shape() {
        let tx = TransactionCall {
            from: Address::repeat_byte(0x11),
            to: Address::repeat_byte(0x22),
            value: U256::from(255u64),
            data: Bytes::from(vec![0xde, 0xad]),
            gas: Some(21_000),
        };
        let json = tx.to_json();
        assert_eq!(json["value"], "0xff");
        assert_eq!(json["data"], "0xdead");
        assert_eq!(json["gas"], "0x5208");
    }
}
