//! Test fixtures for presale integration tests
//!
//! A scripted in-memory wallet provider and chain reader, so the whole
//! purchase lifecycle can run without a browser wallet or an RPC node.

#![allow(dead_code)]

use alloy_primitives::{Address, Bytes, LogData, B256, U256};
use alloy_rpc_types_eth::{Filter, Log};
use async_trait::async_trait;
use presale_sdk::evm::codec;
use presale_sdk::evm::types::utils::{to_quantity, u256_to_quantity};
use presale_sdk::wallet::provider::{codes, ListenerRegistry};
use presale_sdk::wallet::{ProviderEvent, ProviderEventKind, Subscription};
use presale_sdk::{ChainReader, Error, ProviderError, WalletProvider};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

pub const BUYER: Address = Address::repeat_byte(0x22);
pub const OTHER_BUYER: Address = Address::repeat_byte(0x33);
/// Matches the `dead` suffix used by [`blocked_suffixes`]
pub const BLOCKED: Address = Address::new([
    0x44, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44,
    0x44, 0x44, 0x44, 0xde, 0xad,
]);

pub fn blocked_suffixes() -> Vec<String> {
    vec!["dead".to_string()]
}

/// One whole sale token in base units
pub fn tokens(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(18u64))
}

fn selector(data: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&data[..4]);
    out
}

fn word_address(data: &[u8], index: usize) -> Address {
    let start = 4 + index * 32;
    Address::from_slice(&data[start + 12..start + 32])
}

fn word_u256(data: &[u8], index: usize) -> U256 {
    let start = 4 + index * 32;
    U256::from_be_slice(&data[start..start + 32])
}

fn encode_word(value: U256) -> String {
    format!("0x{}", hex::encode(value.to_be_bytes::<32>()))
}

fn json_address(value: &Value) -> Address {
    Address::from_str(value.as_str().unwrap()).unwrap()
}

fn json_bytes(value: &Value) -> Vec<u8> {
    hex::decode(value.as_str().unwrap().trim_start_matches("0x")).unwrap()
}

/// How the mock wallet answers receipt lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    /// Mined successfully on the first lookup
    Success,
    /// Mined but reverted
    Revert,
    /// Never mined
    Never,
    /// Mined successfully once this many lookups have returned nothing
    AfterLookups(u32),
}

#[derive(Debug)]
pub struct MockWalletState {
    pub accounts: Vec<Address>,
    pub chain_id: u64,
    /// Chains the wallet can switch to without an add-chain request
    pub known_chains: HashSet<u64>,
    pub native_balances: HashMap<Address, U256>,
    /// (contract, owner) → balance; serves ERC-20 and ERC-721 `balanceOf`
    pub token_balances: HashMap<(Address, Address), U256>,
    /// (token, owner, spender) → allowance
    pub allowances: HashMap<(Address, Address, Address), U256>,
    pub receipt_mode: ReceiptMode,
    pub receipt_lookups: u32,
    /// Token clamps confirmed approvals to this amount
    pub approval_cap: Option<U256>,
    pub request_accounts_error: Option<ProviderError>,
    pub send_error: Option<ProviderError>,
    pub switch_error: Option<ProviderError>,
    pub gas_estimate: u64,
    pub sent: Vec<Value>,
    pub added_chains: Vec<Value>,
    pub methods: Vec<String>,
    next_hash: u8,
}

/// Scripted wallet provider
pub struct MockWallet {
    pub state: Mutex<MockWalletState>,
    listeners: ListenerRegistry,
}

impl MockWallet {
    pub fn new(accounts: Vec<Address>, chain_id: u64) -> Self {
        Self {
            state: Mutex::new(MockWalletState {
                accounts,
                chain_id,
                known_chains: [1u64].into_iter().chain(std::iter::once(chain_id)).collect(),
                native_balances: HashMap::new(),
                token_balances: HashMap::new(),
                allowances: HashMap::new(),
                receipt_mode: ReceiptMode::Success,
                receipt_lookups: 0,
                approval_cap: None,
                request_accounts_error: None,
                send_error: None,
                switch_error: None,
                gas_estimate: 100_000,
                sent: Vec::new(),
                added_chains: Vec::new(),
                methods: Vec::new(),
                next_hash: 0,
            }),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn with_native_balance(self, owner: Address, amount: U256) -> Self {
        self.state.lock().unwrap().native_balances.insert(owner, amount);
        self
    }

    pub fn with_token_balance(self, contract: Address, owner: Address, amount: U256) -> Self {
        self.state
            .lock()
            .unwrap()
            .token_balances
            .insert((contract, owner), amount);
        self
    }

    pub fn with_allowance(self, token: Address, owner: Address, spender: Address, amount: U256) -> Self {
        self.state
            .lock()
            .unwrap()
            .allowances
            .insert((token, owner, spender), amount);
        self
    }

    pub fn set_receipt_mode(&self, mode: ReceiptMode) {
        self.state.lock().unwrap().receipt_mode = mode;
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    /// Number of requests made for `method`
    pub fn calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .methods
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    pub fn sent(&self) -> Vec<Value> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn listener_count(&self, kind: ProviderEventKind) -> usize {
        self.listeners.listener_count(kind)
    }

    pub fn emit_accounts_changed(&self, accounts: Vec<Address>) -> usize {
        self.state.lock().unwrap().accounts = accounts.clone();
        self.listeners.emit(ProviderEvent::AccountsChanged(accounts))
    }

    pub fn emit_chain_changed(&self, chain_id: u64) -> usize {
        self.state.lock().unwrap().chain_id = chain_id;
        self.listeners.emit(ProviderEvent::ChainChanged(chain_id))
    }

    fn eth_call(state: &MockWalletState, params: &Value) -> Value {
        let to = json_address(&params[0]["to"]);
        let data = json_bytes(&params[0]["data"]);
        let sel = selector(&data);

        let value = if sel == selector(&codec::encode_allowance(Address::ZERO, Address::ZERO)) {
            let owner = word_address(&data, 0);
            let spender = word_address(&data, 1);
            state
                .allowances
                .get(&(to, owner, spender))
                .copied()
                .unwrap_or_default()
        } else if sel == selector(&codec::encode_erc20_balance_of(Address::ZERO)) {
            let owner = word_address(&data, 0);
            state
                .token_balances
                .get(&(to, owner))
                .copied()
                .unwrap_or_default()
        } else {
            U256::ZERO
        };
        Value::String(encode_word(value))
    }

    fn send_transaction(state: &mut MockWalletState, params: &Value) -> Result<Value, ProviderError> {
        if let Some(err) = state.send_error.clone() {
            return Err(err);
        }
        let tx = params[0].clone();
        let data = json_bytes(&tx["data"]);
        if selector(&data) == selector(&codec::encode_approve(Address::ZERO, U256::ZERO)) {
            let token = json_address(&tx["to"]);
            let owner = json_address(&tx["from"]);
            let spender = word_address(&data, 0);
            let amount = word_u256(&data, 1);
            let amount = state.approval_cap.map_or(amount, |cap| amount.min(cap));
            state.allowances.insert((token, owner, spender), amount);
        }
        state.sent.push(tx);
        state.next_hash += 1;
        state.receipt_lookups = 0;
        Ok(Value::String(format!(
            "{:#x}",
            B256::with_last_byte(state.next_hash)
        )))
    }

    fn receipt(state: &mut MockWalletState, params: &Value) -> Value {
        let hash = params[0].clone();
        state.receipt_lookups += 1;
        let status = match state.receipt_mode {
            ReceiptMode::Success => "0x1",
            ReceiptMode::Revert => "0x0",
            ReceiptMode::Never => return Value::Null,
            ReceiptMode::AfterLookups(n) if state.receipt_lookups <= n => return Value::Null,
            ReceiptMode::AfterLookups(_) => "0x1",
        };
        json!({
            "transactionHash": hash,
            "status": status,
            "blockNumber": "0x64",
        })
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.methods.push(method.to_string());

        match method {
            "eth_requestAccounts" => match state.request_accounts_error.clone() {
                Some(err) => Err(err),
                None => Ok(json!(state.accounts)),
            },
            "eth_accounts" => Ok(json!(state.accounts)),
            "eth_chainId" => Ok(Value::String(to_quantity(state.chain_id))),
            "eth_getBalance" => {
                let owner = json_address(&params[0]);
                let balance = state.native_balances.get(&owner).copied().unwrap_or_default();
                Ok(Value::String(u256_to_quantity(balance)))
            }
            "eth_call" => Ok(Self::eth_call(&state, &params)),
            "eth_estimateGas" => Ok(Value::String(to_quantity(state.gas_estimate))),
            "eth_sendTransaction" => Self::send_transaction(&mut state, &params),
            "eth_getTransactionReceipt" => Ok(Self::receipt(&mut state, &params)),
            "wallet_switchEthereumChain" => {
                if let Some(err) = state.switch_error.clone() {
                    return Err(err);
                }
                let raw = params[0]["chainId"].as_str().unwrap_or_default();
                let chain_id = u64::from_str_radix(raw.trim_start_matches("0x"), 16).unwrap();
                if !state.known_chains.contains(&chain_id) {
                    return Err(ProviderError::new(
                        codes::UNRECOGNIZED_CHAIN,
                        format!("Unrecognized chain ID {}", raw),
                    ));
                }
                state.chain_id = chain_id;
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let params = params[0].clone();
                let raw = params["chainId"].as_str().unwrap_or_default().to_string();
                let chain_id = u64::from_str_radix(raw.trim_start_matches("0x"), 16).unwrap();
                state.known_chains.insert(chain_id);
                state.added_chains.push(params);
                Ok(Value::Null)
            }
            other => Err(ProviderError::new(
                codes::UNSUPPORTED_METHOD,
                format!("Unsupported method {}", other),
            )),
        }
    }

    fn subscribe(&self, kind: ProviderEventKind) -> Subscription {
        self.listeners.subscribe(kind)
    }
}

/// In-memory chain reader
pub struct MockChain {
    pub chain_id: u64,
    pub head: Mutex<u64>,
    pub logs: Mutex<Vec<Log>>,
    pub total_sold: Mutex<U256>,
    pub get_logs_calls: Mutex<Vec<Filter>>,
    pub fail_logs: Mutex<bool>,
    /// Log queries wait here until every party sharing the barrier arrives
    pub logs_barrier: Mutex<Option<Arc<Barrier>>>,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            head: Mutex::new(1_000),
            logs: Mutex::new(Vec::new()),
            total_sold: Mutex::new(U256::ZERO),
            get_logs_calls: Mutex::new(Vec::new()),
            fail_logs: Mutex::new(false),
            logs_barrier: Mutex::new(None),
        }
    }

    pub fn push_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn set_total_sold(&self, sold: U256) {
        *self.total_sold.lock().unwrap() = sold;
    }

    pub fn log_queries(&self) -> usize {
        self.get_logs_calls.lock().unwrap().len()
    }

    pub fn last_filter(&self) -> Option<Filter> {
        self.get_logs_calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChainReader for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, Error> {
        if data[..4] == codec::encode_total_tokens_sold()[..4] {
            let sold = *self.total_sold.lock().unwrap();
            return Ok(Bytes::from(sold.to_be_bytes::<32>().to_vec()));
        }
        Err(Error::Rpc("execution reverted".to_string()))
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, Error> {
        self.get_logs_calls.lock().unwrap().push(filter.clone());
        let barrier = self.logs_barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        if *self.fail_logs.lock().unwrap() {
            return Err(Error::LogQuery("query returned more than 10000 results".to_string()));
        }

        let from = filter.get_from_block().unwrap_or(0);
        let to = filter.get_to_block().unwrap_or(u64::MAX);
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|log| filter.address.matches(&log.address()))
            .filter(|log| {
                log.topics()
                    .iter()
                    .enumerate()
                    .all(|(i, topic)| i >= 4 || filter.topics[i].matches(topic))
            })
            .filter(|log| {
                let block = log.block_number.unwrap_or(0);
                block >= from && block <= to
            })
            .cloned()
            .collect())
    }

    async fn block_number(&self) -> Result<u64, Error> {
        Ok(*self.head.lock().unwrap())
    }
}

/// A `TokensPurchased` log as the presale contract emits it
pub fn purchase_log(
    presale: Address,
    buyer: Address,
    token_amount: U256,
    block: u64,
    tx_byte: u8,
    log_index: u64,
) -> Log {
    let words = [
        token_amount,
        U256::from(1_000_000u64),
        U256::from(10u64),
        U256::from(1u64),
        U256::ZERO,
    ];
    let data: Vec<u8> = words
        .iter()
        .flat_map(|w| w.to_be_bytes::<32>())
        .collect();
    Log {
        inner: alloy_primitives::Log {
            address: presale,
            data: LogData::new_unchecked(
                vec![codec::purchase_topic(), codec::address_topic(buyer)],
                data.into(),
            ),
        },
        block_number: Some(block),
        transaction_hash: Some(B256::repeat_byte(tx_byte)),
        log_index: Some(log_index),
        ..Default::default()
    }
}
